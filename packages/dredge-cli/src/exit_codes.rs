use dredge_rs::MotionError;

pub const SUCCESS: i32 = 0;
pub const INPUT_ERROR: i32 = 1;
pub const EXECUTION_ERROR: i32 = 2;
pub const PARTIAL_FAILURE: i32 = 3;

/// Exit code for a library error: bad input vs. failed estimation
pub fn for_error(err: &MotionError) -> i32 {
    match err {
        MotionError::NonConvergence { .. } | MotionError::IoError(_) | MotionError::JsonError(_) => {
            EXECUTION_ERROR
        }
        _ => INPUT_ERROR,
    }
}
