use thiserror::Error;

#[derive(Error, Debug)]
pub enum MotionError {
    #[error("Insufficient data: need at least {min} {axis}, got {actual}")]
    InsufficientData {
        axis: &'static str,
        min: usize,
        actual: usize,
    },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Solver did not converge after {iterations} iterations (relative residual {residual:.3e})")]
    NonConvergence { iterations: usize, residual: f64 },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Input file not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MotionError>;
