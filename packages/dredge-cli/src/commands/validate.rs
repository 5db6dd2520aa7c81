use crate::cli::ValidateArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use dredge_rs::{load_signal, InputFormat, MIN_DEPTH_CHANNELS, MIN_TIME_BINS};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize, Default)]
struct ValidateOutput {
    file: String,
    exists: bool,
    supported: bool,
    format: Option<InputFormat>,
    size_bytes: Option<u64>,
    n_time_bins: Option<usize>,
    n_channels: Option<usize>,
    duration_s: Option<f64>,
    pitch_um: Option<f64>,
    /// Large enough for motion estimation
    estimable: bool,
    error: Option<String>,
}

fn inspect(args: &ValidateArgs) -> ValidateOutput {
    let path = Path::new(&args.file);
    let mut result = ValidateOutput {
        file: args.file.clone(),
        exists: path.is_file(),
        ..ValidateOutput::default()
    };

    if !result.exists {
        result.error = Some(format!("File not found: {}", args.file));
        return result;
    }
    result.size_bytes = std::fs::metadata(path).ok().map(|m| m.len());

    match InputFormat::from_extension(path) {
        Ok(format) => {
            result.supported = true;
            result.format = Some(format);
        }
        Err(e) => {
            result.error = Some(e.to_string());
            return result;
        }
    }

    let options = match params::load_options(&args.input) {
        Ok(o) => o,
        Err(msg) => {
            result.error = Some(msg);
            return result;
        }
    };

    match load_signal(path, &options) {
        Ok(signal) => {
            result.n_time_bins = Some(signal.n_time_bins());
            result.n_channels = Some(signal.n_channels());
            result.duration_s = Some(signal.duration_s());
            result.pitch_um = Some(signal.pitch_um());
            match signal.check_extent() {
                Ok(()) => result.estimable = true,
                Err(e) => result.error = Some(e.to_string()),
            }
        }
        Err(e) => result.error = Some(e.to_string()),
    }
    result
}

pub fn execute(args: ValidateArgs) -> i32 {
    let result = inspect(&args);

    if args.json {
        if let Err(e) = output::JsonSink::stdout(false).emit(&result, &args.file) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    } else if let Some(ref err) = result.error {
        eprintln!("Error: {}", err);
    } else {
        println!(
            "File '{}' is valid: {} time bins × {} channels, {:.3} s, pitch {} µm (minimum {} × {})",
            args.file,
            result.n_time_bins.unwrap_or(0),
            result.n_channels.unwrap_or(0),
            result.duration_s.unwrap_or(0.0),
            result.pitch_um.unwrap_or(0.0),
            MIN_TIME_BINS,
            MIN_DEPTH_CHANNELS
        );
    }

    if result.error.is_some() {
        exit_codes::INPUT_ERROR
    } else {
        exit_codes::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::InputArgs;

    fn args(file: &str) -> ValidateArgs {
        ValidateArgs {
            file: file.to_string(),
            input: InputArgs {
                fs: 100.0,
                t0: 0.0,
                pitch_um: 20.0,
                first_depth_um: 0.0,
                depths: None,
                format: "f32".to_string(),
                channels: None,
                gain: 1.0,
            },
            json: true,
        }
    }

    #[test]
    fn test_inspect_valid_text() {
        let tmp = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        std::fs::write(tmp.path(), "1 2 3\n4 5 6\n7 8 9\n").unwrap();
        let result = inspect(&args(tmp.path().to_str().unwrap()));
        assert!(result.error.is_none(), "{:?}", result.error);
        assert!(result.estimable);
        assert_eq!(result.n_time_bins, Some(3));
        assert_eq!(result.n_channels, Some(3));
    }

    #[test]
    fn test_inspect_too_small() {
        let tmp = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        std::fs::write(tmp.path(), "1,2\n3,4\n5,6\n").unwrap();
        let result = inspect(&args(tmp.path().to_str().unwrap()));
        assert!(!result.estimable);
        assert!(result.error.unwrap().contains("depth channels"));
    }

    #[test]
    fn test_inspect_missing_and_unsupported() {
        let result = inspect(&args("/nonexistent/lfp.txt"));
        assert!(!result.exists);

        let tmp = tempfile::Builder::new().suffix(".edf").tempfile().unwrap();
        let result = inspect(&args(tmp.path().to_str().unwrap()));
        assert!(result.exists);
        assert!(!result.supported);
    }
}
