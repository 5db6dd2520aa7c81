use crate::cli::EstimateArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use crate::report::EstimateReport;
use dredge_rs::{load_signal, LoadOptions, MotionConfig, MotionEstimator};
use std::path::Path;

/// Load one recording and estimate its drift.
///
/// Errors carry the exit code they map to.
pub fn estimate_file(
    file: &str,
    options: &LoadOptions,
    config: &MotionConfig,
    band: (f64, f64),
) -> Result<EstimateReport, (i32, String)> {
    params::validate_file(file).map_err(|msg| (exit_codes::INPUT_ERROR, msg))?;

    let signal = load_signal(Path::new(file), options)
        .map_err(|e| (exit_codes::INPUT_ERROR, format!("Failed to load {}: {}", file, e)))?;

    let estimator = MotionEstimator::new(config.clone())
        .map_err(|e| (exit_codes::INPUT_ERROR, e.to_string()))?;
    let estimate = estimator
        .estimate(&signal)
        .map_err(|e| (exit_codes::for_error(&e), format!("Estimation failed: {}", e)))?;

    Ok(EstimateReport::new(file, &signal, config.clone(), estimate, band))
}

pub fn band_limits(band: &[f64]) -> Result<(f64, f64), String> {
    match band {
        [lo, hi] if lo.is_finite() && hi.is_finite() && *lo >= 0.0 && lo < hi => Ok((*lo, *hi)),
        _ => Err(format!(
            "Invalid frequency band {:?}: expected MIN_HZ < MAX_HZ, both non-negative",
            band
        )),
    }
}

pub fn execute(args: EstimateArgs) -> i32 {
    let options = match params::load_options(&args.input) {
        Ok(o) => o,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let config = match params::build_config(&args.estimation) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let band = match band_limits(&args.band) {
        Ok(b) => b,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if !args.quiet {
        eprintln!("Estimating drift of {}...", args.file);
        eprintln!(
            "  Mode: {}, window: {} s",
            if config.rigid { "rigid" } else { "non-rigid" },
            config.window_s
        );
        if !config.rigid {
            eprintln!("  Spatial bins: {} µm", config.bin_um);
        }
    }

    let report = match estimate_file(&args.file, &options, &config, band) {
        Ok(r) => r,
        Err((code, msg)) => {
            eprintln!("Error: {}", msg);
            return code;
        }
    };

    if !args.quiet {
        eprintln!(
            "  {} time bins, {} spatial bin(s), peak displacement {:.2} µm",
            report.trajectory.n_time_bins(),
            report.trajectory.n_spatial_bins(),
            report.trajectory.peak_displacement_um()
        );
        if let Some(f) = report.dominant_frequency_hz {
            eprintln!("  Dominant drift frequency: {:.3} Hz", f);
        }
    }

    let sink = output::JsonSink::file_or_stdout(args.output.as_deref(), args.compact);
    match sink.emit(&report, &args.file) {
        Ok(Some(path)) => {
            if !args.quiet {
                eprintln!("Results written to {}", path.display());
            }
            exit_codes::SUCCESS
        }
        Ok(None) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    }
}
