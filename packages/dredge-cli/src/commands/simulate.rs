use crate::cli::SimulateArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use dredge_rs::{save_signal, DriftingRecording};
use serde::Serialize;
use std::path::Path;

/// Prescribed drift written next to a synthetic recording
#[derive(Serialize)]
struct DriftTruth {
    sampling_frequency: f64,
    time_s: Vec<f64>,
    drift_um: Vec<f64>,
}

fn build_recording(args: &SimulateArgs) -> Result<DriftingRecording, String> {
    let drift = params::drift_components(&args.sine, &args.step)?;
    Ok(DriftingRecording {
        n_channels: args.channels,
        pitch_um: args.pitch_um,
        sampling_frequency: args.fs,
        duration_s: args.duration_s,
        drift,
        noise_std: args.noise,
        seed: args.seed,
    })
}

pub fn execute(args: SimulateArgs) -> i32 {
    let recording = match build_recording(&args) {
        Ok(r) => r,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    let sample_type = match params::parse_sample_type(&args.format) {
        Ok(t) => t,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let signal = match recording.generate() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    if let Err(e) = save_signal(&signal, Path::new(&args.output), sample_type) {
        eprintln!("Error: Failed to write '{}': {}", args.output, e);
        return exit_codes::for_error(&e);
    }

    if let Some(ref truth_path) = args.truth {
        let drift_um = recording.true_drift();
        let truth = DriftTruth {
            sampling_frequency: recording.sampling_frequency,
            time_s: (0..drift_um.len())
                .map(|t| t as f64 / recording.sampling_frequency)
                .collect(),
            drift_um,
        };
        let sink = output::JsonSink::file_or_stdout(Some(truth_path), true);
        if let Err(e) = sink.emit(&truth, &args.output) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    }

    if !args.quiet {
        eprintln!(
            "Wrote {} time bins × {} channels ({} s at {} Hz) to {}",
            signal.n_time_bins(),
            signal.n_channels(),
            recording.duration_s,
            recording.sampling_frequency,
            args.output
        );
    }
    exit_codes::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args(output: &str) -> SimulateArgs {
        SimulateArgs {
            output: output.to_string(),
            channels: 16,
            pitch_um: 20.0,
            fs: 50.0,
            duration_s: 1.0,
            sine: vec!["10,1".to_string()],
            step: vec![],
            noise: 0.0,
            seed: 1,
            format: "f32".to_string(),
            truth: None,
            quiet: true,
        }
    }

    #[test]
    fn test_build_recording() {
        let recording = build_recording(&make_args("out.txt")).unwrap();
        assert_eq!(recording.n_channels, 16);
        assert_eq!(recording.drift.len(), 1);
        assert_eq!(recording.n_time_bins(), 50);
    }

    #[test]
    fn test_writes_recording_and_truth() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("sim.bin");
        let truth = dir.path().join("truth.json");
        let mut args = make_args(out.to_str().unwrap());
        args.truth = Some(truth.to_str().unwrap().to_string());

        assert_eq!(execute(args), exit_codes::SUCCESS);
        assert_eq!(std::fs::metadata(&out).unwrap().len(), 50 * 16 * 4);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&truth).unwrap()).unwrap();
        assert_eq!(json["drift_um"].as_array().unwrap().len(), 50);
    }

    #[test]
    fn test_unsupported_output_extension() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("sim.edf");
        assert_eq!(
            execute(make_args(out.to_str().unwrap())),
            exit_codes::INPUT_ERROR
        );
    }
}
