use crate::cli::InfoArgs;
use crate::exit_codes;
use crate::output;
use dredge_rs::profiling::{profile_log_path, PROFILE_ENV_VAR};
use dredge_rs::{MotionConfig, MIN_DEPTH_CHANNELS, MIN_TIME_BINS};
use serde::Serialize;

#[derive(Serialize)]
struct InfoOutput {
    cli_version: String,
    platform: String,
    arch: String,
    threads: usize,
    input_extensions: Vec<&'static str>,
    min_time_bins: usize,
    min_depth_channels: usize,
    profile_log: String,
    default_config: MotionConfig,
}

const INPUT_EXTENSIONS: &[&str] = &["txt", "ascii", "csv", "tsv", "bin", "raw", "dat"];

pub fn execute(args: InfoArgs) -> i32 {
    let info = InfoOutput {
        cli_version: env!("CARGO_PKG_VERSION").to_string(),
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        threads: std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
        input_extensions: INPUT_EXTENSIONS.to_vec(),
        min_time_bins: MIN_TIME_BINS,
        min_depth_channels: MIN_DEPTH_CHANNELS,
        profile_log: profile_log_path().display().to_string(),
        default_config: MotionConfig::default(),
    };

    if args.json {
        if let Err(e) = output::JsonSink::stdout(false).emit(&info, "") {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    } else {
        let config = &info.default_config;
        println!("dredge CLI v{}", info.cli_version);
        println!("Platform: {} ({}), {} thread(s)", info.platform, info.arch, info.threads);
        println!();
        println!("Input formats: {}", info.input_extensions.join(", "));
        println!(
            "Minimum extent: {} time bins × {} channels",
            info.min_time_bins, info.min_depth_channels
        );
        println!(
            "Defaults: rigid={}, window_s={}, bin_um={}, mincorr={}, lambda_t={}, chunk_len_s={:?}",
            config.rigid,
            config.window_s,
            config.bin_um,
            config.mincorr,
            config.lambda_t,
            config.chunk_len_s
        );
        println!("Profile log (with ${}): {}", PROFILE_ENV_VAR, info.profile_log);
    }

    exit_codes::SUCCESS
}
