use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "dredge",
    version,
    about = "Probe drift estimation from preprocessed LFP recordings",
    long_about = "Estimate how far a recording probe moved relative to the tissue over time.\n\
                  Input is an already preprocessed LFP matrix (time bins × depth channels)\n\
                  stored as delimited text (.txt/.csv/.tsv/.ascii) or raw binary (.bin/.raw/.dat)."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Estimate the drift trajectory of a recording
    Estimate(EstimateArgs),
    /// Estimate drift for many recordings
    Batch(BatchArgs),
    /// Load a recording and check it can be used for estimation
    Validate(ValidateArgs),
    /// Write a synthetic drifting recording
    Simulate(SimulateArgs),
    /// Show version, platform and default settings
    Info(InfoArgs),
}

/// How to read a recording that carries no metadata
#[derive(Args, Clone, Debug)]
pub struct InputArgs {
    /// Sampling frequency of the time bins in Hz
    #[arg(long)]
    pub fs: f64,

    /// Time of the first bin in seconds
    #[arg(long, default_value_t = 0.0)]
    pub t0: f64,

    /// Channel spacing in µm (uniform probe)
    #[arg(long, default_value_t = 20.0)]
    pub pitch_um: f64,

    /// Depth of the first channel in µm
    #[arg(long, default_value_t = 0.0)]
    pub first_depth_um: f64,

    /// Explicit channel depths in µm (overrides --pitch-um)
    #[arg(long, num_args = 1.., allow_negative_numbers = true)]
    pub depths: Option<Vec<f64>>,

    /// Binary sample type (f32, f64, i16)
    #[arg(long, default_value = "f32")]
    pub format: String,

    /// Channels per time bin (required for binary files)
    #[arg(long)]
    pub channels: Option<usize>,

    /// Factor applied to binary samples
    #[arg(long, default_value_t = 1.0)]
    pub gain: f64,
}

/// Overrides on top of the default or file configuration
#[derive(Args, Clone, Debug, Default)]
pub struct EstimationArgs {
    /// JSON configuration file
    #[arg(long, env = "DREDGE_CONFIG")]
    pub config: Option<String>,

    /// One displacement per time bin
    #[arg(long, default_value_t = false, conflicts_with = "non_rigid")]
    pub rigid: bool,

    /// One displacement per time bin and spatial bin
    #[arg(long, default_value_t = false)]
    pub non_rigid: bool,

    /// Temporal correlation window in seconds
    #[arg(long)]
    pub window_s: Option<f64>,

    /// Spatial bin size in µm (non-rigid)
    #[arg(long)]
    pub bin_um: Option<f64>,

    /// Width of the spatial windows in µm
    #[arg(long)]
    pub win_scale_um: Option<f64>,

    /// Spatial window shape (gaussian, rect, triangle)
    #[arg(long)]
    pub win_shape: Option<String>,

    /// Largest displacement searched between two time bins, µm
    #[arg(long)]
    pub max_disp_um: Option<f64>,

    /// Correlation threshold
    #[arg(long, allow_negative_numbers = true)]
    pub mincorr: Option<f64>,

    /// Use this percentile of near-neighbour correlations as threshold
    #[arg(long)]
    pub mincorr_percentile: Option<f64>,

    /// Sigmoid weights around the threshold instead of a hard cut
    #[arg(long, default_value_t = false)]
    pub soft_weights: bool,

    /// Temporal smoothness strength
    #[arg(long)]
    pub lambda_t: Option<f64>,

    /// Smoothness between spatial bins
    #[arg(long)]
    pub lambda_s: Option<f64>,

    /// Process the recording in chunks of this many seconds
    #[arg(long, conflicts_with = "no_chunking")]
    pub chunk_len_s: Option<f64>,

    /// Solve the whole recording at once
    #[arg(long, default_value_t = false)]
    pub no_chunking: bool,

    /// Solver iteration budget per chunk
    #[arg(long)]
    pub max_iterations: Option<usize>,
}

#[derive(Args)]
pub struct EstimateArgs {
    /// Input recording
    #[arg(long)]
    pub file: String,

    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub estimation: EstimationArgs,

    /// Band (Hz) searched for the dominant drift frequency
    #[arg(long, num_args = 2, value_names = ["MIN_HZ", "MAX_HZ"], default_values_t = vec![0.05, 10.0])]
    pub band: Vec<f64>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern selecting the input files
    #[arg(long, conflicts_with = "files")]
    pub glob: Option<String>,

    /// Explicit list of input files
    #[arg(long, num_args = 1..)]
    pub files: Option<Vec<String>>,

    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub estimation: EstimationArgs,

    /// Write one report per file into this directory (default: JSON lines on stdout)
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Keep going after a failed file
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// List the matching files and exit
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Compact JSON in per-file reports
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Input recording
    #[arg(long)]
    pub file: String,

    #[command(flatten)]
    pub input: InputArgs,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Output recording (.txt/.csv or .bin/.raw/.dat)
    #[arg(short, long)]
    pub output: String,

    /// Number of channels
    #[arg(long, default_value_t = 64)]
    pub channels: usize,

    /// Channel spacing in µm
    #[arg(long, default_value_t = 20.0)]
    pub pitch_um: f64,

    /// Sampling frequency in Hz
    #[arg(long, default_value_t = 250.0)]
    pub fs: f64,

    /// Duration in seconds
    #[arg(long, default_value_t = 10.0)]
    pub duration_s: f64,

    /// Sinusoidal drift as "amplitude_um,frequency_hz" (repeatable)
    #[arg(long, num_args = 1..)]
    pub sine: Vec<String>,

    /// Step drift as "at_s,size_um" (repeatable)
    #[arg(long, num_args = 1..)]
    pub step: Vec<String>,

    /// Standard deviation of additive noise
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Random seed
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Binary sample type (f32, f64, i16)
    #[arg(long, default_value = "f32")]
    pub format: String,

    /// Also write the prescribed drift as JSON
    #[arg(long)]
    pub truth: Option<String>,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Parse a pair of numbers "a,b"
pub fn parse_pair(s: &str) -> Result<(f64, f64), String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        return Err(format!(
            "Invalid pair format '{}': expected 'a,b' where a and b are numbers",
            s
        ));
    }
    let a = parts[0]
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid pair '{}': '{}' is not a number", s, parts[0]))?;
    let b = parts[1]
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid pair '{}': '{}' is not a number", s, parts[1]))?;
    Ok((a, b))
}

/// Parse a list of pair strings
pub fn parse_pairs(pairs: &[String]) -> Result<Vec<(f64, f64)>, String> {
    pairs.iter().map(|s| parse_pair(s)).collect()
}
