//! Loading and saving preprocessed signal matrices.
//!
//! Two plain containers are supported: delimited text (one row per time bin)
//! and raw interleaved little-endian binary. Neither carries metadata, so the
//! sampling frequency and channel geometry come from `LoadOptions`.

use crate::error::{MotionError, Result};
use crate::mmap_utils::{decode_samples, encode_samples, mmap_file, SampleType};
use crate::parser::parse_matrix_bytes;
use crate::types::SignalMatrix;
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Text,
    Binary,
}

impl InputFormat {
    pub fn from_extension(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "txt" | "ascii" | "csv" | "tsv" => Ok(Self::Text),
            "bin" | "raw" | "dat" => Ok(Self::Binary),
            _ => Err(MotionError::UnsupportedFileType(format!(
                "{} (expected .txt, .ascii, .csv, .tsv, .bin, .raw or .dat)",
                path.display()
            ))),
        }
    }
}

/// Channel depth layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelGeometry {
    Uniform { pitch_um: f64, first_um: f64 },
    Explicit(Vec<f64>),
}

impl Default for ChannelGeometry {
    fn default() -> Self {
        Self::Uniform {
            pitch_um: 20.0,
            first_um: 0.0,
        }
    }
}

impl ChannelGeometry {
    /// Depth of each of `n_channels` channels
    pub fn depths(&self, n_channels: usize) -> Result<Vec<f64>> {
        match self {
            Self::Uniform { pitch_um, first_um } => {
                Ok(SignalMatrix::uniform_depths(n_channels, *pitch_um, *first_um))
            }
            Self::Explicit(depths) if depths.len() == n_channels => Ok(depths.clone()),
            Self::Explicit(depths) => Err(MotionError::MalformedInput(format!(
                "{} depth positions given for {} channels",
                depths.len(),
                n_channels
            ))),
        }
    }
}

/// How to interpret a file that carries only samples
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    pub sampling_frequency: f64,
    pub t_start: f64,
    pub geometry: ChannelGeometry,
    pub sample_type: SampleType,
    /// Channels per time bin, required for binary files
    pub n_channels: Option<usize>,
    /// Factor applied to binary samples
    pub gain: f64,
}

impl LoadOptions {
    pub fn new(sampling_frequency: f64) -> Self {
        Self {
            sampling_frequency,
            t_start: 0.0,
            geometry: ChannelGeometry::default(),
            sample_type: SampleType::default(),
            n_channels: None,
            gain: 1.0,
        }
    }
}

/// Load a signal matrix, choosing the reader from the file extension
pub fn load_signal(path: &Path, options: &LoadOptions) -> Result<SignalMatrix> {
    if !path.exists() {
        return Err(MotionError::FileNotFound(path.display().to_string()));
    }
    let format = InputFormat::from_extension(path)?;
    crate::profile_scope!(format!("load_signal {}", path.display()));

    let metadata = std::fs::metadata(path)?;
    if metadata.len() == 0 {
        return Err(MotionError::MalformedInput(format!(
            "{} is empty",
            path.display()
        )));
    }
    let mmap = mmap_file(path)?;

    let (n_channels, samples) = match format {
        InputFormat::Text => {
            let matrix = parse_matrix_bytes(&mmap)?;
            (matrix.n_cols, matrix.values)
        }
        InputFormat::Binary => {
            let n_channels = options.n_channels.ok_or_else(|| {
                MotionError::InvalidParameter(
                    "the channel count is required for binary input".to_string(),
                )
            })?;
            if n_channels == 0 {
                return Err(MotionError::InvalidParameter(
                    "the channel count must be at least 1".to_string(),
                ));
            }
            let samples = decode_samples(&mmap, options.sample_type, options.gain)?;
            if samples.len() % n_channels != 0 {
                return Err(MotionError::MalformedInput(format!(
                    "{} samples do not divide into {} channels",
                    samples.len(),
                    n_channels
                )));
            }
            (n_channels, samples)
        }
    };

    let n_time = samples.len() / n_channels;
    let depths = options.geometry.depths(n_channels)?;
    let signal = SignalMatrix::new(n_time, n_channels, samples, depths, options.sampling_frequency)?
        .with_start_time(options.t_start);

    log::info!(
        "Loaded {}: {} bins × {} channels at {} Hz",
        path.display(),
        n_time,
        n_channels,
        options.sampling_frequency
    );
    Ok(signal)
}

/// Write a signal matrix as whitespace-separated text, one row per time bin
pub fn save_text(signal: &SignalMatrix, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(std::fs::File::create(path)?);
    writeln!(
        writer,
        "# {} bins x {} channels, fs = {} Hz, pitch = {} um",
        signal.n_time_bins(),
        signal.n_channels(),
        signal.sampling_frequency(),
        signal.pitch_um()
    )?;
    for t in 0..signal.n_time_bins() {
        let line: Vec<String> = signal.row(t).iter().map(|v| format!("{:.6e}", v)).collect();
        writeln!(writer, "{}", line.join(" "))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a signal matrix as raw interleaved little-endian samples
pub fn save_binary(signal: &SignalMatrix, path: &Path, sample_type: SampleType) -> Result<()> {
    std::fs::write(path, encode_samples(signal.samples(), sample_type))?;
    Ok(())
}

/// Write with the format implied by the file extension
pub fn save_signal(signal: &SignalMatrix, path: &Path, sample_type: SampleType) -> Result<()> {
    match InputFormat::from_extension(path)? {
        InputFormat::Text => save_text(signal, path),
        InputFormat::Binary => save_binary(signal, path, sample_type),
    }
}
