//! Drift estimation for low-frequency probe recordings.
//!
//! Given a preprocessed LFP signal laid out as (time bin, depth channel),
//! estimate how far the probe moved relative to the tissue at each time bin:
//! one value per bin (rigid) or one per bin and spatial window (non-rigid).

pub mod config;
pub mod error;
pub mod estimator;
pub mod mmap_utils;
pub mod parser;
pub mod profiling;
pub mod recording;
pub mod solver;
pub mod spectral;
pub mod synth;
pub mod trajectory;
pub mod types;
pub mod windows;
pub mod xcorr;

pub use config::MotionConfig;
pub use error::{MotionError, Result};
pub use estimator::{
    estimate_motion, ChunkDiagnostics, EstimationDiagnostics, MotionEstimate, MotionEstimator,
};
pub use mmap_utils::SampleType;
pub use recording::{load_signal, save_signal, ChannelGeometry, InputFormat, LoadOptions};
pub use synth::{DriftComponent, DriftingRecording};
pub use trajectory::MotionTrajectory;
pub use types::*;
pub use windows::WindowShape;
