use dredge_rs::{EstimationDiagnostics, MotionConfig, MotionEstimate, MotionTrajectory, SignalMatrix};
use serde::Serialize;

/// Shape of the recording a report was computed from
#[derive(Serialize)]
pub struct InputSummary {
    pub file: String,
    pub n_time_bins: usize,
    pub n_channels: usize,
    pub sampling_frequency: f64,
    pub pitch_um: f64,
    pub duration_s: f64,
}

/// JSON report written by `estimate` and `batch`
#[derive(Serialize)]
pub struct EstimateReport {
    pub id: String,
    pub created_at: String,
    pub input: InputSummary,
    pub config: MotionConfig,
    pub trajectory: MotionTrajectory,
    pub diagnostics: EstimationDiagnostics,
    /// Dominant drift frequency of the central spatial bin
    pub dominant_frequency_hz: Option<f64>,
}

impl EstimateReport {
    pub fn new(
        file: &str,
        signal: &SignalMatrix,
        config: MotionConfig,
        estimate: MotionEstimate,
        band: (f64, f64),
    ) -> Self {
        let center = estimate.trajectory.n_spatial_bins() / 2;
        let dominant_frequency_hz = estimate
            .trajectory
            .dominant_frequency_hz(center, band.0, band.1);

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            input: InputSummary {
                file: file.to_string(),
                n_time_bins: signal.n_time_bins(),
                n_channels: signal.n_channels(),
                sampling_frequency: signal.sampling_frequency(),
                pitch_um: signal.pitch_um(),
                duration_s: signal.duration_s(),
            },
            config,
            trajectory: estimate.trajectory,
            diagnostics: estimate.diagnostics,
            dominant_frequency_hz,
        }
    }
}
