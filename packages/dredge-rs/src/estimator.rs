//! Motion estimation driver.
//!
//! Ties the stages together: spatial windows, pairwise displacement per
//! window, correlation weights, and the regularized solve. Long recordings
//! are processed in chunks; each chunk sees the tail of the previous one as
//! fixed bins so the trajectory stays continuous across the boundary.

use crate::config::MotionConfig;
use crate::error::Result;
use crate::solver::{self, SolverSettings, WindowTerms};
use crate::trajectory::MotionTrajectory;
use crate::types::SignalMatrix;
use crate::windows::{spatial_windows, SpatialWindow};
use crate::xcorr::{PairwiseDisplacement, ProfileBank};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Width of the sigmoid used for soft correlation weights
const SOFT_WEIGHT_WIDTH: f64 = 0.05;

/// Solver statistics for one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkDiagnostics {
    /// First time bin solved in this chunk
    pub start_bin: usize,
    pub n_bins: usize,
    /// Correlation threshold applied to this chunk
    pub threshold: f64,
    /// Pairs involving at least one solved bin, over all windows
    pub pairs_compared: usize,
    /// Of those, pairs whose correlation reached the threshold
    pub pairs_kept: usize,
    pub iterations: usize,
    pub relative_residual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationDiagnostics {
    /// Largest time separation of compared pairs, in bins
    pub horizon_bins: usize,
    /// Largest shift searched, in channels
    pub max_shift_channels: usize,
    pub n_windows: usize,
    pub chunks: Vec<ChunkDiagnostics>,
}

impl EstimationDiagnostics {
    pub fn total_iterations(&self) -> usize {
        self.chunks.iter().map(|c| c.iterations).sum()
    }

    /// Fraction of compared pairs that were kept
    pub fn kept_fraction(&self) -> f64 {
        let compared: usize = self.chunks.iter().map(|c| c.pairs_compared).sum();
        let kept: usize = self.chunks.iter().map(|c| c.pairs_kept).sum();
        if compared == 0 {
            0.0
        } else {
            kept as f64 / compared as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionEstimate {
    pub trajectory: MotionTrajectory,
    pub diagnostics: EstimationDiagnostics,
}

/// Stateless motion estimator bound to a validated configuration
#[derive(Debug, Clone)]
pub struct MotionEstimator {
    config: MotionConfig,
}

impl MotionEstimator {
    pub fn new(config: MotionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    fn solver_settings(&self) -> SolverSettings {
        SolverSettings {
            lambda_t: self.config.lambda_t,
            lambda_s: self.config.lambda_s,
            eps: self.config.eps,
            max_iterations: self.config.max_iterations,
            tolerance: self.config.tolerance,
        }
    }

    /// Pair horizon in bins, at least 1 and at most `n_time - 1`
    fn horizon_bins(&self, signal: &SignalMatrix) -> usize {
        let bins = (self.config.window_s * signal.sampling_frequency()).round() as usize;
        bins.max(1).min(signal.n_time_bins() - 1)
    }

    /// Largest shift searched, in channels, at least 1 and at most `n_channels - 1`
    fn max_shift_channels(&self, signal: &SignalMatrix) -> usize {
        let max_disp = self.config.max_disp_um.unwrap_or(if self.config.rigid {
            signal.span_um() / 4.0
        } else {
            self.config.win_scale_um / 2.0
        });
        let lag = (max_disp / signal.pitch_um()).round() as usize;
        lag.clamp(1, signal.n_channels() - 1)
    }

    fn chunk_bins(&self, signal: &SignalMatrix) -> usize {
        match self.config.chunk_len_s {
            Some(len) => ((len * signal.sampling_frequency()).round() as usize).max(1),
            None => signal.n_time_bins(),
        }
    }

    /// Estimate the drift trajectory of `signal`
    pub fn estimate(&self, signal: &SignalMatrix) -> Result<MotionEstimate> {
        crate::profile_scope!("estimate_motion");
        signal.check_extent()?;

        let windows = spatial_windows(signal.depths_um(), &self.config)?;
        let n_time = signal.n_time_bins();
        let horizon = self.horizon_bins(signal);
        let max_lag = self.max_shift_channels(signal);
        let chunk_bins = self.chunk_bins(signal);
        let settings = self.solver_settings();

        log::info!(
            "Estimating {} motion: {} bins × {} channels, {} window(s), horizon {} bins, max shift {} channels",
            if self.config.rigid { "rigid" } else { "non-rigid" },
            n_time,
            signal.n_channels(),
            windows.len(),
            horizon,
            max_lag
        );

        // [window][time]
        let mut displacement = vec![vec![0.0; n_time]; windows.len()];
        let mut chunks = Vec::new();

        let mut start = 0;
        while start < n_time {
            let end = (start + chunk_bins).min(n_time);
            let n_fixed = horizon.min(start);
            let chunk = self.estimate_chunk(
                signal,
                &windows,
                start - n_fixed..end,
                n_fixed,
                horizon,
                max_lag,
                &settings,
                &mut displacement,
            )?;
            log::debug!(
                "Chunk at bin {}: threshold {:.3}, kept {}/{} pairs, {} iterations",
                chunk.start_bin,
                chunk.threshold,
                chunk.pairs_kept,
                chunk.pairs_compared,
                chunk.iterations
            );
            chunks.push(chunk);
            start = end;
        }

        let by_time: Vec<Vec<f64>> = (0..n_time)
            .map(|t| displacement.iter().map(|w| w[t]).collect())
            .collect();
        let trajectory = MotionTrajectory::new(
            by_time,
            signal.t_start(),
            signal.sampling_frequency(),
            windows.iter().map(|w| w.center_um).collect(),
        )?;

        let diagnostics = EstimationDiagnostics {
            horizon_bins: horizon,
            max_shift_channels: max_lag,
            n_windows: windows.len(),
            chunks,
        };

        log::info!(
            "Motion estimated in {} chunk(s), {} solver iterations, {:.1}% of pairs kept, peak displacement {:.2} µm",
            diagnostics.chunks.len(),
            diagnostics.total_iterations(),
            100.0 * diagnostics.kept_fraction(),
            trajectory.peak_displacement_um()
        );

        Ok(MotionEstimate {
            trajectory,
            diagnostics,
        })
    }

    /// Solve the bins `rows.start + n_fixed..rows.end` and write them into `displacement`
    #[allow(clippy::too_many_arguments)]
    fn estimate_chunk(
        &self,
        signal: &SignalMatrix,
        windows: &[SpatialWindow],
        rows: std::ops::Range<usize>,
        n_fixed: usize,
        horizon: usize,
        max_lag: usize,
        settings: &SolverSettings,
        displacement: &mut [Vec<f64>],
    ) -> Result<ChunkDiagnostics> {
        let pitch = signal.pitch_um();
        let pairs: Vec<PairwiseDisplacement> = windows
            .par_iter()
            .map(|window| {
                let bank = ProfileBank::new(signal, &window.weights, rows.clone());
                PairwiseDisplacement::compute(&bank, horizon, max_lag, pitch)
            })
            .collect();

        let threshold = self.threshold(&pairs);
        let mut pairs_compared = 0;
        let mut pairs_kept = 0;
        let weights: Vec<Vec<f64>> = pairs
            .iter()
            .map(|p| {
                let n = p.n_time();
                let h = p.horizon();
                let mut u = vec![0.0; n * h];
                for i in 0..n {
                    for k in 1..=h {
                        let j = i + k;
                        if j >= n {
                            break;
                        }
                        if j < n_fixed {
                            continue;
                        }
                        let c = p.corr(i, k);
                        pairs_compared += 1;
                        if c >= threshold {
                            pairs_kept += 1;
                        }
                        u[i * h + k - 1] = self.weight(c, threshold);
                    }
                }
                u
            })
            .collect();

        let fixed: Vec<&[f64]> = displacement
            .iter()
            .map(|w| &w[rows.start..rows.start + n_fixed])
            .collect();
        let terms: Vec<WindowTerms> = pairs
            .iter()
            .zip(&weights)
            .zip(&fixed)
            .map(|((pairs, weights), fixed)| WindowTerms {
                pairs,
                weights,
                fixed,
            })
            .collect();

        let solution = solver::solve(&terms, n_fixed, settings)?;

        let first = rows.start + n_fixed;
        for (w, values) in solution.displacement.into_iter().enumerate() {
            displacement[w][first..rows.end].copy_from_slice(&values);
        }

        Ok(ChunkDiagnostics {
            start_bin: first,
            n_bins: rows.end - first,
            threshold,
            pairs_compared,
            pairs_kept,
            iterations: solution.iterations,
            relative_residual: solution.relative_residual,
        })
    }

    /// Correlation threshold: fixed, or a percentile of near-neighbour correlations
    fn threshold(&self, pairs: &[PairwiseDisplacement]) -> f64 {
        let Some(pct) = self.config.mincorr_percentile else {
            return self.config.mincorr;
        };
        let mut near: Vec<f64> = pairs
            .iter()
            .flat_map(|p| p.near_neighbour_correlations(self.config.mincorr_percentile_nneighbs))
            .collect();
        match percentile(&mut near, pct) {
            Some(value) => value,
            None => {
                log::warn!(
                    "No near-neighbour correlations for the percentile threshold, using mincorr = {}",
                    self.config.mincorr
                );
                self.config.mincorr
            }
        }
    }

    fn weight(&self, corr: f64, threshold: f64) -> f64 {
        let corr_pos = corr.max(0.0);
        if self.config.soft_weights {
            corr_pos / (1.0 + (-(corr - threshold) / SOFT_WEIGHT_WIDTH).exp())
        } else if corr >= threshold {
            corr_pos
        } else {
            0.0
        }
    }
}

/// Percentile (0-100) with linear interpolation between order statistics
fn percentile(values: &mut [f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let rank = pct / 100.0 * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(values[lo] + (values[hi] - values[lo]) * (rank - lo as f64))
}

/// Estimate motion with a one-off estimator
pub fn estimate_motion(signal: &SignalMatrix, config: &MotionConfig) -> Result<MotionEstimate> {
    MotionEstimator::new(config.clone())?.estimate(signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MotionError;
    use crate::synth::{DriftComponent, DriftingRecording};

    fn recording() -> DriftingRecording {
        DriftingRecording::default()
            .with_probe(32, 20.0)
            .with_sampling(50.0, 4.0)
            .with_seed(3)
    }

    fn rigid() -> MotionConfig {
        MotionConfig {
            chunk_len_s: None,
            ..MotionConfig::rigid(0.5)
        }
    }

    fn centered(values: &[f64]) -> Vec<f64> {
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        values.iter().map(|v| v - mean).collect()
    }

    fn pearson(a: &[f64], b: &[f64]) -> f64 {
        let (a, b) = (centered(a), centered(b));
        let dot: f64 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
        let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
        dot / (na * nb)
    }

    #[test]
    fn test_zero_drift_gives_flat_trajectory() {
        let signal = recording().generate().unwrap();
        let estimate = estimate_motion(&signal, &rigid()).unwrap();
        let traj = &estimate.trajectory;

        assert_eq!(traj.n_time_bins(), signal.n_time_bins());
        assert!(traj.is_rigid());
        assert!(
            traj.peak_displacement_um() < signal.pitch_um() / 2.0,
            "peak = {}",
            traj.peak_displacement_um()
        );
    }

    #[test]
    fn test_sinusoidal_drift_frequency_recovered() {
        let rec = recording()
            .with_sampling(50.0, 8.0)
            .with_drift(DriftComponent::sine(40.0, 1.0));
        let signal = rec.generate().unwrap();
        let estimate = estimate_motion(&signal, &rigid()).unwrap();

        let trace = estimate.trajectory.displacement_column(0);
        assert!(pearson(&trace, &rec.true_drift()) > 0.8);

        let f = estimate
            .trajectory
            .dominant_frequency_hz(0, 0.1, 10.0)
            .unwrap();
        assert!((f - 1.0).abs() < 0.1, "f = {}", f);
    }

    #[test]
    fn test_output_shape_rigid_and_non_rigid() {
        let signal = recording().with_probe(64, 20.0).generate().unwrap();

        let estimate = estimate_motion(&signal, &rigid()).unwrap();
        assert_eq!(estimate.trajectory.n_spatial_bins(), 1);
        assert!(estimate
            .trajectory
            .displacement_um()
            .iter()
            .all(|row| row.len() == 1));

        let estimate = estimate_motion(&signal, &non_rigid()).unwrap();
        assert_eq!(
            estimate.trajectory.spatial_bins_um(),
            &[180.0, 480.0, 780.0, 1080.0]
        );
        assert_eq!(estimate.trajectory.n_time_bins(), signal.n_time_bins());
        assert!(estimate
            .trajectory
            .displacement_um()
            .iter()
            .all(|row| row.len() == 4));
        assert_eq!(estimate.diagnostics.n_windows, 4);
    }

    fn non_rigid() -> MotionConfig {
        MotionConfig {
            win_scale_um: 300.0,
            chunk_len_s: None,
            ..MotionConfig::non_rigid(0.5, 300.0)
        }
    }

    #[test]
    fn test_non_rigid_zero_drift_flat_in_every_bin() {
        let signal = recording().with_probe(64, 20.0).generate().unwrap();
        let traj = estimate_motion(&signal, &non_rigid()).unwrap().trajectory;

        assert_eq!(traj.n_spatial_bins(), 4);
        for s in 0..traj.n_spatial_bins() {
            let peak = traj
                .displacement_column(s)
                .iter()
                .fold(0.0f64, |m, v| m.max(v.abs()));
            assert!(peak < signal.pitch_um() / 2.0, "bin {}: peak = {}", s, peak);
        }
    }

    #[test]
    fn test_non_rigid_recovers_shared_sine_in_every_bin() {
        let rec = recording()
            .with_probe(64, 20.0)
            .with_drift(DriftComponent::sine(30.0, 1.0));
        let signal = rec.generate().unwrap();
        let traj = estimate_motion(&signal, &non_rigid()).unwrap().trajectory;
        let truth = centered(&rec.true_drift());
        let truth_power: f64 = truth.iter().map(|v| v * v).sum();

        for s in 0..traj.n_spatial_bins() {
            let trace = centered(&traj.displacement_column(s));
            let r = pearson(&trace, &truth);
            assert!(r > 0.98, "bin {}: r = {}", s, r);

            // Least-squares gain of the estimate against the prescribed drift
            let gain = trace.iter().zip(&truth).map(|(e, t)| e * t).sum::<f64>() / truth_power;
            assert!((gain - 1.0).abs() < 0.15, "bin {}: gain = {}", s, gain);
        }
    }

    #[test]
    fn test_repeated_estimation_is_identical() {
        let signal = recording()
            .with_drift(DriftComponent::sine(30.0, 1.5))
            .with_noise(0.05)
            .generate()
            .unwrap();
        let estimator = MotionEstimator::new(rigid()).unwrap();
        let first = estimator.estimate(&signal).unwrap();
        let second = estimator.estimate(&signal).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_minimum_extent_boundary() {
        let depths = SignalMatrix::uniform_depths(3, 20.0, 0.0);
        let rows = vec![vec![0.0, 1.0, 0.0], vec![0.0, 1.0, 0.2], vec![0.1, 1.0, 0.0]];
        let signal = SignalMatrix::from_rows(rows.clone(), depths.clone(), 10.0).unwrap();
        let estimate = estimate_motion(&signal, &MotionConfig::default()).unwrap();
        assert_eq!(estimate.trajectory.n_time_bins(), 3);

        let short = SignalMatrix::from_rows(rows[..2].to_vec(), depths, 10.0).unwrap();
        assert!(matches!(
            estimate_motion(&short, &MotionConfig::default()),
            Err(MotionError::InsufficientData { min: 3, actual: 2, .. })
        ));

        let narrow_rows: Vec<Vec<f64>> = rows.iter().map(|r| r[..2].to_vec()).collect();
        let narrow =
            SignalMatrix::from_rows(narrow_rows, SignalMatrix::uniform_depths(2, 20.0, 0.0), 10.0)
                .unwrap();
        assert!(matches!(
            estimate_motion(&narrow, &MotionConfig::default()),
            Err(MotionError::InsufficientData {
                axis: "depth channels",
                ..
            })
        ));
    }

    #[test]
    fn test_step_drift_recovered_up_to_gauge() {
        let rec = recording().with_drift(DriftComponent::Step {
            at_s: 2.0,
            size_um: 60.0,
        });
        let signal = rec.generate().unwrap();
        let trace = estimate_motion(&signal, &rigid())
            .unwrap()
            .trajectory
            .displacement_column(0);

        let mean = |s: &[f64]| s.iter().sum::<f64>() / s.len() as f64;
        // skip a quarter second on either side of the step
        let before = mean(&trace[..88]);
        let after = mean(&trace[113..]);
        assert!((after - before - 60.0).abs() < 10.0, "step = {}", after - before);
    }

    #[test]
    fn test_noise_segment_does_not_create_jumps() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let clean = recording().with_probe(64, 20.0).generate().unwrap();
        let n_ch = clean.n_channels();
        let mut rng = StdRng::seed_from_u64(99);

        // bins 90..110 replaced by pure noise
        let mut samples = clean.samples().to_vec();
        for v in &mut samples[90 * n_ch..110 * n_ch] {
            *v = rng.random_range(-1.0..1.0);
        }
        let signal = SignalMatrix::new(
            clean.n_time_bins(),
            n_ch,
            samples,
            clean.depths_um().to_vec(),
            clean.sampling_frequency(),
        )
        .unwrap();

        let estimate = estimate_motion(&signal, &rigid()).unwrap();
        let trace = estimate.trajectory.displacement_column(0);
        assert!(estimate.diagnostics.chunks[0].pairs_kept < estimate.diagnostics.chunks[0].pairs_compared);
        for pair in trace.windows(2) {
            assert!((pair[1] - pair[0]).abs() < signal.pitch_um() / 2.0, "{:?}", pair);
        }
        assert!(trace.iter().all(|v| v.abs() < signal.pitch_um()));
    }

    #[test]
    fn test_chunked_matches_unchunked() {
        let rec = recording()
            .with_sampling(50.0, 8.0)
            .with_drift(DriftComponent::sine(30.0, 1.0));
        let signal = rec.generate().unwrap();

        let whole = estimate_motion(&signal, &rigid()).unwrap();
        let chunked_config = MotionConfig {
            chunk_len_s: Some(2.0),
            ..rigid()
        };
        let chunked = estimate_motion(&signal, &chunked_config).unwrap();
        assert_eq!(chunked.diagnostics.chunks.len(), 4);
        assert_eq!(chunked.diagnostics.chunks[1].start_bin, 100);

        let a = centered(&whole.trajectory.displacement_column(0));
        let b = centered(&chunked.trajectory.displacement_column(0));
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 5.0, "{} vs {}", x, y);
        }
    }

    #[test]
    fn test_iteration_budget_reports_non_convergence() {
        let signal = recording()
            .with_drift(DriftComponent::sine(30.0, 1.0))
            .generate()
            .unwrap();
        let config = MotionConfig {
            max_iterations: 1,
            ..rigid()
        };
        assert!(matches!(
            estimate_motion(&signal, &config),
            Err(MotionError::NonConvergence { .. })
        ));
    }

    #[test]
    fn test_percentile_threshold() {
        let signal = recording()
            .with_drift(DriftComponent::sine(30.0, 1.0))
            .with_noise(0.2)
            .generate()
            .unwrap();
        let config = MotionConfig {
            mincorr_percentile: Some(10.0),
            mincorr_percentile_nneighbs: 5,
            ..rigid()
        };
        let estimate = estimate_motion(&signal, &config).unwrap();
        let chunk = &estimate.diagnostics.chunks[0];
        assert_ne!(chunk.threshold, config.mincorr);
        assert!(chunk.threshold > 0.0 && chunk.threshold < 1.0);
        assert!(chunk.pairs_kept < chunk.pairs_compared);
    }

    #[test]
    fn test_soft_weights_are_graded() {
        let estimator = MotionEstimator::new(MotionConfig {
            soft_weights: true,
            ..rigid()
        })
        .unwrap();
        let at = estimator.weight(0.8, 0.8);
        assert!((at - 0.4).abs() < 1e-12);
        assert!(estimator.weight(0.95, 0.8) > 0.9);
        assert!(estimator.weight(0.5, 0.8) < 1e-2);

        let hard = MotionEstimator::new(rigid()).unwrap();
        assert_eq!(hard.weight(0.79, 0.8), 0.0);
        assert_eq!(hard.weight(0.9, 0.8), 0.9);
    }

    #[test]
    fn test_percentile_interpolates() {
        let mut values = vec![4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&mut values, 0.0), Some(1.0));
        assert_eq!(percentile(&mut values, 100.0), Some(4.0));
        assert_eq!(percentile(&mut values, 50.0), Some(2.5));
        assert_eq!(percentile(&mut [], 50.0), None);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = MotionConfig {
            lambda_t: 0.0,
            ..MotionConfig::default()
        };
        assert!(matches!(
            MotionEstimator::new(config),
            Err(MotionError::InvalidParameter(_))
        ));
    }
}
