use crate::error::{MotionError, Result};

/// Fewest time bins the estimator accepts
pub const MIN_TIME_BINS: usize = 3;

/// Fewest depth channels the estimator accepts
pub const MIN_DEPTH_CHANNELS: usize = 3;

/// Relative tolerance used when checking that timestamps and depths are evenly spaced
const SPACING_TOLERANCE: f64 = 1e-3;

/// Preprocessed traces indexed by (time bin, depth channel)
///
/// Samples are stored row-major: one contiguous row of `n_channels` values per
/// time bin. Depths are strictly increasing and evenly spaced; the sampling
/// interval is uniform.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalMatrix {
    n_time: usize,
    n_channels: usize,
    samples: Vec<f64>,
    depths_um: Vec<f64>,
    sampling_frequency: f64,
    t_start: f64,
}

impl SignalMatrix {
    /// Build a matrix from row-major samples
    ///
    /// # Arguments
    /// * `n_time` - Number of time bins (rows)
    /// * `n_channels` - Number of depth channels (columns)
    /// * `samples` - `n_time * n_channels` values, row-major
    /// * `depths_um` - Channel depth positions in µm
    /// * `sampling_frequency` - Sampling rate in Hz
    pub fn new(
        n_time: usize,
        n_channels: usize,
        samples: Vec<f64>,
        depths_um: Vec<f64>,
        sampling_frequency: f64,
    ) -> Result<Self> {
        if samples.len() != n_time * n_channels {
            return Err(MotionError::MalformedInput(format!(
                "expected {} samples for {} time bins × {} channels, got {}",
                n_time * n_channels,
                n_time,
                n_channels,
                samples.len()
            )));
        }
        if depths_um.len() != n_channels {
            return Err(MotionError::MalformedInput(format!(
                "{} depth positions for {} channels",
                depths_um.len(),
                n_channels
            )));
        }
        if !sampling_frequency.is_finite() || sampling_frequency <= 0.0 {
            return Err(MotionError::MalformedInput(format!(
                "sampling frequency must be positive and finite, got {}",
                sampling_frequency
            )));
        }
        if let Some(idx) = samples.iter().position(|v| !v.is_finite()) {
            return Err(MotionError::MalformedInput(format!(
                "non-finite sample at time bin {}, channel {}",
                idx / n_channels.max(1),
                idx % n_channels.max(1)
            )));
        }
        check_depths(&depths_um)?;

        Ok(Self {
            n_time,
            n_channels,
            samples,
            depths_um,
            sampling_frequency,
            t_start: 0.0,
        })
    }

    /// Build a matrix from one `Vec` per time bin
    pub fn from_rows(rows: Vec<Vec<f64>>, depths_um: Vec<f64>, sampling_frequency: f64) -> Result<Self> {
        let n_time = rows.len();
        let n_channels = rows.first().map(|r| r.len()).unwrap_or(0);

        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_channels) {
            return Err(MotionError::MalformedInput(format!(
                "time bin {} has {} channels, expected {}",
                idx,
                row.len(),
                n_channels
            )));
        }

        let samples = rows.into_iter().flatten().collect();
        Self::new(n_time, n_channels, samples, depths_um, sampling_frequency)
    }

    /// Build a matrix from per-bin timestamps instead of a sampling frequency
    ///
    /// The timestamps must be strictly increasing with a uniform interval.
    pub fn from_timestamps(
        n_channels: usize,
        samples: Vec<f64>,
        depths_um: Vec<f64>,
        times_s: &[f64],
    ) -> Result<Self> {
        if times_s.len() < 2 {
            return Err(MotionError::InsufficientData {
                axis: "timestamps",
                min: 2,
                actual: times_s.len(),
            });
        }

        let interval = times_s[1] - times_s[0];
        if !interval.is_finite() || interval <= 0.0 {
            return Err(MotionError::MalformedInput(format!(
                "timestamps must be strictly increasing (t[0]={}, t[1]={})",
                times_s[0], times_s[1]
            )));
        }
        for (idx, pair) in times_s.windows(2).enumerate() {
            let step = pair[1] - pair[0];
            if (step - interval).abs() > SPACING_TOLERANCE * interval {
                return Err(MotionError::MalformedInput(format!(
                    "non-uniform sampling interval at bin {}: {} s vs {} s",
                    idx + 1,
                    step,
                    interval
                )));
            }
        }

        let n_time = times_s.len();
        let fs = 1.0 / interval;
        Ok(Self::new(n_time, n_channels, samples, depths_um, fs)?.with_start_time(times_s[0]))
    }

    /// Set the time of the first bin in seconds
    pub fn with_start_time(mut self, t_start: f64) -> Self {
        self.t_start = t_start;
        self
    }

    /// Evenly spaced depth positions starting at `first_um`
    pub fn uniform_depths(n_channels: usize, pitch_um: f64, first_um: f64) -> Vec<f64> {
        (0..n_channels)
            .map(|c| first_um + c as f64 * pitch_um)
            .collect()
    }

    /// Check the minimum time and depth extent needed for estimation
    pub fn check_extent(&self) -> Result<()> {
        if self.n_time < MIN_TIME_BINS {
            return Err(MotionError::InsufficientData {
                axis: "time bins",
                min: MIN_TIME_BINS,
                actual: self.n_time,
            });
        }
        if self.n_channels < MIN_DEPTH_CHANNELS {
            return Err(MotionError::InsufficientData {
                axis: "depth channels",
                min: MIN_DEPTH_CHANNELS,
                actual: self.n_channels,
            });
        }
        Ok(())
    }

    pub fn n_time_bins(&self) -> usize {
        self.n_time
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// Depth profile of one time bin
    pub fn row(&self, t: usize) -> &[f64] {
        &self.samples[t * self.n_channels..(t + 1) * self.n_channels]
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn depths_um(&self) -> &[f64] {
        &self.depths_um
    }

    /// Channel spacing in µm, 0 for single-channel matrices
    pub fn pitch_um(&self) -> f64 {
        if self.n_channels < 2 {
            0.0
        } else {
            (self.depths_um[self.n_channels - 1] - self.depths_um[0]) / (self.n_channels - 1) as f64
        }
    }

    /// Distance between the first and last channel
    pub fn span_um(&self) -> f64 {
        match (self.depths_um.first(), self.depths_um.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    pub fn sampling_frequency(&self) -> f64 {
        self.sampling_frequency
    }

    pub fn t_start(&self) -> f64 {
        self.t_start
    }

    /// Time of bin `t` in seconds
    pub fn time_of(&self, t: usize) -> f64 {
        self.t_start + t as f64 / self.sampling_frequency
    }

    pub fn duration_s(&self) -> f64 {
        self.n_time as f64 / self.sampling_frequency
    }
}

fn check_depths(depths_um: &[f64]) -> Result<()> {
    if let Some(idx) = depths_um.iter().position(|d| !d.is_finite()) {
        return Err(MotionError::MalformedInput(format!(
            "non-finite depth at channel {}",
            idx
        )));
    }
    if depths_um.len() < 2 {
        return Ok(());
    }

    let pitch = depths_um[1] - depths_um[0];
    for (idx, pair) in depths_um.windows(2).enumerate() {
        let step = pair[1] - pair[0];
        if step <= 0.0 {
            return Err(MotionError::MalformedInput(format!(
                "depths must be strictly increasing: channel {} at {} µm, channel {} at {} µm",
                idx,
                pair[0],
                idx + 1,
                pair[1]
            )));
        }
        if (step - pitch).abs() > SPACING_TOLERANCE * pitch {
            return Err(MotionError::MalformedInput(format!(
                "depths must be evenly spaced: step {} µm at channel {} vs pitch {} µm",
                step,
                idx + 1,
                pitch
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depths(n: usize) -> Vec<f64> {
        SignalMatrix::uniform_depths(n, 20.0, 0.0)
    }

    #[test]
    fn test_new_checks_shape() {
        let result = SignalMatrix::new(2, 3, vec![0.0; 5], depths(3), 100.0);
        assert!(matches!(result, Err(MotionError::MalformedInput(_))));

        let result = SignalMatrix::new(2, 3, vec![0.0; 6], depths(2), 100.0);
        assert!(matches!(result, Err(MotionError::MalformedInput(_))));
    }

    #[test]
    fn test_rejects_non_monotonic_depths() {
        let result = SignalMatrix::new(1, 3, vec![0.0; 3], vec![0.0, 40.0, 20.0], 100.0);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("strictly increasing"));
    }

    #[test]
    fn test_rejects_uneven_depths() {
        let result = SignalMatrix::new(1, 3, vec![0.0; 3], vec![0.0, 20.0, 50.0], 100.0);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("evenly spaced"));
    }

    #[test]
    fn test_rejects_non_finite_samples() {
        let mut samples = vec![1.0; 6];
        samples[4] = f64::NAN;
        let err = SignalMatrix::new(2, 3, samples, depths(3), 100.0).unwrap_err();
        assert!(err.to_string().contains("time bin 1, channel 1"));
    }

    #[test]
    fn test_rejects_bad_sampling_frequency() {
        assert!(SignalMatrix::new(1, 3, vec![0.0; 3], depths(3), 0.0).is_err());
        assert!(SignalMatrix::new(1, 3, vec![0.0; 3], depths(3), f64::INFINITY).is_err());
    }

    #[test]
    fn test_from_timestamps_uniform() {
        let times = [10.0, 10.004, 10.008, 10.012];
        let m = SignalMatrix::from_timestamps(3, vec![0.0; 12], depths(3), &times).unwrap();
        assert!((m.sampling_frequency() - 250.0).abs() < 1e-6);
        assert_eq!(m.t_start(), 10.0);
        assert!((m.time_of(2) - 10.008).abs() < 1e-9);
    }

    #[test]
    fn test_from_timestamps_rejects_jitter() {
        let times = [0.0, 0.004, 0.009, 0.012];
        let err = SignalMatrix::from_timestamps(3, vec![0.0; 12], depths(3), &times).unwrap_err();
        assert!(err.to_string().contains("non-uniform sampling interval"));
    }

    #[test]
    fn test_from_rows_and_accessors() {
        let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let m = SignalMatrix::from_rows(rows, depths(3), 50.0).unwrap();
        assert_eq!(m.n_time_bins(), 2);
        assert_eq!(m.n_channels(), 3);
        assert_eq!(m.row(1), &[4.0, 5.0, 6.0]);
        assert_eq!(m.pitch_um(), 20.0);
        assert_eq!(m.span_um(), 40.0);
        assert!((m.duration_s() - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_from_rows_ragged() {
        let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0]];
        assert!(SignalMatrix::from_rows(rows, depths(3), 50.0).is_err());
    }

    #[test]
    fn test_check_extent_boundary() {
        let ok = SignalMatrix::new(3, 3, vec![0.0; 9], depths(3), 10.0).unwrap();
        assert!(ok.check_extent().is_ok());

        let short = SignalMatrix::new(2, 3, vec![0.0; 6], depths(3), 10.0).unwrap();
        assert!(matches!(
            short.check_extent(),
            Err(MotionError::InsufficientData { min: 3, actual: 2, .. })
        ));

        let narrow = SignalMatrix::new(3, 2, vec![0.0; 6], depths(2), 10.0).unwrap();
        assert!(matches!(
            narrow.check_extent(),
            Err(MotionError::InsufficientData { axis: "depth channels", .. })
        ));
    }
}
