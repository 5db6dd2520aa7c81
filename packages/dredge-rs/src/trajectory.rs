use crate::error::{MotionError, Result};
use crate::spectral;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Estimated probe displacement over time
///
/// `displacement_um[t][s]` is the displacement of spatial bin `s` during time
/// bin `t`. Rigid trajectories have a single spatial bin. Time bins line up
/// one-to-one with the samples of the signal the trajectory was estimated
/// from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionTrajectory {
    displacement_um: Vec<Vec<f64>>,
    temporal_bins_s: Vec<f64>,
    temporal_bin_edges_s: Vec<f64>,
    spatial_bins_um: Vec<f64>,
}

impl MotionTrajectory {
    /// Assemble a trajectory from `[time][spatial]` displacement
    ///
    /// Bin edges are placed half a sampling interval on either side of each
    /// time bin center.
    pub fn new(
        displacement_um: Vec<Vec<f64>>,
        t_start: f64,
        sampling_frequency: f64,
        spatial_bins_um: Vec<f64>,
    ) -> Result<Self> {
        let n_time = displacement_um.len();
        let interval = 1.0 / sampling_frequency;
        let temporal_bins_s: Vec<f64> = (0..n_time)
            .map(|t| t_start + t as f64 * interval)
            .collect();
        let temporal_bin_edges_s: Vec<f64> = (0..=n_time)
            .map(|t| t_start + (t as f64 - 0.5) * interval)
            .collect();

        let trajectory = Self {
            displacement_um,
            temporal_bins_s,
            temporal_bin_edges_s,
            spatial_bins_um,
        };
        trajectory.check()?;
        Ok(trajectory)
    }

    fn check(&self) -> Result<()> {
        let n_time = self.temporal_bins_s.len();
        let n_spatial = self.spatial_bins_um.len();
        if n_time == 0 || n_spatial == 0 {
            return Err(MotionError::MalformedInput(
                "trajectory needs at least one time bin and one spatial bin".to_string(),
            ));
        }
        if self.displacement_um.len() != n_time || self.temporal_bin_edges_s.len() != n_time + 1 {
            return Err(MotionError::MalformedInput(format!(
                "{} displacement rows and {} bin edges for {} time bins",
                self.displacement_um.len(),
                self.temporal_bin_edges_s.len(),
                n_time
            )));
        }
        if let Some(t) = self.displacement_um.iter().position(|row| row.len() != n_spatial) {
            return Err(MotionError::MalformedInput(format!(
                "time bin {} has {} values for {} spatial bins",
                t,
                self.displacement_um[t].len(),
                n_spatial
            )));
        }
        if self
            .spatial_bins_um
            .windows(2)
            .any(|pair| pair[1] <= pair[0])
        {
            return Err(MotionError::MalformedInput(
                "spatial bins must be strictly increasing".to_string(),
            ));
        }
        Ok(())
    }

    pub fn n_time_bins(&self) -> usize {
        self.temporal_bins_s.len()
    }

    pub fn n_spatial_bins(&self) -> usize {
        self.spatial_bins_um.len()
    }

    pub fn is_rigid(&self) -> bool {
        self.spatial_bins_um.len() == 1
    }

    pub fn displacement_um(&self) -> &[Vec<f64>] {
        &self.displacement_um
    }

    /// Displacement of every spatial bin at time bin `t`
    pub fn displacement_row(&self, t: usize) -> &[f64] {
        &self.displacement_um[t]
    }

    /// Displacement trace of spatial bin `s`
    pub fn displacement_column(&self, s: usize) -> Vec<f64> {
        self.displacement_um.iter().map(|row| row[s]).collect()
    }

    pub fn temporal_bins_s(&self) -> &[f64] {
        &self.temporal_bins_s
    }

    pub fn temporal_bin_edges_s(&self) -> &[f64] {
        &self.temporal_bin_edges_s
    }

    pub fn spatial_bins_um(&self) -> &[f64] {
        &self.spatial_bins_um
    }

    pub fn sampling_frequency(&self) -> f64 {
        let n = self.temporal_bin_edges_s.len();
        (n - 1) as f64 / (self.temporal_bin_edges_s[n - 1] - self.temporal_bin_edges_s[0])
    }

    /// Displacement at an arbitrary time and depth
    ///
    /// Linear in time and depth between bin centers; clamped to the first or
    /// last bin outside the covered range.
    pub fn displacement_at(&self, time_s: f64, depth_um: f64) -> f64 {
        let (t0, t1, wt) = bracket(&self.temporal_bins_s, time_s);
        let (s0, s1, ws) = bracket(&self.spatial_bins_um, depth_um);

        let at = |t: usize| {
            let row = &self.displacement_um[t];
            row[s0] * (1.0 - ws) + row[s1] * ws
        };
        at(t0) * (1.0 - wt) + at(t1) * wt
    }

    /// Dominant oscillation frequency of spatial bin `s` within `[min_hz, max_hz]`
    pub fn dominant_frequency_hz(&self, s: usize, min_hz: f64, max_hz: f64) -> Option<f64> {
        if s >= self.n_spatial_bins() {
            return None;
        }
        spectral::dominant_frequency(
            &self.displacement_column(s),
            self.sampling_frequency(),
            min_hz,
            max_hz,
        )
    }

    /// Largest absolute displacement over all bins
    pub fn peak_displacement_um(&self) -> f64 {
        self.displacement_um
            .iter()
            .flatten()
            .fold(0.0, |acc: f64, v| acc.max(v.abs()))
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MotionError::FileNotFound(path.display().to_string()));
        }
        let trajectory: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        trajectory.check()?;
        Ok(trajectory)
    }
}

/// Neighbouring indices around `x` in sorted `points` and the weight of the upper one
fn bracket(points: &[f64], x: f64) -> (usize, usize, f64) {
    let last = points.len() - 1;
    if last == 0 || x <= points[0] {
        return (0, 0, 0.0);
    }
    if x >= points[last] {
        return (last, last, 0.0);
    }
    let upper = points.partition_point(|&p| p <= x);
    let lower = upper - 1;
    let w = (x - points[lower]) / (points[upper] - points[lower]);
    (lower, upper, w)
}
