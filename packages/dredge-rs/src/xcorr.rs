//! Pairwise displacement between time bins.
//!
//! Each time bin's depth profile is windowed, centered and scaled to unit
//! norm. For two bins the normalized cross-correlation is evaluated over
//! whole-channel shifts; the best shift (refined to sub-channel precision by
//! a parabola through the peak) is the displacement of the later bin relative
//! to the earlier one, and the peak value measures how much to trust it.

use crate::types::SignalMatrix;
use rayon::prelude::*;
use std::ops::Range;

/// Windowed, centered, unit-norm depth profiles for a range of time bins
#[derive(Debug, Clone)]
pub struct ProfileBank {
    n_channels: usize,
    profiles: Vec<f64>,
    valid: Vec<bool>,
}

impl ProfileBank {
    /// Prepare the profiles of `rows` weighted by `window`
    pub fn new(signal: &SignalMatrix, window: &[f64], rows: Range<usize>) -> Self {
        let n_channels = signal.n_channels();
        let n_rows = rows.len();
        let mut profiles = vec![0.0; n_rows * n_channels];
        let mut valid = vec![false; n_rows];

        profiles
            .par_chunks_mut(n_channels)
            .zip(valid.par_iter_mut())
            .enumerate()
            .for_each(|(r, (out, ok))| {
                let row = signal.row(rows.start + r);
                for ((o, &x), &w) in out.iter_mut().zip(row).zip(window) {
                    *o = x * w;
                }
                let mean = out.iter().sum::<f64>() / n_channels as f64;
                out.iter_mut().for_each(|v| *v -= mean);
                let norm = out.iter().map(|v| v * v).sum::<f64>().sqrt();
                if norm > f64::EPSILON {
                    out.iter_mut().for_each(|v| *v /= norm);
                    *ok = true;
                } else {
                    out.iter_mut().for_each(|v| *v = 0.0);
                }
            });

        Self {
            n_channels,
            profiles,
            valid,
        }
    }

    pub fn len(&self) -> usize {
        self.valid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }

    /// Profile of row `r`, `None` when the row is flat
    pub fn profile(&self, r: usize) -> Option<&[f64]> {
        if self.valid[r] {
            Some(&self.profiles[r * self.n_channels..(r + 1) * self.n_channels])
        } else {
            None
        }
    }
}

/// Location and height of a cross-correlation peak
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftPeak {
    /// Shift in channels (fractional after refinement)
    pub shift: f64,
    pub corr: f64,
}

/// Correlation of `a` against `b` shifted by `lag` channels: Σ a[k]·b[k + lag]
fn lagged_dot(a: &[f64], b: &[f64], lag: isize) -> f64 {
    let n = a.len() as isize;
    let (start, end) = if lag >= 0 { (0, n - lag) } else { (-lag, n) };
    if end <= start {
        return 0.0;
    }
    let (start, end) = (start as usize, end as usize);
    let offset = (start as isize + lag) as usize;
    a[start..end]
        .iter()
        .zip(&b[offset..offset + (end - start)])
        .map(|(x, y)| x * y)
        .sum()
}

/// Find the shift in `-max_lag..=max_lag` maximizing the correlation of `a` and `b`
///
/// Ties go to the smallest absolute shift. `buffer` must hold `2 * max_lag + 1` values.
pub fn best_shift(a: &[f64], b: &[f64], max_lag: usize, buffer: &mut [f64]) -> ShiftPeak {
    let max_lag = max_lag as isize;
    for lag in -max_lag..=max_lag {
        buffer[(lag + max_lag) as usize] = lagged_dot(a, b, lag);
    }

    let mut best = 0isize;
    let mut best_corr = buffer[max_lag as usize];
    for step in 1..=max_lag {
        for lag in [step, -step] {
            let c = buffer[(lag + max_lag) as usize];
            if c > best_corr {
                best = lag;
                best_corr = c;
            }
        }
    }

    let mut shift = best as f64;
    if best > -max_lag && best < max_lag {
        let minus = buffer[(best - 1 + max_lag) as usize];
        let plus = buffer[(best + 1 + max_lag) as usize];
        let curvature = minus - 2.0 * best_corr + plus;
        if curvature < 0.0 {
            shift += (0.5 * (minus - plus) / curvature).clamp(-0.5, 0.5);
        }
    }

    ShiftPeak {
        shift,
        corr: best_corr,
    }
}

/// Displacement and peak correlation for every pair of bins at most `horizon` apart
///
/// Entry `(i, k)` describes the pair `(i, i + k)` for `1 <= k <= horizon`.
/// Pairs running past the last bin, or involving a flat profile, hold a
/// correlation of zero.
#[derive(Debug, Clone)]
pub struct PairwiseDisplacement {
    n_time: usize,
    horizon: usize,
    disp_um: Vec<f64>,
    corr: Vec<f64>,
}

impl PairwiseDisplacement {
    pub fn compute(bank: &ProfileBank, horizon: usize, max_lag: usize, pitch_um: f64) -> Self {
        let n_time = bank.len();
        let horizon = horizon.max(1);
        let mut disp_um = vec![0.0; n_time * horizon];
        let mut corr = vec![0.0; n_time * horizon];

        disp_um
            .par_chunks_mut(horizon)
            .zip(corr.par_chunks_mut(horizon))
            .enumerate()
            .for_each(|(i, (d_row, c_row))| {
                let Some(a) = bank.profile(i) else {
                    return;
                };
                let mut buffer = vec![0.0; 2 * max_lag + 1];
                for k in 1..=horizon {
                    let j = i + k;
                    if j >= n_time {
                        break;
                    }
                    if let Some(b) = bank.profile(j) {
                        let peak = best_shift(a, b, max_lag, &mut buffer);
                        d_row[k - 1] = peak.shift * pitch_um;
                        c_row[k - 1] = peak.corr;
                    }
                }
            });

        Self {
            n_time,
            horizon,
            disp_um,
            corr,
        }
    }

    pub fn n_time(&self) -> usize {
        self.n_time
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Displacement (µm) of bin `i + k` relative to bin `i`
    pub fn disp(&self, i: usize, k: usize) -> f64 {
        self.disp_um[i * self.horizon + k - 1]
    }

    /// Peak correlation of the pair `(i, i + k)`
    pub fn corr(&self, i: usize, k: usize) -> f64 {
        self.corr[i * self.horizon + k - 1]
    }

    /// Correlations of every pair at most `nneighbs` bins apart
    pub fn near_neighbour_correlations(&self, nneighbs: usize) -> Vec<f64> {
        let reach = nneighbs.min(self.horizon);
        let mut values = Vec::new();
        for i in 0..self.n_time {
            for k in 1..=reach {
                if i + k >= self.n_time {
                    break;
                }
                values.push(self.corr(i, k));
            }
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Asymmetric bump pattern sampled on 32 channels, shifted by `shift` channels
    fn pattern(shift: f64) -> Vec<f64> {
        (0..32)
            .map(|c| {
                let y = c as f64 - shift;
                (-(y - 12.0).powi(2) / 6.0).exp() + 0.6 * (-(y - 20.0).powi(2) / 2.0).exp()
                    - 0.4 * (-(y - 7.0).powi(2) / 3.0).exp()
            })
            .collect()
    }

    fn unit(v: Vec<f64>) -> Vec<f64> {
        let mean = v.iter().sum::<f64>() / v.len() as f64;
        let centered: Vec<f64> = v.iter().map(|x| x - mean).collect();
        let norm = centered.iter().map(|x| x * x).sum::<f64>().sqrt();
        centered.iter().map(|x| x / norm).collect()
    }

    #[test]
    fn test_lagged_dot_overlap() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        assert_eq!(lagged_dot(&a, &b, 0), 32.0);
        // lag 1: a[0]*b[1] + a[1]*b[2]
        assert_eq!(lagged_dot(&a, &b, 1), 17.0);
        // lag -1: a[1]*b[0] + a[2]*b[1]
        assert_eq!(lagged_dot(&a, &b, -1), 23.0);
        assert_eq!(lagged_dot(&a, &b, 3), 0.0);
    }

    #[test]
    fn test_best_shift_integer() {
        let a = unit(pattern(0.0));
        let b = unit(pattern(3.0));
        let mut buffer = vec![0.0; 11];
        let peak = best_shift(&a, &b, 5, &mut buffer);
        assert!((peak.shift - 3.0).abs() < 0.1, "shift = {}", peak.shift);
        assert!(peak.corr > 0.9);

        let peak = best_shift(&b, &a, 5, &mut buffer);
        assert!((peak.shift + 3.0).abs() < 0.1, "shift = {}", peak.shift);
    }

    #[test]
    fn test_best_shift_subchannel() {
        let a = unit(pattern(0.0));
        let b = unit(pattern(1.4));
        let mut buffer = vec![0.0; 9];
        let peak = best_shift(&a, &b, 4, &mut buffer);
        assert!((peak.shift - 1.4).abs() < 0.25, "shift = {}", peak.shift);
    }

    #[test]
    fn test_identical_profiles_peak_at_zero() {
        let a = unit(pattern(0.0));
        let mut buffer = vec![0.0; 7];
        let peak = best_shift(&a, &a, 3, &mut buffer);
        assert_eq!(peak.shift, 0.0);
        assert!((peak.corr - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pairwise_layout_and_flat_rows() {
        let depths = SignalMatrix::uniform_depths(32, 10.0, 0.0);
        let mut rows = vec![pattern(0.0), pattern(2.0), vec![1.0; 32], pattern(0.0)];
        rows[1].iter_mut().for_each(|v| *v *= 3.0);
        let signal = SignalMatrix::from_rows(rows, depths, 100.0).unwrap();

        let bank = ProfileBank::new(&signal, &vec![1.0; 32], 0..4);
        assert!(bank.profile(2).is_none());

        let pairs = PairwiseDisplacement::compute(&bank, 2, 4, 10.0);
        assert_eq!(pairs.n_time(), 4);
        assert!((pairs.disp(0, 1) - 20.0).abs() < 2.0);
        assert!(pairs.corr(0, 1) > 0.9);
        // pair (1, 2) and (0, 2) involve the flat row
        assert_eq!(pairs.corr(1, 1), 0.0);
        assert_eq!(pairs.corr(0, 2), 0.0);
        assert!((pairs.disp(1, 2) + 20.0).abs() < 2.0);
        // past the end
        assert_eq!(pairs.corr(3, 1), 0.0);

        let near = pairs.near_neighbour_correlations(1);
        assert_eq!(near.len(), 3);
    }

    #[test]
    fn test_sub_range_rows() {
        let depths = SignalMatrix::uniform_depths(32, 10.0, 0.0);
        let rows = vec![pattern(0.0), pattern(1.0), pattern(2.0), pattern(3.0)];
        let signal = SignalMatrix::from_rows(rows, depths, 100.0).unwrap();

        let bank = ProfileBank::new(&signal, &vec![1.0; 32], 2..4);
        assert_eq!(bank.len(), 2);
        let pairs = PairwiseDisplacement::compute(&bank, 3, 4, 10.0);
        assert!((pairs.disp(0, 1) - 10.0).abs() < 2.0);
    }
}
