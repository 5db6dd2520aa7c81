//! Estimator configuration.
//!
//! `rigid`, `window_s` and `bin_um` are the primary knobs; the remaining keys
//! tune the spatial windows, the correlation threshold and the regularized
//! solve. Every key has a default so partial JSON files are accepted.

use crate::error::{MotionError, Result};
use crate::windows::WindowShape;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters for motion estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Collapse to one displacement per time bin
    pub rigid: bool,
    /// Temporal window (seconds) within which time bins are correlated
    pub window_s: f64,
    /// Spatial bin size (µm): step between non-rigid windows
    pub bin_um: f64,
    /// Width of each non-rigid window (σ for Gaussian windows)
    pub win_scale_um: f64,
    pub win_shape: WindowShape,
    /// Distance the outermost window centers may sit outside the probe.
    /// Negative values keep windows inside. Defaults to `-win_scale_um / 2`.
    pub win_margin_um: Option<f64>,
    /// Largest displacement searched between two time bins
    pub max_disp_um: Option<f64>,
    /// Correlations below this value are ignored
    pub mincorr: f64,
    /// Replace `mincorr` by this percentile of near-neighbour correlations
    pub mincorr_percentile: Option<f64>,
    pub mincorr_percentile_nneighbs: usize,
    /// Weight pairs with a sigmoid around the threshold instead of a hard cut
    pub soft_weights: bool,
    /// Temporal smoothness strength
    pub lambda_t: f64,
    /// Smoothness strength between neighbouring spatial windows
    pub lambda_s: f64,
    /// Ridge term pinning the mean displacement
    pub eps: f64,
    /// Length of the chunks solved one after another, whole recording if unset
    pub chunk_len_s: Option<f64>,
    pub max_iterations: usize,
    /// Relative residual at which the solver stops
    pub tolerance: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            rigid: true,
            window_s: 1.0,
            bin_um: 800.0,
            win_scale_um: 850.0,
            win_shape: WindowShape::default(),
            win_margin_um: None,
            max_disp_um: None,
            mincorr: 0.8,
            mincorr_percentile: None,
            mincorr_percentile_nneighbs: 20,
            soft_weights: false,
            lambda_t: 1.0,
            lambda_s: 1.0,
            eps: 1e-3,
            chunk_len_s: Some(10.0),
            max_iterations: 2000,
            tolerance: 1e-6,
        }
    }
}

impl MotionConfig {
    /// Rigid configuration with the given correlation window
    pub fn rigid(window_s: f64) -> Self {
        Self {
            rigid: true,
            window_s,
            ..Self::default()
        }
    }

    /// Non-rigid configuration with the given correlation window and spatial bin size
    pub fn non_rigid(window_s: f64, bin_um: f64) -> Self {
        Self {
            rigid: false,
            window_s,
            bin_um,
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file; missing keys take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MotionError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value is in range
    pub fn validate(&self) -> Result<()> {
        positive("window_s", self.window_s)?;
        positive("bin_um", self.bin_um)?;
        positive("win_scale_um", self.win_scale_um)?;
        positive("lambda_t", self.lambda_t)?;
        positive("eps", self.eps)?;

        if let Some(margin) = self.win_margin_um {
            if !margin.is_finite() {
                return Err(invalid("win_margin_um", margin, "must be finite"));
            }
        }
        if let Some(max_disp) = self.max_disp_um {
            positive("max_disp_um", max_disp)?;
        }
        if let Some(chunk) = self.chunk_len_s {
            positive("chunk_len_s", chunk)?;
        }
        if !(-1.0..=1.0).contains(&self.mincorr) {
            return Err(invalid("mincorr", self.mincorr, "must lie in [-1, 1]"));
        }
        if let Some(pct) = self.mincorr_percentile {
            if !(0.0..=100.0).contains(&pct) {
                return Err(invalid("mincorr_percentile", pct, "must lie in [0, 100]"));
            }
        }
        if self.mincorr_percentile_nneighbs == 0 {
            return Err(MotionError::InvalidParameter(
                "mincorr_percentile_nneighbs must be at least 1".to_string(),
            ));
        }
        if !self.lambda_s.is_finite() || self.lambda_s < 0.0 {
            return Err(invalid("lambda_s", self.lambda_s, "must be finite and non-negative"));
        }
        if self.max_iterations == 0 {
            return Err(MotionError::InvalidParameter(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance > 0.0 && self.tolerance < 1.0) {
            return Err(invalid("tolerance", self.tolerance, "must lie in (0, 1)"));
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(name, value, "must be positive and finite"))
    }
}

fn invalid(name: &str, value: f64, why: &str) -> MotionError {
    MotionError::InvalidParameter(format!("{} = {} {}", name, value, why))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        assert!(MotionConfig::default().validate().is_ok());
        assert!(MotionConfig::non_rigid(0.5, 200.0).validate().is_ok());
    }

    #[test]
    fn test_smoothness_is_mandatory() {
        let config = MotionConfig {
            lambda_t: 0.0,
            ..MotionConfig::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("lambda_t"));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let bad = [
            MotionConfig {
                window_s: -1.0,
                ..MotionConfig::default()
            },
            MotionConfig {
                mincorr: 1.5,
                ..MotionConfig::default()
            },
            MotionConfig {
                mincorr_percentile: Some(120.0),
                ..MotionConfig::default()
            },
            MotionConfig {
                tolerance: 0.0,
                ..MotionConfig::default()
            },
            MotionConfig {
                chunk_len_s: Some(0.0),
                ..MotionConfig::default()
            },
            MotionConfig {
                max_iterations: 0,
                ..MotionConfig::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?} should be rejected", config);
        }
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"rigid": false, "bin_um": 200.0, "win_shape": "triangle"}}"#).unwrap();

        let config = MotionConfig::from_json_file(file.path()).unwrap();
        assert!(!config.rigid);
        assert_eq!(config.bin_um, 200.0);
        assert_eq!(config.win_shape, WindowShape::Triangle);
        assert_eq!(config.window_s, 1.0);
        assert_eq!(config.mincorr, 0.8);
    }

    #[test]
    fn test_json_file_validated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"lambda_t": -2.0}}"#).unwrap();
        assert!(matches!(
            MotionConfig::from_json_file(file.path()),
            Err(MotionError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_missing_json_file() {
        assert!(matches!(
            MotionConfig::from_json_file("/nonexistent/dredge.json"),
            Err(MotionError::FileNotFound(_))
        ));
    }
}
