//! Spatial windows over the probe depth axis.
//!
//! Rigid estimation uses a single flat window over every channel. Non-rigid
//! estimation tiles the probe with overlapping windows, one per spatial bin;
//! each window weights the depth profile before correlation so that the
//! displacement it reports is local to its center.

use crate::config::MotionConfig;
use crate::error::{MotionError, Result};
use serde::{Deserialize, Serialize};

/// Weights below this value are set to zero
const ZERO_THRESHOLD: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowShape {
    #[default]
    Gaussian,
    Rect,
    Triangle,
}

impl WindowShape {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gaussian" => Some(Self::Gaussian),
            "rect" => Some(Self::Rect),
            "triangle" => Some(Self::Triangle),
            _ => None,
        }
    }

    /// Weight at distance `d` from the window center
    fn weight(&self, d: f64, scale: f64) -> f64 {
        match self {
            Self::Gaussian => (-d * d / (2.0 * scale * scale)).exp(),
            Self::Rect => {
                if d.abs() < scale {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Triangle => (1.0 - d.abs() / scale).max(0.0),
        }
    }
}

/// One spatial window: its center and a unit-sum weight per channel
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialWindow {
    pub center_um: f64,
    pub weights: Vec<f64>,
}

/// Build the spatial windows for a probe
pub fn spatial_windows(depths_um: &[f64], config: &MotionConfig) -> Result<Vec<SpatialWindow>> {
    let n = depths_um.len();
    if n == 0 {
        return Err(MotionError::MalformedInput("probe has no channels".to_string()));
    }

    if config.rigid {
        let center_um = depths_um.iter().sum::<f64>() / n as f64;
        return Ok(vec![SpatialWindow {
            center_um,
            weights: vec![1.0 / n as f64; n],
        }]);
    }

    let margin = config.win_margin_um.unwrap_or(-config.win_scale_um / 2.0);
    let lo = depths_um[0] - margin;
    let hi = depths_um[n - 1] + margin;

    let centers: Vec<f64> = if hi <= lo {
        vec![(depths_um[0] + depths_um[n - 1]) / 2.0]
    } else {
        let extent = hi - lo;
        let steps = (extent / config.bin_um).floor();
        if steps + 1.0 > n as f64 {
            return Err(MotionError::InvalidParameter(format!(
                "bin_um = {} over {:.1} µm gives {} spatial windows, more than the {} channels",
                config.bin_um,
                extent,
                steps + 1.0,
                n
            )));
        }
        let num_steps = steps as usize;
        let border = (extent - num_steps as f64 * config.bin_um) / 2.0;
        (0..=num_steps)
            .map(|k| lo + border + k as f64 * config.bin_um)
            .collect()
    };

    let mut windows = Vec::with_capacity(centers.len());
    for center_um in centers {
        let mut weights: Vec<f64> = depths_um
            .iter()
            .map(|&d| config.win_shape.weight(d - center_um, config.win_scale_um))
            .map(|w| if w < ZERO_THRESHOLD { 0.0 } else { w })
            .collect();

        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            log::warn!(
                "Spatial window at {:.1} µm covers no channel, dropping it",
                center_um
            );
            continue;
        }
        weights.iter_mut().for_each(|w| *w /= total);
        windows.push(SpatialWindow { center_um, weights });
    }

    if windows.is_empty() {
        return Err(MotionError::InvalidParameter(format!(
            "no spatial window overlaps the probe (win_scale_um = {}, bin_um = {})",
            config.win_scale_um, config.bin_um
        )));
    }

    log::debug!(
        "Built {} spatial window(s), centers: {:?}",
        windows.len(),
        windows.iter().map(|w| w.center_um).collect::<Vec<_>>()
    );

    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(n: usize) -> Vec<f64> {
        (0..n).map(|c| c as f64 * 20.0).collect()
    }

    #[test]
    fn test_rigid_single_flat_window() {
        let windows = spatial_windows(&probe(5), &MotionConfig::rigid(1.0)).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].center_um, 40.0);
        assert!(windows[0].weights.iter().all(|&w| (w - 0.2).abs() < 1e-12));
    }

    #[test]
    fn test_non_rigid_grid() {
        // 64 channels at 20 µm: 0..1260 µm, margin -150 → 150..1110, 960 µm extent
        let mut config = MotionConfig::non_rigid(1.0, 300.0);
        config.win_scale_um = 300.0;
        let windows = spatial_windows(&probe(64), &config).unwrap();

        let centers: Vec<f64> = windows.iter().map(|w| w.center_um).collect();
        assert_eq!(centers, vec![180.0, 480.0, 780.0, 1080.0]);
        for w in &windows {
            assert_eq!(w.weights.len(), 64);
            assert!((w.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_short_probe_gets_one_centered_window() {
        let mut config = MotionConfig::non_rigid(1.0, 100.0);
        config.win_scale_um = 500.0;
        let windows = spatial_windows(&probe(10), &config).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].center_um, 90.0);
    }

    #[test]
    fn test_rect_window_support() {
        let mut config = MotionConfig::non_rigid(1.0, 100.0);
        config.win_scale_um = 30.0;
        config.win_shape = WindowShape::Rect;
        config.win_margin_um = Some(0.0);
        let windows = spatial_windows(&probe(11), &config).unwrap();

        // Each rect window covers the channels strictly within 30 µm of its center
        let first = &windows[0];
        let nonzero = first.weights.iter().filter(|&&w| w > 0.0).count();
        assert!(nonzero >= 1 && nonzero <= 3);
    }

    #[test]
    fn test_triangle_weights_decay() {
        let mut config = MotionConfig::non_rigid(1.0, 1000.0);
        config.win_scale_um = 100.0;
        config.win_shape = WindowShape::Triangle;
        config.win_margin_um = Some(-100.0);
        let windows = spatial_windows(&probe(11), &config).unwrap();
        let w = &windows[0].weights;
        let peak = w
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert!(w[peak] > w[0]);
    }

    #[test]
    fn test_more_windows_than_channels_rejected() {
        let mut config = MotionConfig::non_rigid(0.5, 1e-9);
        config.win_scale_um = 100.0;
        assert!(config.validate().is_ok());
        assert!(matches!(
            spatial_windows(&probe(16), &config),
            Err(MotionError::InvalidParameter(_))
        ));

        let mut wide_margin = MotionConfig::non_rigid(0.5, 100.0);
        wide_margin.win_margin_um = Some(1e12);
        assert!(matches!(
            spatial_windows(&probe(16), &wide_margin),
            Err(MotionError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_one_window_per_channel_allowed() {
        // 16 channels at 20 µm with no margin: 300 µm extent, 16 centers
        let mut config = MotionConfig::non_rigid(0.5, 20.0);
        config.win_margin_um = Some(0.0);
        let windows = spatial_windows(&probe(16), &config).unwrap();
        assert_eq!(windows.len(), 16);
    }

    #[test]
    fn test_window_shape_from_str() {
        assert_eq!(WindowShape::from_str("Gaussian"), Some(WindowShape::Gaussian));
        assert_eq!(WindowShape::from_str("rect"), Some(WindowShape::Rect));
        assert_eq!(WindowShape::from_str("hann"), None);
    }
}
