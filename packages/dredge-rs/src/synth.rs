//! Synthetic drifting recordings.
//!
//! A fixed arrangement of Gaussian sources sits in tissue coordinates. Each
//! source is slowly amplitude modulated, and the whole arrangement is
//! translated along the probe by a prescribed drift, so channel `y` at time
//! `t` sees `f(y - drift(t), t)`. Sources extend past both ends of the probe
//! so that drifting content keeps entering the field of view.

use crate::error::{MotionError, Result};
use crate::types::SignalMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Average spacing between sources (µm)
const SOURCE_SPACING_UM: f64 = 60.0;

/// One additive term of the prescribed drift
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriftComponent {
    Sine {
        amplitude_um: f64,
        frequency_hz: f64,
        phase_rad: f64,
    },
    /// Constant offset switched on at `at_s`
    Step { at_s: f64, size_um: f64 },
}

impl DriftComponent {
    pub fn sine(amplitude_um: f64, frequency_hz: f64) -> Self {
        Self::Sine {
            amplitude_um,
            frequency_hz,
            phase_rad: 0.0,
        }
    }

    fn at(&self, t: f64) -> f64 {
        match *self {
            Self::Sine {
                amplitude_um,
                frequency_hz,
                phase_rad,
            } => amplitude_um * (2.0 * PI * frequency_hz * t + phase_rad).sin(),
            Self::Step { at_s, size_um } => {
                if t >= at_s {
                    size_um
                } else {
                    0.0
                }
            }
        }
    }

    fn bound(&self) -> f64 {
        match *self {
            Self::Sine { amplitude_um, .. } => amplitude_um.abs(),
            Self::Step { size_um, .. } => size_um.abs(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Source {
    center_um: f64,
    width_um: f64,
    amplitude: f64,
    mod_hz: f64,
    mod_phase: f64,
}

/// Parameters of a synthetic LFP-like recording on a uniform probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftingRecording {
    pub n_channels: usize,
    pub pitch_um: f64,
    pub sampling_frequency: f64,
    pub duration_s: f64,
    pub drift: Vec<DriftComponent>,
    /// Standard deviation of additive white noise
    pub noise_std: f64,
    pub seed: u64,
}

impl Default for DriftingRecording {
    fn default() -> Self {
        Self {
            n_channels: 64,
            pitch_um: 20.0,
            sampling_frequency: 250.0,
            duration_s: 10.0,
            drift: Vec::new(),
            noise_std: 0.0,
            seed: 0,
        }
    }
}

impl DriftingRecording {
    pub fn with_probe(mut self, n_channels: usize, pitch_um: f64) -> Self {
        self.n_channels = n_channels;
        self.pitch_um = pitch_um;
        self
    }

    pub fn with_sampling(mut self, sampling_frequency: f64, duration_s: f64) -> Self {
        self.sampling_frequency = sampling_frequency;
        self.duration_s = duration_s;
        self
    }

    pub fn with_drift(mut self, component: DriftComponent) -> Self {
        self.drift.push(component);
        self
    }

    pub fn with_noise(mut self, noise_std: f64) -> Self {
        self.noise_std = noise_std;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn n_time_bins(&self) -> usize {
        (self.duration_s * self.sampling_frequency).round().max(0.0) as usize
    }

    /// Prescribed drift (µm) at time `t`
    pub fn drift_at(&self, t: f64) -> f64 {
        self.drift.iter().map(|c| c.at(t)).sum()
    }

    /// Prescribed drift at every time bin
    pub fn true_drift(&self) -> Vec<f64> {
        (0..self.n_time_bins())
            .map(|t| self.drift_at(t as f64 / self.sampling_frequency))
            .collect()
    }

    fn check(&self) -> Result<()> {
        if self.n_channels == 0 {
            return Err(MotionError::InvalidParameter(
                "synthetic probe needs at least one channel".to_string(),
            ));
        }
        for (name, value) in [
            ("pitch_um", self.pitch_um),
            ("sampling_frequency", self.sampling_frequency),
            ("duration_s", self.duration_s),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(MotionError::InvalidParameter(format!(
                    "{} = {} must be positive and finite",
                    name, value
                )));
            }
        }
        if !self.noise_std.is_finite() || self.noise_std < 0.0 {
            return Err(MotionError::InvalidParameter(format!(
                "noise_std = {} must be non-negative",
                self.noise_std
            )));
        }
        Ok(())
    }

    fn sources(&self, rng: &mut StdRng) -> Vec<Source> {
        let span = (self.n_channels - 1) as f64 * self.pitch_um;
        let reach: f64 = self.drift.iter().map(DriftComponent::bound).sum::<f64>() + 150.0;
        let extent = span + 2.0 * reach;
        let n_sources = ((extent / SOURCE_SPACING_UM).ceil() as usize).max(4);

        (0..n_sources)
            .map(|k| {
                let slot = extent / n_sources as f64;
                let sign = if rng.random::<bool>() { 1.0 } else { -1.0 };
                Source {
                    center_um: -reach + (k as f64 + rng.random_range(0.1..0.9)) * slot,
                    width_um: rng.random_range(1.5..4.0) * self.pitch_um.max(10.0),
                    amplitude: sign * rng.random_range(0.5..1.5),
                    mod_hz: rng.random_range(0.02..0.1),
                    mod_phase: rng.random_range(0.0..2.0 * PI),
                }
            })
            .collect()
    }

    /// Render the recording
    pub fn generate(&self) -> Result<SignalMatrix> {
        self.check()?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let sources = self.sources(&mut rng);
        let depths = SignalMatrix::uniform_depths(self.n_channels, self.pitch_um, 0.0);
        let n_time = self.n_time_bins();

        let mut samples = Vec::with_capacity(n_time * self.n_channels);
        for t in 0..n_time {
            let time = t as f64 / self.sampling_frequency;
            let drift = self.drift_at(time);
            for &depth in &depths {
                let y = depth - drift;
                let value: f64 = sources
                    .iter()
                    .map(|s| {
                        let modulation = 1.0 + 0.2 * (2.0 * PI * s.mod_hz * time + s.mod_phase).sin();
                        let d = y - s.center_um;
                        s.amplitude * modulation * (-d * d / (2.0 * s.width_um * s.width_um)).exp()
                    })
                    .sum();
                samples.push(value);
            }
        }

        if self.noise_std > 0.0 {
            for v in samples.iter_mut() {
                *v += self.noise_std * gaussian(&mut rng);
            }
        }

        log::debug!(
            "Generated synthetic recording: {} bins × {} channels, {} sources",
            n_time,
            self.n_channels,
            sources.len()
        );

        SignalMatrix::new(n_time, self.n_channels, samples, depths, self.sampling_frequency)
    }
}

/// Standard normal draw (Box-Muller)
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}
