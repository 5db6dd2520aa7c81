//! Amplitude spectrum of a displacement trace.
//!
//! Fast probe motion in acute recordings is dominated by heartbeat
//! (around 1-2 Hz) and breathing (around 0.1-0.5 Hz). The dominant frequency of
//! an estimated trace is a quick check that the estimate follows them.

use rustfft::{num_complex::Complex, FftPlanner};
use std::cell::RefCell;
use std::f64::consts::PI;

thread_local! {
    static FFT_PLANNER: RefCell<FftPlanner<f64>> = RefCell::new(FftPlanner::new());
}

/// One-sided amplitude spectrum
#[derive(Debug, Clone, PartialEq)]
pub struct AmplitudeSpectrum {
    pub frequencies: Vec<f64>,
    pub amplitudes: Vec<f64>,
}

/// Hann-windowed amplitude spectrum of `signal` after removing its mean
///
/// The signal is zero-padded to the next power of two.
pub fn amplitude_spectrum(signal: &[f64], sampling_frequency: f64) -> AmplitudeSpectrum {
    if signal.len() < 2 {
        return AmplitudeSpectrum {
            frequencies: vec![],
            amplitudes: vec![],
        };
    }

    let n = signal.len().next_power_of_two();
    let mean = signal.iter().sum::<f64>() / signal.len() as f64;
    let last = (signal.len() - 1) as f64;

    let mut buffer: Vec<Complex<f64>> = signal
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            let window = 0.5 * (1.0 - (2.0 * PI * i as f64 / last).cos());
            Complex::new((x - mean) * window, 0.0)
        })
        .collect();
    buffer.resize(n, Complex::new(0.0, 0.0));

    FFT_PLANNER.with(|planner| {
        let fft = planner.borrow_mut().plan_fft_forward(n);
        fft.process(&mut buffer);
    });

    let half = n / 2 + 1;
    let scale = 2.0 / n as f64;
    AmplitudeSpectrum {
        frequencies: (0..half)
            .map(|k| k as f64 * sampling_frequency / n as f64)
            .collect(),
        amplitudes: buffer[..half].iter().map(|c| c.norm() * scale).collect(),
    }
}

/// Frequency (Hz) of the strongest spectral peak inside `[min_hz, max_hz]`
///
/// The peak location is refined with a parabola through the three bins around
/// it. Returns `None` for traces that are too short or carry no oscillation.
pub fn dominant_frequency(
    signal: &[f64],
    sampling_frequency: f64,
    min_hz: f64,
    max_hz: f64,
) -> Option<f64> {
    let spectrum = amplitude_spectrum(signal, sampling_frequency);
    let n_bins = spectrum.frequencies.len();
    if n_bins < 3 {
        return None;
    }

    let (peak, amplitude) = spectrum
        .frequencies
        .iter()
        .zip(&spectrum.amplitudes)
        .enumerate()
        .skip(1)
        .filter(|(_, (&f, _))| f >= min_hz && f <= max_hz)
        .map(|(k, (_, &a))| (k, a))
        .fold(None, |best: Option<(usize, f64)>, (k, a)| match best {
            Some((_, best_a)) if best_a >= a => best,
            _ => Some((k, a)),
        })?;

    if amplitude <= 1e-12 {
        return None;
    }

    let resolution = sampling_frequency / ((n_bins - 1) * 2) as f64;
    let mut frequency = spectrum.frequencies[peak];
    if peak + 1 < n_bins {
        let minus = spectrum.amplitudes[peak - 1];
        let plus = spectrum.amplitudes[peak + 1];
        let curvature = minus - 2.0 * amplitude + plus;
        if curvature < 0.0 {
            frequency += (0.5 * (minus - plus) / curvature).clamp(-0.5, 0.5) * resolution;
        }
    }
    Some(frequency)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn test_spectrum_bins() {
        let spectrum = amplitude_spectrum(&sine(5.0, 100.0, 100), 100.0);
        // padded to 128 samples: 65 one-sided bins
        assert_eq!(spectrum.frequencies.len(), 65);
        assert_eq!(spectrum.amplitudes.len(), 65);
        assert!((spectrum.frequencies[64] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_dominant_frequency_of_heartbeat_like_sine() {
        let signal = sine(1.2, 250.0, 5000);
        let f = dominant_frequency(&signal, 250.0, 0.05, 10.0).unwrap();
        assert!((f - 1.2).abs() < 0.05, "f = {}", f);
    }

    #[test]
    fn test_band_limits_select_peak() {
        let fs = 50.0;
        let breathing = sine(0.25, fs, 2000);
        let heartbeat = sine(1.5, fs, 2000);
        let mix: Vec<f64> = breathing
            .iter()
            .zip(&heartbeat)
            .map(|(b, h)| 3.0 * b + h)
            .collect();

        let slow = dominant_frequency(&mix, fs, 0.05, 0.8).unwrap();
        let fast = dominant_frequency(&mix, fs, 0.8, 5.0).unwrap();
        assert!((slow - 0.25).abs() < 0.05, "slow = {}", slow);
        assert!((fast - 1.5).abs() < 0.05, "fast = {}", fast);
    }

    #[test]
    fn test_flat_signal_has_no_peak() {
        assert_eq!(dominant_frequency(&[3.0; 64], 10.0, 0.0, 5.0), None);
        assert_eq!(dominant_frequency(&[1.0], 10.0, 0.0, 5.0), None);
    }
}
