//! Welch power spectral density
//!
//! Segments of `n_per_seg` samples (stepping by `n_per_seg - n_overlap`) are
//! mean-detrended, Hamming-windowed and transformed with an `n_fft`-point FFT;
//! the one-sided periodograms are averaged. Power is a density (unit²/Hz).

use super::with_planner;
use crate::error::{Result, SignalError};
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Power spectrum of a single channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSpectrum {
    pub frequencies: Vec<f64>,
    pub power: Vec<f64>,
}

impl PowerSpectrum {
    /// Keep the bins inside `[fmin, fmax]`
    pub fn restrict(self, fmin: f64, fmax: f64) -> Self {
        let (frequencies, power): (Vec<f64>, Vec<f64>) = self
            .frequencies
            .into_iter()
            .zip(self.power)
            .filter(|(f, _)| *f >= fmin && *f <= fmax)
            .unzip();
        Self { frequencies, power }
    }

    /// Frequency with the highest power
    pub fn peak_frequency(&self) -> Option<f64> {
        self.power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| self.frequencies[i])
    }

    /// Rectangle-rule integral of the density
    pub fn total_power(&self) -> f64 {
        if self.frequencies.len() < 2 {
            return self.power.iter().sum();
        }
        let df = self.frequencies[1] - self.frequencies[0];
        self.power.iter().sum::<f64>() * df
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelchParams {
    #[serde(default = "default_n_fft")]
    pub n_fft: usize,
    /// Segment length, `n_fft` when absent
    #[serde(default)]
    pub n_per_seg: Option<usize>,
    #[serde(default)]
    pub n_overlap: usize,
}

fn default_n_fft() -> usize {
    256
}

impl Default for WelchParams {
    fn default() -> Self {
        Self {
            n_fft: default_n_fft(),
            n_per_seg: None,
            n_overlap: 0,
        }
    }
}

/// Welch PSD of `signal` sampled at `sample_rate` Hz.
///
/// Signals shorter than the segment length use a single segment spanning the
/// whole signal.
pub fn welch(signal: &[f64], sample_rate: f64, params: &WelchParams) -> Result<PowerSpectrum> {
    if signal.is_empty() {
        return Err(SignalError::InvalidParameter(
            "cannot estimate the spectrum of an empty signal".to_string(),
        ));
    }
    if !(sample_rate > 0.0) {
        return Err(SignalError::InvalidParameter(format!(
            "sampling rate must be positive, got {}",
            sample_rate
        )));
    }

    let n_fft = params.n_fft.min(signal.len()).max(1);
    let n_per_seg = params.n_per_seg.unwrap_or(n_fft).min(n_fft);
    if params.n_overlap >= n_per_seg {
        return Err(SignalError::InvalidParameter(format!(
            "overlap {} must be smaller than the segment length {}",
            params.n_overlap, n_per_seg
        )));
    }
    let step = n_per_seg - params.n_overlap;
    let n_segments = (signal.len() - n_per_seg) / step + 1;

    let window: Vec<f64> = (0..n_per_seg).map(|i| hamming(i, n_per_seg)).collect();
    let window_power: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (sample_rate * window_power);

    let n_positive = n_fft / 2 + 1;
    let mut power = vec![0.0; n_positive];
    let fft = with_planner(|planner| planner.plan_fft_forward(n_fft));
    let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];

    for segment in 0..n_segments {
        let start = segment * step;
        let samples = &signal[start..start + n_per_seg];
        let mean = samples.iter().sum::<f64>() / n_per_seg as f64;

        buffer.fill(Complex::new(0.0, 0.0));
        for ((slot, &x), &w) in buffer.iter_mut().zip(samples).zip(&window) {
            *slot = Complex::new((x - mean) * w, 0.0);
        }
        fft.process(&mut buffer);

        for (p, c) in power.iter_mut().zip(&buffer[..n_positive]) {
            *p += c.norm_sqr() * scale;
        }
    }

    let last = n_positive - 1;
    for (k, p) in power.iter_mut().enumerate() {
        *p /= n_segments as f64;
        // one-sided: double everything except DC and an even-length Nyquist bin
        if k != 0 && !(n_fft % 2 == 0 && k == last) {
            *p *= 2.0;
        }
    }

    let resolution = sample_rate / n_fft as f64;
    let frequencies = (0..n_positive).map(|k| k as f64 * resolution).collect();
    Ok(PowerSpectrum { frequencies, power })
}

fn hamming(n: usize, length: usize) -> f64 {
    if length == 1 {
        return 1.0;
    }
    // periodic window, as used for spectral estimation
    0.54 - 0.46 * (2.0 * PI * n as f64 / length as f64).cos()
}
