//! FIR band-pass filtering
//!
//! Linear-phase windowed-sinc design with a Hamming window. Filter length and
//! transition bandwidths are picked automatically from the cut-offs:
//!
//! - low transition  = min(max(0.25 * low, 2 Hz), low)
//! - high transition = min(max(0.25 * high, 2 Hz), nyquist - high)
//! - length          = ceil(3.3 / min(transitions) * fs), forced odd
//!
//! The -6 dB points sit in the middle of each transition band. Filtering is
//! zero-phase: the symmetric kernel is applied centred on each sample, with
//! the signal extended by odd reflection at both edges.

use crate::error::{Result, SignalError};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Length factor of the Hamming window (main-lobe width in transition units)
const HAMMING_LENGTH_FACTOR: f64 = 3.3;

/// A designed band-pass kernel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandpassDesign {
    pub sample_rate: f64,
    pub low: f64,
    pub high: f64,
    pub low_transition: f64,
    pub high_transition: f64,
    pub taps: Vec<f64>,
}

impl BandpassDesign {
    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    /// Magnitude of the frequency response at `freq` Hz
    pub fn gain_at(&self, freq: f64) -> f64 {
        let center = (self.taps.len() as f64 - 1.0) / 2.0;
        let w = 2.0 * PI * freq / self.sample_rate;
        let (re, im) = self
            .taps
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(re, im), (n, &h)| {
                let phase = w * (n as f64 - center);
                (re + h * phase.cos(), im - h * phase.sin())
            });
        (re * re + im * im).sqrt()
    }
}

/// Design a band-pass kernel for `[low, high]` Hz
pub fn design_bandpass(sample_rate: f64, low: f64, high: f64) -> Result<BandpassDesign> {
    let nyquist = sample_rate / 2.0;
    if !(sample_rate > 0.0 && sample_rate.is_finite()) {
        return Err(SignalError::InvalidParameter(format!(
            "sampling rate must be positive, got {}",
            sample_rate
        )));
    }
    if !(low > 0.0 && low < high && high < nyquist) {
        return Err(SignalError::InvalidParameter(format!(
            "band-pass cut-offs must satisfy 0 < low < high < {} Hz, got [{}, {}]",
            nyquist, low, high
        )));
    }

    let low_transition = (0.25 * low).max(2.0).min(low);
    let high_transition = (0.25 * high).max(2.0).min(nyquist - high);
    let min_transition = low_transition.min(high_transition);

    let mut length = (HAMMING_LENGTH_FACTOR / min_transition * sample_rate).ceil() as usize;
    length = length.max(1);
    if length % 2 == 0 {
        length += 1;
    }

    // normalized edges in cycles/sample
    let f1 = (low - low_transition / 2.0) / sample_rate;
    let f2 = (high + high_transition / 2.0).min(nyquist) / sample_rate;

    let center = (length - 1) as f64 / 2.0;
    let mut taps: Vec<f64> = (0..length)
        .map(|n| {
            let m = n as f64 - center;
            let ideal = 2.0 * f2 * sinc(2.0 * f2 * m) - 2.0 * f1 * sinc(2.0 * f1 * m);
            ideal * hamming(n, length)
        })
        .collect();

    // unit gain at the passband centre
    let scale_freq = (f1 + f2) / 2.0;
    let gain: f64 = taps
        .iter()
        .enumerate()
        .map(|(n, &h)| h * (2.0 * PI * scale_freq * (n as f64 - center)).cos())
        .sum();
    if gain.abs() < f64::EPSILON {
        return Err(SignalError::Numerical(
            "band-pass kernel has zero passband gain".to_string(),
        ));
    }
    for h in &mut taps {
        *h /= gain;
    }

    log::debug!(
        "[FILTER] FIR band-pass {:.2}-{:.2} Hz @ {} Hz: {} taps, transitions {:.2}/{:.2} Hz",
        low,
        high,
        sample_rate,
        length,
        low_transition,
        high_transition
    );

    Ok(BandpassDesign {
        sample_rate,
        low,
        high,
        low_transition,
        high_transition,
        taps,
    })
}

/// Apply a symmetric kernel without phase shift; output length equals input
pub fn apply_zero_phase(signal: &[f64], taps: &[f64]) -> Vec<f64> {
    if signal.is_empty() || taps.is_empty() {
        return signal.to_vec();
    }
    if taps.len() > signal.len() {
        log::warn!(
            "[FILTER] Filter length {} exceeds signal length {}, edge effects dominate",
            taps.len(),
            signal.len()
        );
    }
    let half = ((taps.len() - 1) / 2) as isize;
    (0..signal.len() as isize)
        .map(|i| {
            taps.iter()
                .enumerate()
                .map(|(k, &h)| h * extended_sample(signal, i + half - k as isize))
                .sum::<f64>()
        })
        .collect()
}

/// Sample `j` of the signal extended by odd reflection about its end points,
/// zero beyond one reflection
fn extended_sample(signal: &[f64], j: isize) -> f64 {
    let n = signal.len() as isize;
    if j < 0 {
        let r = -j;
        if r < n {
            2.0 * signal[0] - signal[r as usize]
        } else {
            0.0
        }
    } else if j >= n {
        let r = 2 * (n - 1) - j;
        if r >= 0 {
            2.0 * signal[(n - 1) as usize] - signal[r as usize]
        } else {
            0.0
        }
    } else {
        signal[j as usize]
    }
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

fn hamming(n: usize, length: usize) -> f64 {
    if length == 1 {
        return 1.0;
    }
    0.54 - 0.46 * (2.0 * PI * n as f64 / (length - 1) as f64).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sample_rate: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate).sin())
            .collect()
    }

    fn peak(values: &[f64]) -> f64 {
        values.iter().fold(0.0f64, |m, v| m.max(v.abs()))
    }

    #[test]
    fn test_auto_length_and_transitions() {
        let design = design_bandpass(128.0, 0.5, 30.0).unwrap();
        assert_eq!(design.low_transition, 0.5);
        assert_eq!(design.high_transition, 7.5);
        assert_eq!(design.len(), 845);
        assert_eq!(design.len() % 2, 1);
    }

    #[test]
    fn test_kernel_is_symmetric() {
        let design = design_bandpass(256.0, 1.0, 40.0).unwrap();
        let taps = &design.taps;
        for i in 0..taps.len() / 2 {
            assert!((taps[i] - taps[taps.len() - 1 - i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_frequency_response() {
        let design = design_bandpass(256.0, 1.0, 40.0).unwrap();
        assert!((design.gain_at(10.0) - 1.0).abs() < 0.01);
        assert!(design.gain_at(0.0) < 0.02);
        assert!(design.gain_at(100.0) < 0.01);
    }

    #[test]
    fn test_passband_preserved_stopband_removed() {
        let fs = 256.0;
        let design = design_bandpass(fs, 1.0, 40.0).unwrap();
        let n = 4096;
        let middle = 1024..3072;

        let pass = apply_zero_phase(&sine(10.0, fs, n), &design.taps);
        assert_eq!(pass.len(), n);
        assert!((peak(&pass[middle.clone()]) - 1.0).abs() < 0.02);

        let stop = apply_zero_phase(&sine(100.0, fs, n), &design.taps);
        assert!(peak(&stop[middle]) < 0.05);
    }

    #[test]
    fn test_zero_phase_no_shift() {
        let fs = 256.0;
        let design = design_bandpass(fs, 1.0, 40.0).unwrap();
        let input = sine(10.0, fs, 4096);
        let output = apply_zero_phase(&input, &design.taps);
        for i in 1500..1600 {
            assert!((input[i] - output[i]).abs() < 0.02);
        }
    }

    #[test]
    fn test_invalid_band() {
        assert!(design_bandpass(128.0, 0.0, 30.0).is_err());
        assert!(design_bandpass(128.0, 30.0, 10.0).is_err());
        assert!(design_bandpass(128.0, 1.0, 64.0).is_err());
        assert!(design_bandpass(0.0, 1.0, 10.0).is_err());
    }

    #[test]
    fn test_empty_signal() {
        let design = design_bandpass(128.0, 1.0, 30.0).unwrap();
        assert!(apply_zero_phase(&[], &design.taps).is_empty());
    }

    #[test]
    fn test_kernel_longer_than_signal() {
        let _ = env_logger::builder().is_test(true).try_init();
        let design = design_bandpass(128.0, 0.5, 30.0).unwrap();
        let signal = vec![2.0; 100];
        let filtered = apply_zero_phase(&signal, &design.taps);
        assert_eq!(filtered.len(), 100);
        assert!(filtered.iter().all(|v| v.is_finite()));
    }
}
