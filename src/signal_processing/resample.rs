//! FFT resampling
//!
//! The signal is treated as one period of a band-limited periodic signal:
//! its spectrum is truncated or zero-padded to the target length and
//! transformed back. The Nyquist bin of an even-length spectrum is split
//! (upsampling) or folded (downsampling) so the output stays real.

use super::with_planner;
use crate::error::{Result, SignalError};
use rustfft::num_complex::Complex;

/// Resample `signal` from `from_rate` to `to_rate` Hz.
///
/// The output length is `round(len * to_rate / from_rate)`.
pub fn resample(signal: &[f64], from_rate: f64, to_rate: f64) -> Result<Vec<f64>> {
    if !(from_rate > 0.0 && to_rate > 0.0 && from_rate.is_finite() && to_rate.is_finite()) {
        return Err(SignalError::InvalidParameter(format!(
            "cannot resample from {} Hz to {} Hz",
            from_rate, to_rate
        )));
    }
    if from_rate == to_rate {
        return Ok(signal.to_vec());
    }
    let target = (signal.len() as f64 * to_rate / from_rate).round() as usize;
    resample_to_len(signal, target)
}

/// Resample `signal` to exactly `num` samples
pub fn resample_to_len(signal: &[f64], num: usize) -> Result<Vec<f64>> {
    let nx = signal.len();
    if nx == 0 {
        return Err(SignalError::InvalidParameter(
            "cannot resample an empty signal".to_string(),
        ));
    }
    if num == 0 {
        return Err(SignalError::InvalidParameter(
            "target sample count must be positive".to_string(),
        ));
    }
    if num == nx {
        return Ok(signal.to_vec());
    }

    let mut spectrum: Vec<Complex<f64>> = signal.iter().map(|&x| Complex::new(x, 0.0)).collect();
    with_planner(|planner| planner.plan_fft_forward(nx).process(&mut spectrum));

    let n = num.min(nx);
    let nyq = n / 2 + 1;
    let mut resampled = vec![Complex::new(0.0, 0.0); num];

    resampled[..nyq].copy_from_slice(&spectrum[..nyq]);
    if n > 2 {
        let tail = n - nyq;
        resampled[num - tail..].copy_from_slice(&spectrum[nx - tail..]);
    }
    if n % 2 == 0 {
        if num < nx {
            // fold the negative Nyquist bin onto the positive one
            resampled[n / 2] += spectrum[nx - n / 2];
        } else {
            resampled[n / 2] *= 0.5;
            resampled[num - n / 2] = resampled[n / 2];
        }
    }

    with_planner(|planner| planner.plan_fft_inverse(num).process(&mut resampled));

    let scale = 1.0 / nx as f64;
    Ok(resampled.iter().map(|c| c.re * scale).collect())
}
