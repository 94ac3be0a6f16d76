//! Numerical capability used by the pipeline and the correlator
//!
//! Channel selection, alignment rules and threshold policy live in the
//! callers; everything that touches samples numerically goes through a
//! [`SignalBackend`]. [`NativeBackend`] is the default implementation built
//! on this crate's FIR, FFT and linfa FastICA code.

use linfa::prelude::*;
use linfa_ica::fast_ica::{FastIca, GFunc};
use ndarray::{Array2, ArrayView2};

use crate::error::{Result, SignalError};
use crate::ica::{GFunction, ICAParameters};
use crate::signal_processing::{self, PowerSpectrum, WelchParams};

pub trait SignalBackend {
    /// Zero-phase band-pass filter `signal` to `[low, high]` Hz
    fn filter(&self, signal: &[f64], sample_rate: f64, low: f64, high: f64) -> Result<Vec<f64>>;

    /// Unmix centered `data` (samples x channels) into independent sources
    /// (samples x components)
    fn decompose(&self, data: ArrayView2<'_, f64>, params: &ICAParameters) -> Result<Array2<f64>>;

    /// Full cross-correlation, N + M - 1 values
    fn correlate(&self, a: &[f64], b: &[f64]) -> Result<Vec<f64>>;

    fn resample(&self, signal: &[f64], from_rate: f64, to_rate: f64) -> Result<Vec<f64>> {
        signal_processing::resample(signal, from_rate, to_rate)
    }

    fn psd(&self, signal: &[f64], sample_rate: f64) -> Result<PowerSpectrum> {
        signal_processing::welch(signal, sample_rate, &WelchParams::default())
    }
}

/// FIR filtering, FastICA via linfa, direct cross-correlation
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl SignalBackend for NativeBackend {
    fn filter(&self, signal: &[f64], sample_rate: f64, low: f64, high: f64) -> Result<Vec<f64>> {
        let design = signal_processing::design_bandpass(sample_rate, low, high)?;
        Ok(signal_processing::apply_zero_phase(signal, &design.taps))
    }

    fn decompose(&self, data: ArrayView2<'_, f64>, params: &ICAParameters) -> Result<Array2<f64>> {
        let n_components = params.n_components.unwrap_or(data.ncols());
        let gfunc = match params.g_function {
            GFunction::Logcosh => GFunc::Logcosh(1.0),
            GFunction::Exp => GFunc::Exp,
            GFunction::Cube => GFunc::Cube,
        };

        let mut ica = FastIca::<f64>::params()
            .ncomponents(n_components)
            .gfunc(gfunc)
            .max_iter(params.max_iterations)
            .tol(params.tolerance);
        if let Some(seed) = params.random_seed {
            ica = ica.random_state(seed as usize);
        }

        let matrix = data.to_owned();
        let dataset = DatasetBase::from(matrix.clone());
        let fitted = ica
            .fit(&dataset)
            .map_err(|e| SignalError::Numerical(format!("FastICA failed: {:?}", e)))?;
        Ok(fitted.predict(&matrix))
    }

    fn correlate(&self, a: &[f64], b: &[f64]) -> Result<Vec<f64>> {
        if a.is_empty() || b.is_empty() {
            return Err(SignalError::InvalidParameter(
                "cannot correlate an empty signal".to_string(),
            ));
        }
        Ok(signal_processing::correlate_full(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_native_filter_keeps_length() {
        let signal: Vec<f64> = (0..1024)
            .map(|i| (2.0 * PI * 10.0 * i as f64 / 128.0).sin())
            .collect();
        let filtered = NativeBackend.filter(&signal, 128.0, 1.0, 30.0).unwrap();
        assert_eq!(filtered.len(), signal.len());
        assert!(NativeBackend.filter(&signal, 128.0, 30.0, 1.0).is_err());
    }

    #[test]
    fn test_native_correlate() {
        let z = NativeBackend.correlate(&[1.0, 2.0], &[1.0]).unwrap();
        assert_eq!(z, vec![1.0, 2.0]);
        assert!(NativeBackend.correlate(&[], &[1.0]).is_err());
    }

    #[test]
    fn test_native_decompose_shape() {
        let data = Array2::from_shape_fn((512, 3), |(t, c)| {
            let t = t as f64 / 128.0;
            (2.0 * PI * (3.0 + c as f64 * 2.0) * t).sin() + 0.3 * (2.0 * PI * 11.0 * t).cos()
        });
        let params = ICAParameters {
            n_components: Some(2),
            ..Default::default()
        };
        let sources = NativeBackend.decompose(data.view(), &params).unwrap();
        assert_eq!(sources.dim(), (512, 2));
        assert!(sources.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_default_psd_and_resample() {
        let signal = vec![1.0; 256];
        let resampled = NativeBackend.resample(&signal, 128.0, 64.0).unwrap();
        assert_eq!(resampled.len(), 128);
        let spectrum = NativeBackend.psd(&signal, 128.0).unwrap();
        // constant input has no power after detrending
        assert!(spectrum.power.iter().all(|p| p.abs() < 1e-12));
    }
}
