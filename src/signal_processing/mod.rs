//! Native numerics for the conditioning pipeline
//!
//! - `filters`: windowed-sinc FIR band-pass design and zero-phase application
//! - `resample`: FFT resampling to a target sample count or rate
//! - `spectrum`: Welch power spectral density
//! - `xcorr`: full cross-correlation

pub mod filters;
pub mod resample;
pub mod spectrum;
pub mod xcorr;

pub use filters::{apply_zero_phase, design_bandpass, BandpassDesign};
pub use resample::{resample, resample_to_len};
pub use spectrum::{welch, PowerSpectrum, WelchParams};
pub use xcorr::{correlate_full, find_peak, index_to_lag};

use rustfft::FftPlanner;
use std::cell::RefCell;

// Thread-local FFT planner, plans are cached per thread
thread_local! {
    static FFT_PLANNER: RefCell<FftPlanner<f64>> = RefCell::new(FftPlanner::new());
}

pub(crate) fn with_planner<R>(f: impl FnOnce(&mut FftPlanner<f64>) -> R) -> R {
    FFT_PLANNER.with(|planner| f(&mut planner.borrow_mut()))
}
