use chrono::{DateTime, Utc};
use nalgebra::DMatrix;
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::SignalBackend;
use crate::channel_set::ChannelSet;
use crate::config::ProcessingConfig;
use crate::error::{Result, SignalError};

use super::quality_metrics::QualityMetrics;

/// Non-linearity of the FastICA fixed-point iteration
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GFunction {
    #[default]
    Logcosh,
    Exp,
    Cube,
}

/// Parameters for ICA fitting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ICAParameters {
    /// Number of components, all usable channels when `None`
    pub n_components: Option<usize>,
    pub g_function: GFunction,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub random_seed: Option<u64>,
}

impl Default for ICAParameters {
    fn default() -> Self {
        Self {
            n_components: None,
            g_function: GFunction::default(),
            max_iterations: 200,
            tolerance: 1e-4,
            random_seed: Some(42),
        }
    }
}

impl ICAParameters {
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            max_iterations: config.ica_max_iterations,
            tolerance: config.ica_tolerance,
            ..Default::default()
        }
    }
}

/// Amplitude screening applied before fitting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionCriteria {
    /// Peak-to-peak limit per channel and segment
    pub peak_to_peak: f64,
    /// Segment length in seconds
    pub window_secs: f64,
}

impl RejectionCriteria {
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            peak_to_peak: config.ica_reject_threshold,
            window_secs: config.ica_reject_window_secs,
        }
    }
}

/// A single independent component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ICAComponent {
    /// Position in the decomposition (0..n_components)
    pub index: usize,
    /// Mixing-matrix column, one weight per fitted channel
    pub spatial_map: Vec<f64>,
    /// Source time course over the full recording
    pub sources: Vec<f64>,
    pub kurtosis: f64,
    /// Share of back-projected variance (percent)
    pub variance_explained: f64,
}

/// Result of fitting ICA on one recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDecomposition {
    pub id: Uuid,
    /// Recording the decomposition was fitted on
    pub recording: String,
    pub fitted_at: DateTime<Utc>,
    /// Fitted EEG channels, order of the mixing-matrix rows
    pub channel_names: Vec<String>,
    pub sample_rate: f64,
    pub n_samples: usize,
    pub components: Vec<ICAComponent>,
    /// channels x components
    pub mixing: Array2<f64>,
    /// components x channels
    pub unmixing: Array2<f64>,
    pub channel_means: Array1<f64>,
    /// Segments left out of fitting by amplitude screening
    pub rejected_segments: usize,
}

impl ComponentDecomposition {
    /// Assemble a decomposition from a mixing matrix.
    ///
    /// `data` is samples x channels in `channel_names` order; sources are
    /// `(data - channel_means) · unmixingᵀ` with the unmixing matrix taken as
    /// the pseudo-inverse of `mixing`.
    pub fn from_parts(
        recording: impl Into<String>,
        channel_names: Vec<String>,
        sample_rate: f64,
        mixing: Array2<f64>,
        channel_means: Array1<f64>,
        data: ArrayView2<'_, f64>,
    ) -> Result<Self> {
        let (n_channels, n_components) = mixing.dim();
        if channel_names.len() != n_channels
            || channel_means.len() != n_channels
            || data.ncols() != n_channels
        {
            return Err(SignalError::ShapeMismatch(format!(
                "mixing has {} rows, got {} names, {} means and {} data columns",
                n_channels,
                channel_names.len(),
                channel_means.len(),
                data.ncols()
            )));
        }
        if n_components == 0 || n_components > n_channels {
            return Err(SignalError::InvalidParameter(format!(
                "{} components for {} channels",
                n_components, n_channels
            )));
        }

        let unmixing = pseudo_inverse(&mixing)?;
        let sources = (&data - &channel_means).dot(&unmixing.t());

        let contributions: Vec<f64> = (0..n_components)
            .map(|i| {
                let norm: f64 = mixing.column(i).iter().map(|a| a * a).sum();
                QualityMetrics::variance(&sources.column(i).to_vec()) * norm
            })
            .collect();
        let total: f64 = contributions.iter().sum();

        let components = (0..n_components)
            .map(|i| {
                let time_course = sources.column(i).to_vec();
                ICAComponent {
                    index: i,
                    spatial_map: mixing.column(i).to_vec(),
                    kurtosis: QualityMetrics::kurtosis(&time_course),
                    variance_explained: if total > 0.0 {
                        contributions[i] / total * 100.0
                    } else {
                        0.0
                    },
                    sources: time_course,
                }
            })
            .collect();

        Ok(Self {
            id: Uuid::new_v4(),
            recording: recording.into(),
            fitted_at: Utc::now(),
            channel_names,
            sample_rate,
            n_samples: data.nrows(),
            components,
            mixing,
            unmixing,
            channel_means,
            rejected_segments: 0,
        })
    }

    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    pub fn component(&self, index: usize) -> Option<&ICAComponent> {
        self.components.get(index)
    }

    /// Position of a fitted channel in the mixing-matrix rows
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channel_names.iter().position(|c| c == name)
    }

    /// Sources of the fitted channels of `set` (samples x components)
    pub fn sources_from(&self, set: &ChannelSet) -> Result<Array2<f64>> {
        let data = self.fitted_data(set)?;
        Ok((&data - &self.channel_means).dot(&self.unmixing.t()))
    }

    /// Fitted channels of `set` as samples x channels
    fn fitted_data(&self, set: &ChannelSet) -> Result<Array2<f64>> {
        let picked = set.pick_channels(&self.channel_names)?;
        Ok(picked.to_array().reversed_axes())
    }
}

/// ICA fitting on channel sets, numerics delegated to a [`SignalBackend`]
pub struct ICAProcessor;

impl ICAProcessor {
    /// Fit ICA on the good EEG channels of `set`.
    ///
    /// Segments whose peak-to-peak amplitude exceeds the rejection limit on
    /// any channel are left out of fitting; sources still cover the whole
    /// recording.
    pub fn fit<B: SignalBackend + ?Sized>(
        backend: &B,
        set: &ChannelSet,
        params: &ICAParameters,
        rejection: &RejectionCriteria,
    ) -> Result<ComponentDecomposition> {
        log::info!("[ICA] Starting ICA fit on '{}'", set.description);

        let eeg = set.pick_eeg();
        if eeg.channels.is_empty() {
            return Err(SignalError::EmptySelection(format!(
                "no good EEG channels in '{}'",
                set.description
            )));
        }
        let n_channels = eeg.n_channels();
        let n_samples = eeg.n_times();
        if n_samples < 2 {
            return Err(SignalError::EmptySelection(format!(
                "'{}' has {} samples",
                set.description, n_samples
            )));
        }

        let n_components = params.n_components.unwrap_or(n_channels);
        if n_components == 0 || n_components > n_channels {
            return Err(SignalError::InvalidParameter(format!(
                "Number of components ({}) must be between 1 and the number of channels ({})",
                n_components, n_channels
            )));
        }

        log::info!(
            "[ICA] Data dimensions: {} channels x {} samples (sample_rate={})",
            n_channels,
            n_samples,
            eeg.sample_rate
        );
        let data = eeg.to_array().reversed_axes();

        let (kept, rejected_segments) = Self::screen_segments(&data, eeg.sample_rate, rejection);
        if kept.is_empty() {
            return Err(SignalError::Numerical(format!(
                "all {} segments exceed the peak-to-peak limit of {}",
                rejected_segments, rejection.peak_to_peak
            )));
        }
        if rejected_segments > 0 {
            log::info!(
                "[ICA] Rejected {} segments above {} peak-to-peak, fitting on {} samples",
                rejected_segments,
                rejection.peak_to_peak,
                kept.len()
            );
        }

        let fit_data = data.select(Axis(0), &kept);
        let means = fit_data
            .mean_axis(Axis(0))
            .ok_or_else(|| SignalError::Numerical("no samples left to fit".to_string()))?;
        let centered = &fit_data - &means;

        let fit_params = ICAParameters {
            n_components: Some(n_components),
            ..params.clone()
        };
        log::info!(
            "[ICA] Decomposing: n_components={}, max_iter={}, tol={}",
            n_components,
            params.max_iterations,
            params.tolerance
        );
        let fit_start = std::time::Instant::now();
        let sources = backend.decompose(centered.view(), &fit_params)?;
        log::info!(
            "[ICA] Decomposition completed in {:.2}s",
            fit_start.elapsed().as_secs_f64()
        );
        if sources.dim() != (kept.len(), n_components) {
            return Err(SignalError::ShapeMismatch(format!(
                "backend returned {:?} sources, expected ({}, {})",
                sources.dim(),
                kept.len(),
                n_components
            )));
        }

        let mixing = Self::compute_mixing(&centered, &sources)?;
        let channel_names = eeg.channels.iter().map(|c| c.name.clone()).collect();
        let mut decomposition = ComponentDecomposition::from_parts(
            set.description.clone(),
            channel_names,
            eeg.sample_rate,
            mixing,
            means,
            data.view(),
        )?;
        decomposition.rejected_segments = rejected_segments;

        log::info!(
            "[ICA] Fit complete: {} components, id {}",
            decomposition.n_components(),
            decomposition.id
        );
        Ok(decomposition)
    }

    /// Indices of rows in accepted segments, plus the rejected segment count
    fn screen_segments(
        data: &Array2<f64>,
        sample_rate: f64,
        rejection: &RejectionCriteria,
    ) -> (Vec<usize>, usize) {
        let n_samples = data.nrows();
        let window = ((rejection.window_secs * sample_rate).round() as usize).max(1);
        let mut kept = Vec::with_capacity(n_samples);
        let mut rejected = 0;

        for start in (0..n_samples).step_by(window) {
            let stop = (start + window).min(n_samples);
            let segment = data.slice(s![start..stop, ..]);
            let too_large = segment.columns().into_iter().any(|column| {
                let (lo, hi) = column
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                        (lo.min(x), hi.max(x))
                    });
                hi - lo > rejection.peak_to_peak
            });
            if too_large {
                rejected += 1;
            } else {
                kept.extend(start..stop);
            }
        }
        (kept, rejected)
    }

    /// Mixing matrix from centered data X and sources S:
    /// A = Xᵀ S (Sᵀ S)⁻¹ (channels x components)
    fn compute_mixing(data: &Array2<f64>, sources: &Array2<f64>) -> Result<Array2<f64>> {
        let sts = sources.t().dot(sources);
        let sts_inv = invert_matrix(&sts)?;
        Ok(data.t().dot(sources).dot(&sts_inv))
    }

    /// Remove components from the fitted channels of `set`.
    ///
    /// Each listed component's back-projection `s_i a_iᵀ` is subtracted;
    /// channels outside the decomposition pass through unchanged.
    pub fn reconstruct_without_components(
        decomposition: &ComponentDecomposition,
        set: &ChannelSet,
        components_to_remove: &[usize],
    ) -> Result<ChannelSet> {
        if let Some(&bad) = components_to_remove
            .iter()
            .find(|&&i| i >= decomposition.n_components())
        {
            return Err(SignalError::InvalidParameter(format!(
                "component {} out of range (decomposition has {})",
                bad,
                decomposition.n_components()
            )));
        }

        let mut cleaned = decomposition.fitted_data(set)?;
        if !components_to_remove.is_empty() {
            let sources = decomposition.sources_from(set)?;
            let removed: Vec<usize> = components_to_remove.to_vec();
            let artifact = sources
                .select(Axis(1), &removed)
                .dot(&decomposition.mixing.select(Axis(1), &removed).t());
            cleaned -= &artifact;
        }

        let mut result = set.clone();
        for channel in &mut result.channels {
            if let Some(j) = decomposition.channel_index(&channel.name) {
                channel.samples = cleaned.column(j).to_vec();
            }
        }
        log::info!(
            "[ICA] Removed components {:?} from '{}'",
            components_to_remove,
            set.description
        );
        Ok(result)
    }
}

fn to_dmatrix(matrix: &Array2<f64>) -> DMatrix<f64> {
    let (rows, cols) = matrix.dim();
    DMatrix::from_fn(rows, cols, |i, j| matrix[[i, j]])
}

fn from_dmatrix(matrix: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((matrix.nrows(), matrix.ncols()), |(i, j)| matrix[(i, j)])
}

fn invert_matrix(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    if matrix.nrows() != matrix.ncols() {
        return Err(SignalError::ShapeMismatch(format!(
            "cannot invert a {:?} matrix",
            matrix.dim()
        )));
    }
    to_dmatrix(matrix)
        .try_inverse()
        .map(|inv| from_dmatrix(&inv))
        .ok_or_else(|| SignalError::Numerical("Matrix is singular or nearly singular".to_string()))
}

/// W = (AᵀA)⁻¹Aᵀ
fn pseudo_inverse(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    let ata = matrix.t().dot(matrix);
    Ok(invert_matrix(&ata)?.dot(&matrix.t()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NativeBackend;
    use crate::channel_set::Channel;
    use crate::table::ChannelKind;
    use std::cell::Cell;
    use std::f64::consts::PI;

    /// Returns the centered data as its own sources
    struct IdentityBackend {
        fitted_rows: Cell<usize>,
    }

    impl IdentityBackend {
        fn new() -> Self {
            Self {
                fitted_rows: Cell::new(0),
            }
        }
    }

    impl SignalBackend for IdentityBackend {
        fn filter(&self, signal: &[f64], _: f64, _: f64, _: f64) -> Result<Vec<f64>> {
            Ok(signal.to_vec())
        }

        fn decompose(&self, data: ArrayView2<'_, f64>, params: &ICAParameters) -> Result<Array2<f64>> {
            self.fitted_rows.set(data.nrows());
            let n = params.n_components.unwrap_or(data.ncols());
            Ok(data.slice(s![.., ..n]).to_owned())
        }

        fn correlate(&self, a: &[f64], b: &[f64]) -> Result<Vec<f64>> {
            Ok(crate::signal_processing::correlate_full(a, b))
        }
    }

    fn mixed_set(n_channels: usize, n_samples: usize, sample_rate: f64) -> ChannelSet {
        let channels = (0..n_channels)
            .map(|i| {
                let samples = (0..n_samples)
                    .map(|t| {
                        let t = t as f64 / sample_rate;
                        let freq1 = 5.0 + i as f64;
                        let freq2 = 10.0 + i as f64 * 0.5;
                        (2.0 * PI * freq1 * t).sin() + 0.5 * (2.0 * PI * freq2 * t).cos()
                    })
                    .collect();
                Channel::new(format!("Ch{}", i + 1), ChannelKind::Eeg, samples)
            })
            .collect();
        ChannelSet::new("test.csv", sample_rate, channels).unwrap()
    }

    fn criteria() -> RejectionCriteria {
        RejectionCriteria {
            peak_to_peak: 300.0,
            window_secs: 2.0,
        }
    }

    #[test]
    fn test_identity_decomposition() {
        let backend = IdentityBackend::new();
        let set = mixed_set(3, 512, 128.0);
        let result = ICAProcessor::fit(&backend, &set, &ICAParameters::default(), &criteria()).unwrap();

        assert_eq!(result.n_components(), 3);
        assert_eq!(result.channel_names, vec!["Ch1", "Ch2", "Ch3"]);
        assert_eq!(result.rejected_segments, 0);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((result.mixing[[i, j]] - expected).abs() < 1e-9);
            }
        }
        let total: f64 = result.components.iter().map(|c| c.variance_explained).sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_ica_fastica_native() {
        let set = mixed_set(4, 1024, 256.0);
        let params = ICAParameters {
            n_components: Some(4),
            ..Default::default()
        };
        let result = ICAProcessor::fit(&NativeBackend, &set, &params, &criteria()).unwrap();

        assert_eq!(result.components.len(), 4);
        assert_eq!(result.mixing.dim(), (4, 4));
        assert_eq!(result.unmixing.dim(), (4, 4));
        for comp in &result.components {
            assert!(comp.kurtosis.is_finite());
            assert_eq!(comp.sources.len(), 1024);
            assert_eq!(comp.spatial_map.len(), 4);
        }
    }

    #[test]
    fn test_ica_fewer_components() {
        let set = mixed_set(6, 1024, 256.0);
        let params = ICAParameters {
            n_components: Some(3),
            ..Default::default()
        };
        let result = ICAProcessor::fit(&NativeBackend, &set, &params, &criteria()).unwrap();
        assert_eq!(result.components.len(), 3);
        assert_eq!(result.mixing.dim(), (6, 3));
    }

    #[test]
    fn test_too_many_components() {
        let set = mixed_set(3, 256, 128.0);
        let params = ICAParameters {
            n_components: Some(4),
            ..Default::default()
        };
        let result = ICAProcessor::fit(&IdentityBackend::new(), &set, &params, &criteria());
        assert!(matches!(result, Err(SignalError::InvalidParameter(_))));
    }

    #[test]
    fn test_no_eeg_channels() {
        let set = ChannelSet::new(
            "gyro.csv",
            128.0,
            vec![Channel::new("X", ChannelKind::Gyro, vec![0.0; 256])],
        )
        .unwrap();
        let result = ICAProcessor::fit(
            &IdentityBackend::new(),
            &set,
            &ICAParameters::default(),
            &criteria(),
        );
        assert!(matches!(result, Err(SignalError::EmptySelection(_))));
    }

    #[test]
    fn test_bad_channels_excluded() {
        let mut set = mixed_set(3, 256, 128.0);
        set.mark_bad_channels(&["Ch2"]);
        let result = ICAProcessor::fit(
            &IdentityBackend::new(),
            &set,
            &ICAParameters::default(),
            &criteria(),
        )
        .unwrap();
        assert_eq!(result.channel_names, vec!["Ch1", "Ch3"]);
    }

    #[test]
    fn test_high_amplitude_segments_rejected() {
        // 6 s at 128 Hz = three 2 s segments, spike in the second
        let mut set = mixed_set(2, 768, 128.0);
        set.channels[0].samples[300] = 1000.0;
        let backend = IdentityBackend::new();
        let result = ICAProcessor::fit(&backend, &set, &ICAParameters::default(), &criteria()).unwrap();

        assert_eq!(result.rejected_segments, 1);
        assert_eq!(backend.fitted_rows.get(), 512);
        // sources still span the whole recording
        assert_eq!(result.components[0].sources.len(), 768);
    }

    #[test]
    fn test_all_segments_rejected() {
        let mut set = mixed_set(2, 256, 128.0);
        set.channels[1].samples[10] = 1000.0;
        set.channels[1].samples[200] = -1000.0;
        let result = ICAProcessor::fit(
            &IdentityBackend::new(),
            &set,
            &ICAParameters::default(),
            &criteria(),
        );
        assert!(matches!(result, Err(SignalError::Numerical(_))));
    }

    #[test]
    fn test_reconstruct_without_components() {
        let set = mixed_set(3, 512, 128.0);
        let decomposition = ICAProcessor::fit(
            &IdentityBackend::new(),
            &set,
            &ICAParameters::default(),
            &criteria(),
        )
        .unwrap();

        let untouched = ICAProcessor::reconstruct_without_components(&decomposition, &set, &[]).unwrap();
        assert_eq!(untouched, set);

        // identity mixing: removing component 1 flattens Ch2 to its mean
        let cleaned = ICAProcessor::reconstruct_without_components(&decomposition, &set, &[1]).unwrap();
        let mean = decomposition.channel_means[1];
        assert!(cleaned.channels[1].samples.iter().all(|v| (v - mean).abs() < 1e-9));
        for (a, b) in cleaned.channels[0].samples.iter().zip(&set.channels[0].samples) {
            assert!((a - b).abs() < 1e-9);
        }

        assert!(matches!(
            ICAProcessor::reconstruct_without_components(&decomposition, &set, &[3]),
            Err(SignalError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_from_parts_shape_checks() {
        let data = Array2::<f64>::zeros((10, 2));
        let result = ComponentDecomposition::from_parts(
            "r",
            vec!["A".to_string()],
            128.0,
            Array2::eye(2),
            Array1::zeros(2),
            data.view(),
        );
        assert!(matches!(result, Err(SignalError::ShapeMismatch(_))));
    }

    #[test]
    fn test_singular_mixing() {
        let data = Array2::<f64>::zeros((10, 2));
        let result = ComponentDecomposition::from_parts(
            "r",
            vec!["A".to_string(), "B".to_string()],
            128.0,
            Array2::zeros((2, 2)),
            Array1::zeros(2),
            data.view(),
        );
        assert!(matches!(result, Err(SignalError::Numerical(_))));
    }
}
