//! Signal conditioning pipeline
//!
//! Turns channel sets into filtered channel sets and ICA decompositions:
//! 1. Band-pass filter (EEG channels only)
//! 2. ICA fit on good EEG channels with amplitude screening
//! 3. Auxiliary channel alignment (ECG/EOG resampled and cropped to the EEG)
//! 4. Source export and component removal
//!
//! All numerics go through the injected [`SignalBackend`].

use serde::{Deserialize, Serialize};

use crate::backend::{NativeBackend, SignalBackend};
use crate::channel_set::{Channel, ChannelSet};
use crate::config::ProcessingConfig;
use crate::error::{Result, SignalError};
use crate::ica::{ComponentDecomposition, ICAParameters, ICAProcessor, RejectionCriteria};
use crate::signal_processing::PowerSpectrum;
use crate::table::{ChannelKind, TimeSeriesTable};

/// Name prefix of source channels added by [`SignalConditioningPipeline::add_ica_sources`]
pub const SOURCE_PREFIX: &str = "ICA";

/// Welch spectrum of one channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSpectrum {
    pub channel: String,
    pub spectrum: PowerSpectrum,
}

pub struct SignalConditioningPipeline<B: SignalBackend = NativeBackend> {
    config: ProcessingConfig,
    backend: B,
}

impl SignalConditioningPipeline<NativeBackend> {
    pub fn new(config: ProcessingConfig) -> Self {
        Self::with_backend(config, NativeBackend)
    }
}

impl Default for SignalConditioningPipeline<NativeBackend> {
    fn default() -> Self {
        Self::new(ProcessingConfig::default())
    }
}

impl<B: SignalBackend> SignalConditioningPipeline<B> {
    pub fn with_backend(config: ProcessingConfig, backend: B) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Band-pass filter with the configured cut-offs
    pub fn bandpass_filter(&self, set: &ChannelSet) -> Result<ChannelSet> {
        self.filter(set, self.config.lower_freq, self.config.upper_freq)
    }

    /// Band-pass filter EEG channels to `[low, high]` Hz; other channels pass
    /// through unchanged
    pub fn filter(&self, set: &ChannelSet, low: f64, high: f64) -> Result<ChannelSet> {
        log::info!(
            "[PIPELINE] Band-pass {:.2}-{:.2} Hz on '{}' ({} channels @ {} Hz)",
            low,
            high,
            set.description,
            set.n_channels(),
            set.sample_rate
        );
        let mut filtered = set.clone();
        for channel in filtered
            .channels
            .iter_mut()
            .filter(|c| c.kind == ChannelKind::Eeg)
        {
            channel.samples = self
                .backend
                .filter(&channel.samples, set.sample_rate, low, high)?;
        }
        Ok(filtered)
    }

    /// Fit ICA on the good EEG channels.
    ///
    /// `n_components` defaults to the number of usable channels; a `seed`
    /// makes the fit reproducible.
    pub fn fit_ica(
        &self,
        set: &ChannelSet,
        n_components: Option<usize>,
        seed: Option<u64>,
    ) -> Result<ComponentDecomposition> {
        let params = ICAParameters {
            n_components,
            random_seed: seed,
            ..ICAParameters::from_config(&self.config)
        };
        let rejection = RejectionCriteria::from_config(&self.config);
        ICAProcessor::fit(&self.backend, set, &params, &rejection)
    }

    /// Merge the `expected` channels of `auxiliary` into a copy of `primary`.
    ///
    /// The auxiliary channels are resampled to the primary rate if the rates
    /// differ, then cropped to the primary duration. Returns `None` when
    /// `auxiliary` has no channel of the expected kind. An auxiliary
    /// recording shorter than the primary one is a `ShapeMismatch`; it is
    /// never padded.
    pub fn align_auxiliary_channel(
        &self,
        primary: &ChannelSet,
        auxiliary: &ChannelSet,
        expected: ChannelKind,
    ) -> Result<Option<ChannelSet>> {
        if !auxiliary.contains_kind(expected) {
            log::warn!(
                "[PIPELINE] '{}' has no {} channel, nothing to merge",
                auxiliary.description,
                expected
            );
            return Ok(None);
        }
        let mut aux = auxiliary.pick_kinds(&[expected]);

        if aux.sample_rate != primary.sample_rate {
            log::info!(
                "[PIPELINE] Resampling {} from {} Hz to {} Hz",
                expected,
                aux.sample_rate,
                primary.sample_rate
            );
            for channel in &mut aux.channels {
                channel.samples =
                    self.backend
                        .resample(&channel.samples, aux.sample_rate, primary.sample_rate)?;
            }
            aux.sample_rate = primary.sample_rate;
        }

        let target = primary.n_times();
        if aux.n_times() < target {
            return Err(SignalError::ShapeMismatch(format!(
                "{} recording has {} samples, EEG has {}",
                expected,
                aux.n_times(),
                target
            )));
        }
        if aux.n_times() > target {
            log::info!(
                "[PIPELINE] Cropping {} from {} to {} samples ({:.3} s)",
                expected,
                aux.n_times(),
                target,
                primary.duration()
            );
            aux = aux.slice_samples(0, target);
        }

        let mut merged = primary.clone();
        merged.add_channels(aux)?;
        Ok(Some(merged))
    }

    pub fn add_ecg_channel(&self, eeg: &ChannelSet, ecg: &ChannelSet) -> Result<Option<ChannelSet>> {
        self.align_auxiliary_channel(eeg, ecg, ChannelKind::Ecg)
    }

    pub fn add_eog_channel(&self, eeg: &ChannelSet, eog: &ChannelSet) -> Result<Option<ChannelSet>> {
        self.align_auxiliary_channel(eeg, eog, ChannelKind::Eog)
    }

    /// ECG channel set from a table, resampled to `resample_to` samples
    pub fn ecg_channel_set(
        &self,
        table: &TimeSeriesTable,
        resample_to: Option<usize>,
    ) -> Result<ChannelSet> {
        ChannelSet::from_ecg_table(table, resample_to)
    }

    /// Welch PSD of the picked channels (all channels when `picks` is
    /// `None`), restricted to `[fmin, fmax]` Hz
    pub fn psd(
        &self,
        set: &ChannelSet,
        fmin: f64,
        fmax: f64,
        picks: Option<&[&str]>,
    ) -> Result<Vec<ChannelSpectrum>> {
        if !(fmin >= 0.0 && fmin <= fmax) {
            return Err(SignalError::InvalidParameter(format!(
                "invalid frequency range [{}, {}]",
                fmin, fmax
            )));
        }
        let picked = match picks {
            Some(names) => set.pick_channels(names)?,
            None => set.clone(),
        };
        picked
            .channels
            .iter()
            .map(|c| {
                let spectrum = self
                    .backend
                    .psd(&c.samples, set.sample_rate)?
                    .restrict(fmin, fmax);
                Ok(ChannelSpectrum {
                    channel: c.name.clone(),
                    spectrum,
                })
            })
            .collect()
    }

    /// Copy of `set` with the decomposition's sources appended as `ICA000`,
    /// `ICA001`, … channels of kind `Source`
    pub fn add_ica_sources(
        &self,
        set: &ChannelSet,
        decomposition: &ComponentDecomposition,
    ) -> Result<ChannelSet> {
        let sources = decomposition.sources_from(set)?;
        let channels = sources
            .columns()
            .into_iter()
            .enumerate()
            .map(|(i, column)| Channel::new(source_name(i), ChannelKind::Source, column.to_vec()))
            .collect();
        let source_set = ChannelSet::new(set.description.clone(), set.sample_rate, channels)?;

        let mut merged = set.clone();
        merged.add_channels(source_set)?;
        log::debug!(
            "[PIPELINE] Added {} source channels to '{}'",
            decomposition.n_components(),
            set.description
        );
        Ok(merged)
    }

    /// Copy of `set` with the listed components removed from its EEG channels
    pub fn remove_components(
        &self,
        set: &ChannelSet,
        decomposition: &ComponentDecomposition,
        components: &[usize],
    ) -> Result<ChannelSet> {
        ICAProcessor::reconstruct_without_components(decomposition, set, components)
    }
}

/// Channel name of source `index`
pub fn source_name(index: usize) -> String {
    format!("{}{:03}", SOURCE_PREFIX, index)
}
