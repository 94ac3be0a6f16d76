//! Channel-set representation consumed by the conditioning pipeline
//!
//! A `ChannelSet` is a sampling rate plus a list of equally long, typed
//! channels. It is built from a `TimeSeriesTable` and then picked, cropped,
//! merged and epoched without touching the table it came from.

use crate::error::{Result, SignalError};
use crate::signal_processing::resample_to_len;
use crate::table::{ChannelKind, TimeSeriesTable, ECG_HEADER};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Step between overlapping epochs (s)
pub const EPOCH_OVERLAP_STEP_SECS: f64 = 0.5;

/// One named, typed signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel label (e.g., "AF3", "ECG", "ICA000")
    pub name: String,

    pub kind: ChannelKind,

    /// Samples in recording units (typically microvolts)
    pub samples: Vec<f64>,
}

impl Channel {
    pub fn new(name: impl Into<String>, kind: ChannelKind, samples: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            kind,
            samples,
        }
    }
}

/// Equally sampled, typed channels of one recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSet {
    /// Provenance, usually the source file path
    pub description: String,

    /// Sample rate in Hz
    pub sample_rate: f64,

    pub channels: Vec<Channel>,

    /// Channels excluded from fitting
    pub bads: Vec<String>,
}

impl ChannelSet {
    /// Create a channel set, checking rate, lengths and name uniqueness
    pub fn new(
        description: impl Into<String>,
        sample_rate: f64,
        channels: Vec<Channel>,
    ) -> Result<Self> {
        if !(sample_rate > 0.0 && sample_rate.is_finite()) {
            return Err(SignalError::InvalidParameter(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }
        if let Some(first) = channels.first() {
            let n = first.samples.len();
            if let Some(bad) = channels.iter().find(|c| c.samples.len() != n) {
                return Err(SignalError::ShapeMismatch(format!(
                    "channel '{}' has {} samples, expected {}",
                    bad.name,
                    bad.samples.len(),
                    n
                )));
            }
        }
        let mut seen = HashSet::new();
        for channel in &channels {
            if !seen.insert(channel.name.as_str()) {
                return Err(SignalError::DuplicateColumn(channel.name.clone()));
            }
        }
        Ok(Self {
            description: description.into(),
            sample_rate,
            channels,
            bads: Vec::new(),
        })
    }

    /// EEG channels of a table, followed by its gyro channels
    pub fn from_eeg_table(table: &TimeSeriesTable) -> Result<Self> {
        if !table.has_eeg_data {
            return Err(SignalError::EmptySelection(format!(
                "'{}' has no EEG columns",
                table.file_path()
            )));
        }
        let mut channels = Vec::new();
        let groups = [
            (ChannelKind::Eeg, table.get_eeg_header()),
            (ChannelKind::Gyro, table.get_gyro_header()),
        ];
        for (kind, names) in groups {
            for name in names {
                let samples = table
                    .get_column(name)
                    .ok_or_else(|| SignalError::ColumnNotFound(name.clone()))?;
                channels.push(Channel::new(name.clone(), kind, samples.to_vec()));
            }
        }
        Self::new(table.file_path(), table.sampling_rate(), channels)
    }

    /// Single ECG channel of a table, optionally resampled to `resample_to`
    /// samples (the sampling rate is scaled accordingly)
    pub fn from_ecg_table(table: &TimeSeriesTable, resample_to: Option<usize>) -> Result<Self> {
        let samples = table
            .get_column(ECG_HEADER)
            .ok_or_else(|| SignalError::ColumnNotFound(ECG_HEADER.to_string()))?
            .to_vec();
        let (samples, sample_rate) = match resample_to {
            Some(num) if num != samples.len() => {
                let rate = table.sampling_rate() * num as f64 / samples.len() as f64;
                (resample_to_len(&samples, num)?, rate)
            }
            _ => (samples, table.sampling_rate()),
        };
        Self::new(
            table.file_path(),
            sample_rate,
            vec![Channel::new(ECG_HEADER, ChannelKind::Ecg, samples)],
        )
    }

    /// Number of samples per channel
    pub fn n_times(&self) -> usize {
        self.channels.first().map_or(0, |c| c.samples.len())
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    /// Length in seconds
    pub fn duration(&self) -> f64 {
        self.n_times() as f64 / self.sample_rate
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn contains_kind(&self, kind: ChannelKind) -> bool {
        self.channels.iter().any(|c| c.kind == kind)
    }

    pub fn is_bad(&self, name: &str) -> bool {
        self.bads.iter().any(|b| b == name)
    }

    /// Mark channels as bad; unknown names are ignored
    pub fn mark_bad_channels<S: AsRef<str>>(&mut self, names: &[S]) {
        for name in names {
            let name = name.as_ref();
            if self.channel(name).is_some() && !self.is_bad(name) {
                self.bads.push(name.to_string());
            }
        }
    }

    fn with_channels(&self, channels: Vec<Channel>) -> Self {
        let bads = self
            .bads
            .iter()
            .filter(|b| channels.iter().any(|c| &c.name == *b))
            .cloned()
            .collect();
        Self {
            description: self.description.clone(),
            sample_rate: self.sample_rate,
            channels,
            bads,
        }
    }

    /// Channels of the given kinds, in set order
    pub fn pick_kinds(&self, kinds: &[ChannelKind]) -> Self {
        self.with_channels(
            self.channels
                .iter()
                .filter(|c| kinds.contains(&c.kind))
                .cloned()
                .collect(),
        )
    }

    /// EEG channels that are not marked bad
    pub fn pick_eeg(&self) -> Self {
        self.with_channels(
            self.channels
                .iter()
                .filter(|c| c.kind == ChannelKind::Eeg && !self.is_bad(&c.name))
                .cloned()
                .collect(),
        )
    }

    /// Channels by name, in the order given
    pub fn pick_channels<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let channels = names
            .iter()
            .map(|n| {
                self.channel(n.as_ref())
                    .cloned()
                    .ok_or_else(|| SignalError::ColumnNotFound(n.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.with_channels(channels))
    }

    /// Remove channels by name; unknown names are ignored
    pub fn drop_channels<S: AsRef<str>>(&mut self, names: &[S]) {
        let names: HashSet<&str> = names.iter().map(|n| n.as_ref()).collect();
        self.channels.retain(|c| !names.contains(c.name.as_str()));
        self.bads.retain(|b| !names.contains(b.as_str()));
    }

    /// Samples in `[tmin, tmax)` seconds
    pub fn crop(&self, tmin: f64, tmax: f64) -> Result<Self> {
        if !(tmin >= 0.0 && tmin < tmax) {
            return Err(SignalError::InvalidParameter(format!(
                "crop window [{}, {}) is empty or negative",
                tmin, tmax
            )));
        }
        let start = (tmin * self.sample_rate).round() as usize;
        let stop = ((tmax * self.sample_rate).round() as usize).min(self.n_times());
        if start >= stop {
            return Err(SignalError::InvalidParameter(format!(
                "crop start {} s is beyond the data ({} s)",
                tmin,
                self.duration()
            )));
        }
        Ok(self.slice_samples(start, stop))
    }

    pub(crate) fn slice_samples(&self, start: usize, stop: usize) -> Self {
        self.with_channels(
            self.channels
                .iter()
                .map(|c| Channel {
                    name: c.name.clone(),
                    kind: c.kind,
                    samples: c.samples[start..stop].to_vec(),
                })
                .collect(),
        )
    }

    /// Append the channels of `other`.
    ///
    /// Both sets must share sample rate and length; names must stay unique.
    pub fn add_channels(&mut self, other: ChannelSet) -> Result<()> {
        if self.sample_rate != other.sample_rate {
            return Err(SignalError::ShapeMismatch(format!(
                "sample rate {} Hz does not match {} Hz",
                other.sample_rate, self.sample_rate
            )));
        }
        if !self.channels.is_empty() && other.n_times() != self.n_times() {
            return Err(SignalError::ShapeMismatch(format!(
                "{} samples do not match {} samples",
                other.n_times(),
                self.n_times()
            )));
        }
        if let Some(dup) = other.channels.iter().find(|c| self.channel(&c.name).is_some()) {
            return Err(SignalError::DuplicateColumn(dup.name.clone()));
        }
        self.bads.extend(other.bads);
        self.channels.extend(other.channels);
        Ok(())
    }

    /// Stack samples; rows are channels
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.n_channels(), self.n_times()), |(c, t)| {
            self.channels[c].samples[t]
        })
    }

    /// Consecutive epochs of `duration_secs`.
    ///
    /// Epochs start every `duration_secs`, or every 0.5 s when `overlapping`.
    /// A trailing partial epoch is dropped.
    pub fn fixed_length_epochs(&self, duration_secs: f64, overlapping: bool) -> Result<Vec<Self>> {
        if !(duration_secs > 0.0) {
            return Err(SignalError::InvalidParameter(format!(
                "epoch duration must be positive, got {}",
                duration_secs
            )));
        }
        let length = (duration_secs * self.sample_rate).round() as usize;
        let step = if overlapping {
            (EPOCH_OVERLAP_STEP_SECS * self.sample_rate).round() as usize
        } else {
            length
        };
        if length == 0 || step == 0 {
            return Err(SignalError::InvalidParameter(format!(
                "epoch of {} s is shorter than one sample at {} Hz",
                duration_secs, self.sample_rate
            )));
        }

        let n_times = self.n_times();
        let mut epochs = Vec::new();
        let mut start = 0;
        while start + length <= n_times {
            epochs.push(self.slice_samples(start, start + length));
            start += step;
        }
        log::debug!(
            "[PIPELINE] {} epochs of {} samples from '{}'",
            epochs.len(),
            length,
            self.description
        );
        Ok(epochs)
    }
}
