//! Channel-field and processing configuration.
//!
//! Field lists decide which table columns are EEG, gyro or quality channels;
//! the processing section carries the band-pass cut-offs and ICA fitting
//! limits. Everything has a default so a partial JSON document is enough.

use crate::error::{Result, SignalError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;

/// Environment variable overriding [`ChannelConfig::sampling_rate`]
pub const ENV_SAMPLING_RATE: &str = "POSDBOS_SAMPLING_RATE";
/// Environment variable overriding [`ProcessingConfig::lower_freq`]
pub const ENV_LOWER_FREQ: &str = "POSDBOS_LOWER_FREQ";
/// Environment variable overriding [`ProcessingConfig::upper_freq`]
pub const ENV_UPPER_FREQ: &str = "POSDBOS_UPPER_FREQ";

/// Recognized field names and calibration constants of the headset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Column names carrying EEG electrodes
    #[serde(default = "default_eeg_fields")]
    pub eeg_fields: Vec<String>,

    /// Column names carrying gyroscope axes
    #[serde(default = "default_gyro_fields")]
    pub gyro_fields: Vec<String>,

    /// Per-axis ground constants, keyed either by field name ("X") or in
    /// the `<field>Ground` form ("xGround")
    #[serde(default)]
    pub gyro_grounds: BTreeMap<String, f64>,

    /// Fallback sampling rate (Hz) when it cannot be derived from timestamps
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
}

fn default_eeg_fields() -> Vec<String> {
    [
        "AF3", "F7", "F3", "FC5", "T7", "P7", "O1", "O2", "P8", "T8", "FC6", "F4", "F8", "AF4",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_gyro_fields() -> Vec<String> {
    vec!["X".to_string(), "Y".to_string()]
}
fn default_sampling_rate() -> f64 {
    128.0
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            eeg_fields: default_eeg_fields(),
            gyro_fields: default_gyro_fields(),
            gyro_grounds: BTreeMap::new(),
            sampling_rate: default_sampling_rate(),
        }
    }
}

impl ChannelConfig {
    pub fn is_eeg_field(&self, name: &str) -> bool {
        self.eeg_fields.iter().any(|f| f == name)
    }

    pub fn is_gyro_field(&self, name: &str) -> bool {
        self.gyro_fields.iter().any(|f| f == name)
    }

    /// Ground constant for a gyro field.
    ///
    /// Looks up the field name first, then the `<field>Ground` key
    /// (lowercased field name, e.g. "xGround" for "X").
    pub fn gyro_ground(&self, field: &str) -> Option<f64> {
        self.gyro_grounds
            .get(field)
            .or_else(|| self.gyro_grounds.get(&ground_key(field)))
            .copied()
    }

    pub fn with_ground(mut self, field: impl Into<String>, ground: f64) -> Self {
        self.gyro_grounds.insert(field.into(), ground);
        self
    }
}

/// Configuration key of the ground constant for `field`
pub fn ground_key(field: &str) -> String {
    format!("{}Ground", field.to_lowercase())
}

/// Band-pass cut-offs and ICA fitting limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Low cut-off of the band-pass filter (Hz)
    #[serde(default = "default_lower_freq")]
    pub lower_freq: f64,

    /// High cut-off of the band-pass filter (Hz)
    #[serde(default = "default_upper_freq")]
    pub upper_freq: f64,

    /// Peak-to-peak amplitude above which a segment is left out of ICA fitting
    #[serde(default = "default_reject_threshold")]
    pub ica_reject_threshold: f64,

    /// Length of the segments checked against the rejection threshold (s)
    #[serde(default = "default_reject_window")]
    pub ica_reject_window_secs: f64,

    #[serde(default = "default_max_iterations")]
    pub ica_max_iterations: usize,

    #[serde(default = "default_tolerance")]
    pub ica_tolerance: f64,
}

fn default_lower_freq() -> f64 {
    0.5
}
fn default_upper_freq() -> f64 {
    30.0
}
fn default_reject_threshold() -> f64 {
    300.0
}
fn default_reject_window() -> f64 {
    2.0
}
fn default_max_iterations() -> usize {
    200
}
fn default_tolerance() -> f64 {
    1e-4
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            lower_freq: default_lower_freq(),
            upper_freq: default_upper_freq(),
            ica_reject_threshold: default_reject_threshold(),
            ica_reject_window_secs: default_reject_window(),
            ica_max_iterations: default_max_iterations(),
            ica_tolerance: default_tolerance(),
        }
    }
}

/// Complete configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub channels: ChannelConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
}

impl Config {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| SignalError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("[CONFIG] Loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Load from an optional file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.with_env_overrides()
    }

    /// Apply `POSDBOS_*` environment overrides
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(rate) = parse_override(&lookup, ENV_SAMPLING_RATE)? {
            self.channels.sampling_rate = rate;
        }
        if let Some(low) = parse_override(&lookup, ENV_LOWER_FREQ)? {
            self.processing.lower_freq = low;
        }
        if let Some(high) = parse_override(&lookup, ENV_UPPER_FREQ)? {
            self.processing.upper_freq = high;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.channels.sampling_rate > 0.0) {
            return Err(SignalError::Config(format!(
                "sampling_rate must be positive, got {}",
                self.channels.sampling_rate
            )));
        }
        let p = &self.processing;
        if !(p.lower_freq > 0.0 && p.lower_freq < p.upper_freq) {
            return Err(SignalError::Config(format!(
                "lower_freq ({}) must be positive and below upper_freq ({})",
                p.lower_freq, p.upper_freq
            )));
        }
        if !(p.ica_reject_window_secs > 0.0) {
            return Err(SignalError::Config(
                "ica_reject_window_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_override<F>(lookup: &F, key: &str) -> Result<Option<f64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| SignalError::Config(format!("{} is not a number: {}", key, raw))),
        None => Ok(None),
    }
}
