//! Physiological recording core: time-indexed tables, EEG signal
//! conditioning and ICA artifact correlation.

pub mod artifact;
pub mod backend;
pub mod channel_set;
pub mod config;
pub mod error;
pub mod ica;
pub mod pipeline;
pub mod signal_processing;
pub mod table;

pub use artifact::{
    ArtifactCorrelator, ArtifactLabeling, ComponentMatch, CORRMAP_THRESHOLD,
    DEFAULT_REFERENCE_CHANNEL,
};
pub use backend::{NativeBackend, SignalBackend};
pub use channel_set::{Channel, ChannelSet};
pub use config::{ChannelConfig, Config, ProcessingConfig};
pub use error::{Result, SignalError};
pub use ica::{ComponentDecomposition, ICAComponent, ICAParameters, ICAProcessor};
pub use pipeline::{ChannelSpectrum, SignalConditioningPipeline};
pub use signal_processing::PowerSpectrum;
pub use table::{
    ChannelKind, TableInput, TimeSeriesTable, ECG_HEADER, TIMESTAMP_STRING, TIME_START,
};
