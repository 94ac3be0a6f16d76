use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("Time {time} outside of recorded span [{start}, {end}]")]
    TimeOutOfRange { time: f64, start: f64, end: f64 },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Missing configuration value: {0}")]
    MissingConfig(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Numerical failure: {0}")]
    Numerical(String),

    #[error("No usable channels: {0}")]
    EmptySelection(String),
}

pub type Result<T> = std::result::Result<T, SignalError>;
