use std::path::PathBuf;
use thiserror::Error;

use super::constants::RECORD_SIZE;
use super::pass_status::PassStatus;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("Buffer of {len} bytes is not a whole number of {size}-byte records", size=RECORD_SIZE)]
    TruncatedRecord { len: usize },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum HistogramError {
    #[error("Histogram axis is invalid -- min: {min} max: {max} bins: {n_bins}; binning is disabled")]
    InvalidAxis { min: f64, max: f64, n_bins: i64 },
    #[error("Energy bin grouping factor {0} is invalid; 2-D binning is disabled")]
    InvalidEnergyGroup(i64),
    #[error("Time-energy spectrum of {time_bins} x {energy_groups} bins exceeds the limit of {max} bins; 2-D binning is disabled")]
    TooManyBins {
        time_bins: usize,
        energy_groups: usize,
        max: usize,
    },
}

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("StreamCursor failed due to IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("StreamCursor is not open")]
    NotOpen,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config does not contain channel {0}")]
    InvalidChannel(usize),
}

#[derive(Debug, Error)]
pub enum ConverterError {
    #[error("Converter could not open list file {0:?} because it does not exist")]
    BadFilePath(PathBuf),
    #[error("Converter failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Converter failed to decode records: {0}")]
    RecordError(#[from] RecordError),
    #[error("Converter failed to write YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to StreamCursor error: {0}")]
    CursorError(#[from] CursorError),
    #[error("Processor failed to decode records: {0}")]
    RecordError(#[from] RecordError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor was asked for channel {0} which does not exist")]
    InvalidChannel(usize),
    #[error("Processor found channel {0} poisoned by a panicked pass")]
    ChannelPoisoned(usize),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<PassStatus>),
}
