//! Error types for the entire library.
//!
//! We use `thiserror` for typed errors, one enum per concern.
//! Callers decide which of them are fatal.

use thiserror::Error;

/// Errors raised by phase bookkeeping
#[derive(Error, Debug)]
pub enum PhaseError {
    #[error("No active phase to end")]
    EmptyStack,

    #[error("Phase '{0}' is already active on the stack")]
    ReentrantPhase(String),

    #[error("Phase '{0}' was ended outside its guard")]
    GuardedPhaseEnded(String),

    #[error("{0} phase(s) still active")]
    ActivePhases(usize),

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),
}

/// Errors that can occur while writing statistics to disk
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to read file: {0}")]
    ReadFailed(std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),

    #[error("Malformed statistics for phase '{phase}': {reason}")]
    MalformedStatistics { phase: String, reason: String },
}

/// Errors that can occur while parsing rendered statistics text
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Malformed statistics: {0}")]
    MalformedStatistics(String),

    #[error("Unknown sort key: {0}")]
    UnknownSortKey(String),
}

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadFailed(#[from] std::io::Error),

    #[error("Invalid config format: {0}")]
    InvalidFormat(#[from] serde_json::Error),
}
