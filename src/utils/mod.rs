//! Utility modules for configuration and error handling.

pub mod config;
pub mod error;

// Re-export commonly used types for convenience
pub use config::ProfilerConfig;
pub use error::{ConfigError, ExportError, ParseError, PhaseError};
