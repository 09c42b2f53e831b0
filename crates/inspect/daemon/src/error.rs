//! Error types for inspectd

use thiserror::Error;

/// Daemon errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cycle tracker error
    #[error("Cycle error: {0}")]
    Cycle(#[from] inspect_cycle::CycleError),

    /// Mode controller error
    #[error("Mode error: {0}")]
    Mode(#[from] inspect_mode::ModeError),
}

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
