//! Error types for inspect-cycle crate.

use thiserror::Error;

/// Errors raised by external collaborators at the cycle boundary.
///
/// The tracker never propagates these; they are logged and reported
/// through [`crate::CycleEvent`].
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    /// Scoring or actuation failed.
    #[error("judgement failed: {0}")]
    Judgement(String),

    /// The silent hardware fault reset failed.
    #[error("fault reset failed: {0}")]
    FaultReset(String),

    /// The continuous detection driver could not advance.
    #[error("continuous advance failed: {0}")]
    Advance(String),

    /// The collaborator panicked; the panic was contained.
    #[error("collaborator panicked: {0}")]
    Panicked(String),
}

/// Result type for collaborator calls.
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Errors raised by the cycle tracker itself.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for cycle operations.
pub type CycleResult<T> = Result<T, CycleError>;
