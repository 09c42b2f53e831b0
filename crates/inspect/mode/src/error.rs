//! Error types for inspect-mode crate.

use inspect_types::{IllegalTransition, SystemState};
use thiserror::Error;

/// Errors raised by the mode controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeError {
    /// The requested state is not reachable from the current one.
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    /// System test exit requested while not testing.
    #[error("not in system test (state is {0})")]
    NotInSystemTest(SystemState),
}

/// Result type for mode operations.
pub type ModeResult<T> = Result<T, ModeError>;
