//! Record store error types.

use common::ReservationId;
use thiserror::Error;

/// Errors that can occur during record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Attempted to overwrite a run that already reached a terminal
    /// status with a different state.
    #[error("reservation {0} already has a terminal run")]
    TerminalOverwrite(ReservationId),

    /// Underlying storage failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Convenience type alias for record store results.
pub type Result<T> = std::result::Result<T, StoreError>;
