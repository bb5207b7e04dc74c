//! Saga error types.

use record_store::StoreError;
use thiserror::Error;

/// Errors that can escape the saga executor.
///
/// Step failures and compensation failures are not errors at this level;
/// they resolve into the terminal status of the returned run. Only faults
/// in the executor's own machinery surface as `Err`.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The record store failed while persisting run state.
    #[error("record store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
