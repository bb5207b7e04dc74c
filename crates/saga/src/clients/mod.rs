//! Step client traits and in-memory implementations.
//!
//! Each step pairs a forward action returning a [`CommitToken`] with a
//! compensating action that consumes it. Forward calls take a
//! caller-supplied idempotency key so a retry after an ambiguous failure
//! does not double-book; compensations are safe to call even when the
//! forward effect is uncertain.

pub mod flight;
pub mod hotel;
pub mod payment;

use thiserror::Error;

pub use flight::{FlightClient, InMemoryFlightService};
pub use hotel::{HotelClient, InMemoryHotelService};
pub use payment::{InMemoryPaymentService, PaymentClient, RejectionRule};

/// Failure of a single step-client call attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    /// The service explicitly declined the operation. Never retried;
    /// triggers compensation immediately.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Timeout or connection-level failure. Eligible for retry.
    #[error("transient failure: {0}")]
    Transient(String),
}

impl StepError {
    /// Returns true if a retry of the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StepError::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(StepError::Transient("timeout".into()).is_transient());
        assert!(!StepError::Rejected("declined".into()).is_transient());
    }

    #[test]
    fn display_includes_reason() {
        assert_eq!(
            StepError::Rejected("card declined".into()).to_string(),
            "rejected: card declined"
        );
        assert_eq!(
            StepError::Transient("connection reset".into()).to_string(),
            "transient failure: connection reset"
        );
    }
}
