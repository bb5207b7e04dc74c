//! Flight reservation client trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::CommitToken;

use crate::clients::StepError;

/// Trait for flight reservation operations.
#[async_trait]
pub trait FlightClient: Send + Sync {
    /// Reserves a seat to the given destination.
    ///
    /// Calls bearing the same idempotency key must book at most one seat;
    /// a retried call returns the token of the existing reservation.
    async fn reserve(
        &self,
        idempotency_key: &str,
        destination: &str,
    ) -> Result<CommitToken, StepError>;

    /// Cancels a previously made reservation. Safe to call even if the
    /// reservation no longer exists.
    async fn cancel(&self, token: &CommitToken) -> Result<(), StepError>;
}

#[derive(Debug, Default)]
struct InMemoryFlightState {
    reservations: HashMap<String, String>,
    tokens_by_key: HashMap<String, String>,
    next_id: u32,
    reject_on_reserve: bool,
    transient_failures: u32,
    fail_on_cancel: bool,
}

/// In-memory flight service for testing and the default wiring.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFlightService {
    state: Arc<RwLock<InMemoryFlightState>>,
}

impl InMemoryFlightService {
    /// Creates a new in-memory flight service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to decline reserve calls.
    pub fn set_reject_on_reserve(&self, reject: bool) {
        self.state.write().unwrap().reject_on_reserve = reject;
    }

    /// Makes the next `count` reserve attempts fail transiently.
    pub fn set_transient_failures(&self, count: u32) {
        self.state.write().unwrap().transient_failures = count;
    }

    /// Configures cancel calls to fail transiently, for exercising
    /// compensation failures.
    pub fn set_fail_on_cancel(&self, fail: bool) {
        self.state.write().unwrap().fail_on_cancel = fail;
    }

    /// Returns the number of live reservations.
    pub fn reservation_count(&self) -> usize {
        self.state.read().unwrap().reservations.len()
    }

    /// Returns true if a reservation exists with the given token.
    pub fn has_reservation(&self, token: &CommitToken) -> bool {
        self.state
            .read()
            .unwrap()
            .reservations
            .contains_key(token.as_str())
    }
}

#[async_trait]
impl FlightClient for InMemoryFlightService {
    async fn reserve(
        &self,
        idempotency_key: &str,
        destination: &str,
    ) -> Result<CommitToken, StepError> {
        let mut state = self.state.write().unwrap();

        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(StepError::Transient(
                "flight service unavailable".to_string(),
            ));
        }

        if state.reject_on_reserve {
            return Err(StepError::Rejected("no seats available".to_string()));
        }

        if let Some(token) = state.tokens_by_key.get(idempotency_key) {
            return Ok(CommitToken::new(token.clone()));
        }

        state.next_id += 1;
        let token = format!("FL-{:04}", state.next_id);
        state
            .reservations
            .insert(token.clone(), destination.to_string());
        state
            .tokens_by_key
            .insert(idempotency_key.to_string(), token.clone());

        Ok(CommitToken::new(token))
    }

    async fn cancel(&self, token: &CommitToken) -> Result<(), StepError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_cancel {
            return Err(StepError::Transient(
                "flight service unavailable".to_string(),
            ));
        }

        // Cancel if exists; a missing reservation is already cancelled.
        state.reservations.remove(token.as_str());
        Ok(())
    }
}
