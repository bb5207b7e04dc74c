//! Hotel reservation client trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::CommitToken;

use crate::clients::StepError;

/// Trait for hotel reservation operations.
#[async_trait]
pub trait HotelClient: Send + Sync {
    /// Reserves a room at the named hotel.
    ///
    /// Calls bearing the same idempotency key must book at most one room.
    async fn reserve(
        &self,
        idempotency_key: &str,
        hotel_name: &str,
    ) -> Result<CommitToken, StepError>;

    /// Cancels a previously made reservation. Safe to call even if the
    /// reservation no longer exists.
    async fn cancel(&self, token: &CommitToken) -> Result<(), StepError>;
}

#[derive(Debug, Default)]
struct InMemoryHotelState {
    reservations: HashMap<String, String>,
    tokens_by_key: HashMap<String, String>,
    next_id: u32,
    reject_on_reserve: bool,
    transient_failures: u32,
    fail_on_cancel: bool,
}

/// In-memory hotel service for testing and the default wiring.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHotelService {
    state: Arc<RwLock<InMemoryHotelState>>,
}

impl InMemoryHotelService {
    /// Creates a new in-memory hotel service.
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

    /// Configures cancel calls to fail transiently.
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
impl HotelClient for InMemoryHotelService {
    async fn reserve(
        &self,
        idempotency_key: &str,
        hotel_name: &str,
    ) -> Result<CommitToken, StepError> {
        let mut state = self.state.write().unwrap();

        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(StepError::Transient(
                "hotel service unavailable".to_string(),
            ));
        }

        if state.reject_on_reserve {
            return Err(StepError::Rejected("no rooms available".to_string()));
        }

        if let Some(token) = state.tokens_by_key.get(idempotency_key) {
            return Ok(CommitToken::new(token.clone()));
        }

        state.next_id += 1;
        let token = format!("HT-{:04}", state.next_id);
        state
            .reservations
            .insert(token.clone(), hotel_name.to_string());
        state
            .tokens_by_key
            .insert(idempotency_key.to_string(), token.clone());

        Ok(CommitToken::new(token))
    }

    async fn cancel(&self, token: &CommitToken) -> Result<(), StepError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_cancel {
            return Err(StepError::Transient(
                "hotel service unavailable".to_string(),
            ));
        }

        state.reservations.remove(token.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reserve_and_cancel() {
        let service = InMemoryHotelService::new();

        let token = service.reserve("key-1", "Hotel Central").await.unwrap();
        assert!(token.as_str().starts_with("HT-"));
        assert_eq!(service.reservation_count(), 1);

        service.cancel(&token).await.unwrap();
        assert_eq!(service.reservation_count(), 0);
    }

    #[tokio::test]
    async fn test_reserve_is_idempotent_per_key() {
        let service = InMemoryHotelService::new();

        let first = service.reserve("key-1", "Hotel Central").await.unwrap();
        let replay = service.reserve("key-1", "Hotel Central").await.unwrap();

        assert_eq!(first, replay);
        assert_eq!(service.reservation_count(), 1);
    }

    #[tokio::test]
    async fn test_reject_on_reserve() {
        let service = InMemoryHotelService::new();
        service.set_reject_on_reserve(true);

        let result = service.reserve("key-1", "Hotel Central").await;
        assert_eq!(
            result,
            Err(StepError::Rejected("no rooms available".to_string()))
        );
    }

    #[tokio::test]
    async fn test_cancel_missing_reservation_is_ok() {
        let service = InMemoryHotelService::new();
        assert!(service.cancel(&CommitToken::new("HT-9999")).await.is_ok());
    }
}
