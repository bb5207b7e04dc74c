use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::ReservationId;
use domain::SagaRun;
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::store::RecordStore;

/// In-memory record store implementation.
///
/// Runs are held in a map keyed by reservation id behind an async
/// read-write lock. The default backend; also used throughout the tests.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    runs: Arc<RwLock<HashMap<ReservationId, SagaRun>>>,
}

impl InMemoryRecordStore {
    /// Creates a new empty in-memory record store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of stored runs.
    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Clears all stored runs.
    pub async fn clear(&self) {
        self.runs.write().await.clear();
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn put(&self, run: SagaRun) -> Result<()> {
        let mut runs = self.runs.write().await;

        if let Some(existing) = runs.get(&run.id())
            && existing.is_terminal()
            && *existing != run
        {
            return Err(StoreError::TerminalOverwrite(run.id()));
        }

        runs.insert(run.id(), run);
        Ok(())
    }

    async fn get(&self, id: ReservationId) -> Result<Option<SagaRun>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&id).cloned())
    }

    async fn running(&self) -> Result<Vec<SagaRun>> {
        let runs = self.runs.read().await;
        Ok(runs.values().filter(|r| !r.is_terminal()).cloned().collect())
    }
}
