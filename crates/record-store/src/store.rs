//! Record store trait.

use async_trait::async_trait;
use common::ReservationId;
use domain::SagaRun;

use crate::error::Result;

/// Durable storage of saga runs keyed by reservation id.
///
/// Implementations must support concurrent reads and writes to distinct
/// keys without cross-run interference. Writing a run whose id already
/// holds a different terminal run is an error; re-putting an identical
/// terminal run is allowed so resumed work can converge idempotently.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persists the current state of a run, replacing any prior state
    /// for the same reservation id.
    async fn put(&self, run: SagaRun) -> Result<()>;

    /// Loads the run for a reservation id, if one exists.
    async fn get(&self, id: ReservationId) -> Result<Option<SagaRun>>;

    /// Returns all runs still in the Running state, for crash recovery.
    async fn running(&self) -> Result<Vec<SagaRun>>;
}
