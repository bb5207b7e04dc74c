//! Reservation record store.
//!
//! Durable record of saga state per reservation id, used for idempotency
//! lookups and for recovering in-flight runs after a crash. Terminal runs
//! are write-once: a reservation id maps to at most one terminal run.

pub mod error;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use memory::InMemoryRecordStore;
pub use store::RecordStore;
