//! Shared types for the reservation orchestrator.

mod types;

pub use types::ReservationId;
