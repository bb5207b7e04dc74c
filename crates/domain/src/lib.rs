//! Domain layer for the reservation orchestrator.
//!
//! Defines the reservation request with its validation rules, the money
//! value object, and the saga run state machine the executor drives:
//! three ordered steps (flight → hotel → payment) with per-step statuses
//! and an overall run status.

pub mod request;
pub mod run;
pub mod value_objects;

pub use request::{ReservationRequest, ValidationError};
pub use run::{RunStatus, SagaRun, StepName, StepRecord, StepStatus};
pub use value_objects::{CommitToken, Money};
