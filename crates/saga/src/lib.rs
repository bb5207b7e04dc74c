//! Saga executor for travel reservations.
//!
//! Coordinates a 3-step distributed transaction (flight → hotel → payment)
//! across independent services with compensating actions on failure.
//!
//! Forward steps run in order and stop at the first failure. Committed
//! steps are then compensated in reverse order; a failed compensation is
//! recorded and the rollback continues with the remaining steps. Every
//! state transition is persisted to the record store, so an interrupted
//! run can be resumed after a restart.

pub mod clients;
pub mod error;
pub mod executor;
pub mod retry;

pub use clients::{
    FlightClient, HotelClient, InMemoryFlightService, InMemoryHotelService,
    InMemoryPaymentService, PaymentClient, RejectionRule, StepError,
};
pub use error::SagaError;
pub use executor::{ExecutorConfig, SagaExecutor};
pub use retry::RetryPolicy;
