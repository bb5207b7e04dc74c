//! Reservation request and its validation rules.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value_objects::Money;

/// Errors raised while validating an incoming reservation request.
///
/// Validation happens before any saga starts; a rejected request has
/// no side effects.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required string field is missing or blank.
    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),

    /// The total amount is below zero.
    #[error("total amount must not be negative, got {0}")]
    NegativeAmount(Money),
}

/// A request to book a flight, a hotel, and charge a payment as one
/// logical transaction. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    /// Customer name.
    pub customer: String,
    /// Destination of the flight to reserve.
    pub flight_destination: String,
    /// Name of the hotel to reserve.
    pub hotel_name: String,
    /// Total amount to charge, currency implicit.
    pub amount: Money,
}

impl ReservationRequest {
    /// Creates a new reservation request.
    pub fn new(
        customer: impl Into<String>,
        flight_destination: impl Into<String>,
        hotel_name: impl Into<String>,
        amount: Money,
    ) -> Self {
        Self {
            customer: customer.into(),
            flight_destination: flight_destination.into(),
            hotel_name: hotel_name.into(),
            amount,
        }
    }

    /// Checks that all required fields are present and the amount is
    /// non-negative.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.customer.trim().is_empty() {
            return Err(ValidationError::EmptyField("cliente"));
        }
        if self.flight_destination.trim().is_empty() {
            return Err(ValidationError::EmptyField("vuelo_destino"));
        }
        if self.hotel_name.trim().is_empty() {
            return Err(ValidationError::EmptyField("hotel_nombre"));
        }
        if self.amount.is_negative() {
            return Err(ValidationError::NegativeAmount(self.amount));
        }
        Ok(())
    }
}
