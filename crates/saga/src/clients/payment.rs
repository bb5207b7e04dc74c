//! Payment client trait, rejection rule, and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{CommitToken, Money};

use crate::clients::StepError;

/// Trait for payment operations.
#[async_trait]
pub trait PaymentClient: Send + Sync {
    /// Charges the customer for the total amount.
    ///
    /// Calls bearing the same idempotency key must charge at most once;
    /// a retried call returns the token of the existing charge.
    async fn charge(
        &self,
        idempotency_key: &str,
        customer: &str,
        amount: Money,
    ) -> Result<CommitToken, StepError>;

    /// Refunds a previously made charge in full. Safe to call even if
    /// the charge no longer exists.
    async fn refund(&self, token: &CommitToken) -> Result<(), StepError>;
}

/// Business rule deciding which charges the payment service declines.
///
/// Declining is an ordinary business rejection, not fault injection;
/// transient-fault simulation is a separate knob on the in-memory service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RejectionRule {
    reject_over: Option<Money>,
}

impl RejectionRule {
    /// A rule that accepts every amount.
    pub fn accept_all() -> Self {
        Self { reject_over: None }
    }

    /// A rule that declines amounts strictly greater than `limit`.
    pub fn over(limit: Money) -> Self {
        Self {
            reject_over: Some(limit),
        }
    }

    /// Returns true if the rule declines the given amount.
    pub fn rejects(&self, amount: Money) -> bool {
        self.reject_over.is_some_and(|limit| amount > limit)
    }
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    charges: HashMap<String, (String, Money)>,
    tokens_by_key: HashMap<String, String>,
    next_id: u32,
    transient_failures: u32,
    fail_on_refund: bool,
}

/// In-memory payment service for testing and the default wiring.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    rule: RejectionRule,
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentService {
    /// Creates a payment service that accepts every amount.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a payment service governed by the given rejection rule.
    pub fn with_rule(rule: RejectionRule) -> Self {
        Self {
            rule,
            state: Arc::default(),
        }
    }

    /// Makes the next `count` charge attempts fail transiently.
    pub fn set_transient_failures(&self, count: u32) {
        self.state.write().unwrap().transient_failures = count;
    }

    /// Configures refund calls to fail transiently.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().unwrap().fail_on_refund = fail;
    }

    /// Returns the number of live charges.
    pub fn charge_count(&self) -> usize {
        self.state.read().unwrap().charges.len()
    }

    /// Returns true if a charge exists with the given token.
    pub fn has_charge(&self, token: &CommitToken) -> bool {
        self.state
            .read()
            .unwrap()
            .charges
            .contains_key(token.as_str())
    }
}

#[async_trait]
impl PaymentClient for InMemoryPaymentService {
    async fn charge(
        &self,
        idempotency_key: &str,
        customer: &str,
        amount: Money,
    ) -> Result<CommitToken, StepError> {
        let mut state = self.state.write().unwrap();

        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(StepError::Transient(
                "payment service unavailable".to_string(),
            ));
        }

        if self.rule.rejects(amount) {
            return Err(StepError::Rejected(format!(
                "payment declined: amount {amount} exceeds the configured limit"
            )));
        }

        if let Some(token) = state.tokens_by_key.get(idempotency_key) {
            return Ok(CommitToken::new(token.clone()));
        }

        state.next_id += 1;
        let token = format!("PAY-{:04}", state.next_id);
        state
            .charges
            .insert(token.clone(), (customer.to_string(), amount));
        state
            .tokens_by_key
            .insert(idempotency_key.to_string(), token.clone());

        Ok(CommitToken::new(token))
    }

    async fn refund(&self, token: &CommitToken) -> Result<(), StepError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_refund {
            return Err(StepError::Transient(
                "payment service unavailable".to_string(),
            ));
        }

        state.charges.remove(token.as_str());
        Ok(())
    }
}
