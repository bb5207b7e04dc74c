//! Saga executor driving reservation runs.

use std::time::{Duration, Instant};

use common::ReservationId;
use domain::{CommitToken, ReservationRequest, RunStatus, SagaRun, StepName};
use record_store::RecordStore;

use crate::clients::{FlightClient, HotelClient, PaymentClient, StepError};
use crate::error::Result;
use crate::retry::RetryPolicy;

/// Tuning knobs for the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Retry policy for forward actions.
    pub forward_retry: RetryPolicy,
    /// Retry policy for compensating actions.
    pub compensation_retry: RetryPolicy,
    /// Upper bound on how long any single step-client call may block.
    pub call_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            forward_retry: RetryPolicy::forward_default(),
            compensation_retry: RetryPolicy::compensation_default(),
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// Orchestrates the execution of reservation sagas.
///
/// Drives the 3-step saga (flight → hotel → payment) with compensating
/// actions on failure. Every state transition is persisted to the record
/// store before the next external call, so a crash leaves a resumable
/// record. Step failures and compensation failures resolve into the
/// terminal status of the returned run, never into `Err`.
pub struct SagaExecutor<S, F, H, P>
where
    S: RecordStore,
    F: FlightClient,
    H: HotelClient,
    P: PaymentClient,
{
    store: S,
    flight: F,
    hotel: H,
    payment: P,
    config: ExecutorConfig,
}

impl<S, F, H, P> SagaExecutor<S, F, H, P>
where
    S: RecordStore,
    F: FlightClient,
    H: HotelClient,
    P: PaymentClient,
{
    /// Creates a new saga executor with the default configuration.
    pub fn new(store: S, flight: F, hotel: H, payment: P) -> Self {
        Self::with_config(store, flight, hotel, payment, ExecutorConfig::default())
    }

    /// Creates a new saga executor with an explicit configuration.
    pub fn with_config(store: S, flight: F, hotel: H, payment: P, config: ExecutorConfig) -> Self {
        Self {
            store,
            flight,
            hotel,
            payment,
            config,
        }
    }

    /// Executes the saga for an accepted request.
    ///
    /// Idempotent per reservation id: if a terminal run already exists it
    /// is returned as-is without touching any step client, and an
    /// in-flight run is resumed instead of restarted.
    #[tracing::instrument(skip(self, request), fields(reservation_id = %id))]
    pub async fn execute(
        &self,
        id: ReservationId,
        request: ReservationRequest,
    ) -> Result<SagaRun> {
        if let Some(existing) = self.store.get(id).await? {
            if existing.is_terminal() {
                tracing::info!(status = %existing.status(), "returning prior terminal outcome");
                return Ok(existing);
            }
            return self.resume(existing).await;
        }

        metrics::counter!("saga_runs_total").increment(1);
        let run = SagaRun::new(id, request);
        self.store.put(run.clone()).await?;

        let start = Instant::now();
        self.drive(run, start).await
    }

    /// Resumes a run found in the Running state, e.g. after a restart.
    ///
    /// If a forward failure was already recorded, compensation is
    /// re-attempted for any committed-but-not-compensated steps;
    /// otherwise forward execution continues from the first pending
    /// step. Idempotency keys make re-attempted forward calls safe.
    #[tracing::instrument(skip(self, run), fields(reservation_id = %run.id()))]
    pub async fn resume(&self, run: SagaRun) -> Result<SagaRun> {
        if run.is_terminal() {
            return Ok(run);
        }

        tracing::info!(status = %run.status(), "resuming in-flight saga run");
        let start = Instant::now();
        if run.has_failed_step() {
            self.compensate_and_finish(run, start).await
        } else {
            self.drive(run, start).await
        }
    }

    /// Runs forward steps in order, stopping at the first failure.
    async fn drive(&self, mut run: SagaRun, start: Instant) -> Result<SagaRun> {
        while let Some(step) = run.first_pending() {
            tracing::info!(step = %step, "saga step started");

            let result = self.forward(step, run.id(), run.request()).await;
            match result {
                Ok(token) => {
                    tracing::info!(step = %step, token = %token, "saga step committed");
                    run.mark_committed(step, token);
                    self.store.put(run.clone()).await?;
                }
                Err(e) => {
                    tracing::warn!(step = %step, error = %e, "saga step failed");
                    run.mark_failed(step, e.to_string());
                    self.store.put(run.clone()).await?;
                    return self.compensate_and_finish(run, start).await;
                }
            }
        }

        run.finish(RunStatus::Succeeded);
        self.store.put(run.clone()).await?;

        metrics::counter!("saga_succeeded").increment(1);
        metrics::histogram!("saga_duration_seconds").record(start.elapsed().as_secs_f64());
        tracing::info!("saga completed successfully");

        Ok(run)
    }

    /// Walks committed steps in reverse order, invoking compensations.
    ///
    /// A failed compensation is recorded and the rollback continues with
    /// the remaining earlier steps; each compensation is independent.
    async fn compensate_and_finish(&self, mut run: SagaRun, start: Instant) -> Result<SagaRun> {
        for step in run.committed_in_reverse() {
            let Some(token) = run.step(step).commit_token.clone() else {
                // A committed step with no token cannot be undone
                tracing::error!(step = %step, "committed step has no commit token, manual reconciliation required");
                run.mark_compensation_failed(step, "committed step has no commit token");
                self.store.put(run.clone()).await?;
                continue;
            };

            tracing::info!(step = %step, "compensating saga step");
            match self
                .config
                .compensation_retry
                .run(|| self.compensate_once(step, &token))
                .await
            {
                Ok(()) => {
                    run.mark_compensated(step);
                }
                Err(e) => {
                    tracing::error!(
                        step = %step,
                        token = %token,
                        error = %e,
                        "compensation failed after retries, manual reconciliation required"
                    );
                    run.mark_compensation_failed(step, e.to_string());
                }
            }
            self.store.put(run.clone()).await?;
        }

        let status = if run.has_uncompensated_step() {
            RunStatus::FailedUncompensated
        } else {
            RunStatus::FailedCompensated
        };
        run.finish(status);
        self.store.put(run.clone()).await?;

        match status {
            RunStatus::FailedUncompensated => {
                metrics::counter!("saga_uncompensated").increment(1);
            }
            _ => {
                metrics::counter!("saga_compensated").increment(1);
            }
        }
        metrics::histogram!("saga_duration_seconds").record(start.elapsed().as_secs_f64());
        tracing::warn!(status = %status, reason = run.failure_reason().unwrap_or("unknown"), "saga failed");

        Ok(run)
    }

    /// Invokes a forward action under the forward retry policy.
    async fn forward(
        &self,
        step: StepName,
        id: ReservationId,
        request: &ReservationRequest,
    ) -> std::result::Result<CommitToken, StepError> {
        // One idempotency key per saga attempt per step, so a retried
        // forward call after an ambiguous failure cannot double-book.
        let key = format!("{}:{}", id, step.as_str());
        self.config
            .forward_retry
            .run(|| self.forward_once(step, &key, request))
            .await
    }

    async fn forward_once(
        &self,
        step: StepName,
        key: &str,
        request: &ReservationRequest,
    ) -> std::result::Result<CommitToken, StepError> {
        let call = async {
            match step {
                StepName::Flight => self.flight.reserve(key, &request.flight_destination).await,
                StepName::Hotel => self.hotel.reserve(key, &request.hotel_name).await,
                StepName::Payment => {
                    self.payment
                        .charge(key, &request.customer, request.amount)
                        .await
                }
            }
        };

        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StepError::Transient(format!(
                "step '{step}' timed out after {:?}",
                self.config.call_timeout
            ))),
        }
    }

    async fn compensate_once(
        &self,
        step: StepName,
        token: &CommitToken,
    ) -> std::result::Result<(), StepError> {
        let call = async {
            match step {
                StepName::Flight => self.flight.cancel(token).await,
                StepName::Hotel => self.hotel.cancel(token).await,
                StepName::Payment => self.payment.refund(token).await,
            }
        };

        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StepError::Transient(format!(
                "compensation for step '{step}' timed out after {:?}",
                self.config.call_timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{
        InMemoryFlightService, InMemoryHotelService, InMemoryPaymentService, RejectionRule,
    };
    use domain::{Money, StepStatus};
    use record_store::InMemoryRecordStore;

    type TestExecutor = SagaExecutor<
        InMemoryRecordStore,
        InMemoryFlightService,
        InMemoryHotelService,
        InMemoryPaymentService,
    >;

    fn setup() -> (
        TestExecutor,
        InMemoryRecordStore,
        InMemoryFlightService,
        InMemoryHotelService,
        InMemoryPaymentService,
    ) {
        setup_with_rule(RejectionRule::over(Money::from_cents(100_000)))
    }

    fn setup_with_rule(
        rule: RejectionRule,
    ) -> (
        TestExecutor,
        InMemoryRecordStore,
        InMemoryFlightService,
        InMemoryHotelService,
        InMemoryPaymentService,
    ) {
        let store = InMemoryRecordStore::new();
        let flight = InMemoryFlightService::new();
        let hotel = InMemoryHotelService::new();
        let payment = InMemoryPaymentService::with_rule(rule);

        let executor = SagaExecutor::new(
            store.clone(),
            flight.clone(),
            hotel.clone(),
            payment.clone(),
        );

        (executor, store, flight, hotel, payment)
    }

    fn request(amount_cents: i64) -> ReservationRequest {
        ReservationRequest::new(
            "Ana",
            "Madrid",
            "Hotel Central",
            Money::from_cents(amount_cents),
        )
    }

    #[tokio::test]
    async fn test_happy_path() {
        let (executor, store, flight, hotel, payment) = setup();
        let id = ReservationId::new();

        let run = executor.execute(id, request(85_000)).await.unwrap();

        assert_eq!(run.status(), RunStatus::Succeeded);
        for step in StepName::ALL {
            assert_eq!(run.step_status(step), StepStatus::Committed);
            assert!(run.step(step).commit_token.is_some());
        }

        assert_eq!(flight.reservation_count(), 1);
        assert_eq!(hotel.reservation_count(), 1);
        assert_eq!(payment.charge_count(), 1);

        // Terminal state persisted
        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored, run);
    }

    #[tokio::test]
    async fn test_payment_rejection_compensates_flight_and_hotel() {
        let (executor, _, flight, hotel, payment) = setup();
        let id = ReservationId::new();

        let run = executor.execute(id, request(150_000)).await.unwrap();

        assert_eq!(run.status(), RunStatus::FailedCompensated);
        assert_eq!(run.step_status(StepName::Flight), StepStatus::Compensated);
        assert_eq!(run.step_status(StepName::Hotel), StepStatus::Compensated);
        // Payment was never committed, so there is nothing to compensate
        assert_eq!(run.step_status(StepName::Payment), StepStatus::Failed);

        assert_eq!(flight.reservation_count(), 0);
        assert_eq!(hotel.reservation_count(), 0);
        assert_eq!(payment.charge_count(), 0);
    }

    #[tokio::test]
    async fn test_hotel_rejection_stops_forward_progress() {
        let (executor, _, flight, hotel, payment) = setup();
        hotel.set_reject_on_reserve(true);
        let id = ReservationId::new();

        let run = executor.execute(id, request(85_000)).await.unwrap();

        assert_eq!(run.status(), RunStatus::FailedCompensated);
        assert_eq!(run.step_status(StepName::Flight), StepStatus::Compensated);
        assert_eq!(run.step_status(StepName::Hotel), StepStatus::Failed);
        // Payment was never attempted
        assert_eq!(run.step_status(StepName::Payment), StepStatus::Pending);

        assert_eq!(flight.reservation_count(), 0);
        assert_eq!(payment.charge_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_within_budget_still_succeed() {
        let (executor, _, _, hotel, payment) = setup();
        hotel.set_transient_failures(2);
        let id = ReservationId::new();

        let run = executor.execute(id, request(85_000)).await.unwrap();

        assert_eq!(run.status(), RunStatus::Succeeded);
        assert_eq!(hotel.reservation_count(), 1);
        assert_eq!(payment.charge_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_beyond_budget_fail_the_step() {
        let (executor, _, flight, hotel, _) = setup();
        // Forward budget is 3 attempts
        hotel.set_transient_failures(5);
        let id = ReservationId::new();

        let run = executor.execute(id, request(85_000)).await.unwrap();

        assert_eq!(run.status(), RunStatus::FailedCompensated);
        assert_eq!(run.step_status(StepName::Hotel), StepStatus::Failed);
        assert_eq!(flight.reservation_count(), 0);
        assert_eq!(hotel.reservation_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_compensation_failure_is_uncompensated_and_rollback_continues() {
        let (executor, store, flight, hotel, payment) = setup();
        hotel.set_fail_on_cancel(true);
        let id = ReservationId::new();

        let run = executor.execute(id, request(150_000)).await.unwrap();

        assert_eq!(run.status(), RunStatus::FailedUncompensated);
        assert_eq!(
            run.step_status(StepName::Hotel),
            StepStatus::CompensationFailed
        );
        // The earlier flight compensation still ran
        assert_eq!(run.step_status(StepName::Flight), StepStatus::Compensated);
        assert_eq!(flight.reservation_count(), 0);
        assert_eq!(hotel.reservation_count(), 1);
        assert_eq!(payment.charge_count(), 0);

        // The distinct marker is persisted for manual reconciliation
        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status(), RunStatus::FailedUncompensated);
        assert_eq!(
            stored.step_status(StepName::Hotel),
            StepStatus::CompensationFailed
        );
        assert!(stored.step(StepName::Hotel).last_error.is_some());
    }

    #[tokio::test]
    async fn test_execute_is_idempotent_after_terminal_outcome() {
        let (executor, _, flight, _, payment) = setup();
        let id = ReservationId::new();

        let first = executor.execute(id, request(85_000)).await.unwrap();
        let replay = executor.execute(id, request(85_000)).await.unwrap();

        assert_eq!(first, replay);
        // No step client was re-invoked
        assert_eq!(flight.reservation_count(), 1);
        assert_eq!(payment.charge_count(), 1);
    }

    #[tokio::test]
    async fn test_resume_of_terminal_run_is_a_no_op() {
        let (executor, _, _, _, _) = setup();
        let id = ReservationId::new();

        let run = executor.execute(id, request(85_000)).await.unwrap();
        let resumed = executor.resume(run.clone()).await.unwrap();
        assert_eq!(run, resumed);
    }

    #[tokio::test]
    async fn test_concurrent_distinct_runs_do_not_interfere() {
        let (executor, _, flight, hotel, payment) = setup();
        let executor = std::sync::Arc::new(executor);

        let a = executor.clone();
        let b = executor.clone();
        let (ra, rb) = tokio::join!(
            a.execute(ReservationId::new(), request(85_000)),
            b.execute(ReservationId::new(), request(90_000)),
        );

        assert_eq!(ra.unwrap().status(), RunStatus::Succeeded);
        assert_eq!(rb.unwrap().status(), RunStatus::Succeeded);
        assert_eq!(flight.reservation_count(), 2);
        assert_eq!(hotel.reservation_count(), 2);
        assert_eq!(payment.charge_count(), 2);
    }
}
