//! Saga run state machine.
//!
//! A [`SagaRun`] tracks one reservation through its three ordered steps.
//! It is created when a request is accepted, mutated only by the saga
//! executor, and becomes immutable once the overall status leaves
//! [`RunStatus::Running`].

use chrono::{DateTime, Utc};
use common::ReservationId;
use serde::{Deserialize, Serialize};

use crate::request::ReservationRequest;
use crate::value_objects::CommitToken;

/// The three saga steps, in forward execution order.
///
/// Payment runs last: it is the step most likely to be declined, and
/// ordering it last minimizes the compensation scope when it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepName {
    /// Reserve a seat on the flight.
    Flight,
    /// Reserve a room at the hotel.
    Hotel,
    /// Charge the total amount.
    Payment,
}

impl StepName {
    /// All steps in forward execution order.
    pub const ALL: [StepName; 3] = [StepName::Flight, StepName::Hotel, StepName::Payment];

    /// Returns the step name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Flight => "flight",
            StepName::Hotel => "hotel",
            StepName::Payment => "payment",
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a single step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StepStatus {
    /// Not yet attempted.
    #[default]
    Pending,

    /// Forward call returned success.
    Committed,

    /// Forward call failed after retries; no side effect to undo.
    Failed,

    /// Compensating call undid the forward effect.
    Compensated,

    /// Compensating call exhausted its retry budget. Requires manual
    /// reconciliation; never silently downgraded.
    CompensationFailed,
}

impl StepStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "Pending",
            StepStatus::Committed => "Committed",
            StepStatus::Failed => "Failed",
            StepStatus::Compensated => "Compensated",
            StepStatus::CompensationFailed => "CompensationFailed",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Overall status of a saga run.
///
/// State transitions:
/// ```text
/// Running ──┬──► Succeeded
///           ├──► FailedCompensated
///           └──► FailedUncompensated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RunStatus {
    /// Steps are being executed or compensated.
    #[default]
    Running,

    /// All forward steps committed (terminal).
    Succeeded,

    /// A forward step failed and every committed step was compensated
    /// (terminal). No lasting side effects.
    FailedCompensated,

    /// At least one compensation could not complete (terminal).
    /// The only state requiring operator intervention.
    FailedUncompensated,
}

impl RunStatus {
    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "Running",
            RunStatus::Succeeded => "Succeeded",
            RunStatus::FailedCompensated => "FailedCompensated",
            RunStatus::FailedUncompensated => "FailedUncompensated",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Record of one step within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Which step this record tracks.
    pub name: StepName,
    /// Current step status.
    pub status: StepStatus,
    /// Handle returned by the forward call, consumed by compensation.
    pub commit_token: Option<CommitToken>,
    /// Last error observed for this step, forward or compensating.
    pub last_error: Option<String>,
}

impl StepRecord {
    fn pending(name: StepName) -> Self {
        Self {
            name,
            status: StepStatus::Pending,
            commit_token: None,
            last_error: None,
        }
    }
}

/// One reservation's journey through the saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaRun {
    id: ReservationId,
    request: ReservationRequest,
    steps: Vec<StepRecord>,
    status: RunStatus,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SagaRun {
    /// Creates a new running saga for an accepted request, with all
    /// steps pending.
    pub fn new(id: ReservationId, request: ReservationRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            request,
            steps: StepName::ALL.iter().copied().map(StepRecord::pending).collect(),
            status: RunStatus::Running,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the reservation ID.
    pub fn id(&self) -> ReservationId {
        self.id
    }

    /// Returns the accepted request.
    pub fn request(&self) -> &ReservationRequest {
        &self.request
    }

    /// Returns the overall run status.
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Returns true if the run has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns the step records in forward order.
    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    fn index(name: StepName) -> usize {
        match name {
            StepName::Flight => 0,
            StepName::Hotel => 1,
            StepName::Payment => 2,
        }
    }

    /// Returns the record for a single step.
    pub fn step(&self, name: StepName) -> &StepRecord {
        &self.steps[Self::index(name)]
    }

    /// Returns the status of a single step.
    pub fn step_status(&self, name: StepName) -> StepStatus {
        self.step(name).status
    }

    /// Returns the reason the run failed, if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// When the run was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the run was last mutated.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the first step still pending, in forward order.
    pub fn first_pending(&self) -> Option<StepName> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Pending)
            .map(|s| s.name)
    }

    /// Returns committed steps in reverse commit order, the order
    /// compensation must run in.
    pub fn committed_in_reverse(&self) -> Vec<StepName> {
        self.steps
            .iter()
            .rev()
            .filter(|s| s.status == StepStatus::Committed)
            .map(|s| s.name)
            .collect()
    }

    /// Returns true if any forward step has failed.
    pub fn has_failed_step(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Failed)
    }

    /// Returns true if any compensation exhausted its retries.
    pub fn has_uncompensated_step(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.status == StepStatus::CompensationFailed)
    }

    fn step_mut(&mut self, name: StepName) -> &mut StepRecord {
        let index = Self::index(name);
        &mut self.steps[index]
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Marks a step committed with the token its forward call returned.
    pub fn mark_committed(&mut self, name: StepName, token: CommitToken) {
        let step = self.step_mut(name);
        step.status = StepStatus::Committed;
        step.commit_token = Some(token);
        self.touch();
    }

    /// Marks a step failed and records the failure reason for the run.
    pub fn mark_failed(&mut self, name: StepName, error: impl Into<String>) {
        let error = error.into();
        let step = self.step_mut(name);
        step.status = StepStatus::Failed;
        step.last_error = Some(error.clone());
        self.failure_reason = Some(format!("step '{}' failed: {error}", name.as_str()));
        self.touch();
    }

    /// Marks a committed step as compensated.
    pub fn mark_compensated(&mut self, name: StepName) {
        let step = self.step_mut(name);
        step.status = StepStatus::Compensated;
        self.touch();
    }

    /// Marks a committed step whose compensation exhausted its retries.
    pub fn mark_compensation_failed(&mut self, name: StepName, error: impl Into<String>) {
        let step = self.step_mut(name);
        step.status = StepStatus::CompensationFailed;
        step.last_error = Some(error.into());
        self.touch();
    }

    /// Moves the run to a terminal status.
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::Money;

    fn make_run() -> SagaRun {
        SagaRun::new(
            ReservationId::new(),
            ReservationRequest::new("Ana", "Madrid", "Hotel Central", Money::from_cents(85000)),
        )
    }

    #[test]
    fn new_run_is_running_with_all_steps_pending() {
        let run = make_run();
        assert_eq!(run.status(), RunStatus::Running);
        assert!(!run.is_terminal());
        assert_eq!(run.steps().len(), 3);
        for step in run.steps() {
            assert_eq!(step.status, StepStatus::Pending);
            assert!(step.commit_token.is_none());
        }
        assert_eq!(run.first_pending(), Some(StepName::Flight));
    }

    #[test]
    fn steps_are_ordered_flight_hotel_payment() {
        let names: Vec<StepName> = make_run().steps().iter().map(|s| s.name).collect();
        assert_eq!(names, StepName::ALL);
    }

    #[test]
    fn commit_advances_first_pending() {
        let mut run = make_run();
        run.mark_committed(StepName::Flight, CommitToken::new("FL-0001"));
        assert_eq!(run.first_pending(), Some(StepName::Hotel));
        assert_eq!(run.step_status(StepName::Flight), StepStatus::Committed);
        assert_eq!(
            run.step(StepName::Flight).commit_token,
            Some(CommitToken::new("FL-0001"))
        );
    }

    #[test]
    fn committed_in_reverse_returns_compensation_order() {
        let mut run = make_run();
        run.mark_committed(StepName::Flight, CommitToken::new("FL-0001"));
        run.mark_committed(StepName::Hotel, CommitToken::new("HT-0001"));
        run.mark_failed(StepName::Payment, "declined");

        assert_eq!(
            run.committed_in_reverse(),
            vec![StepName::Hotel, StepName::Flight]
        );
    }

    #[test]
    fn failed_step_records_run_failure_reason() {
        let mut run = make_run();
        run.mark_failed(StepName::Hotel, "no rooms");
        assert!(run.has_failed_step());
        assert_eq!(run.failure_reason(), Some("step 'hotel' failed: no rooms"));
        assert_eq!(
            run.step(StepName::Hotel).last_error.as_deref(),
            Some("no rooms")
        );
    }

    #[test]
    fn compensation_failure_is_tracked_distinctly() {
        let mut run = make_run();
        run.mark_committed(StepName::Flight, CommitToken::new("FL-0001"));
        run.mark_failed(StepName::Hotel, "no rooms");
        run.mark_compensation_failed(StepName::Flight, "service unavailable");

        assert!(run.has_uncompensated_step());
        assert_eq!(
            run.step_status(StepName::Flight),
            StepStatus::CompensationFailed
        );
    }

    #[test]
    fn finish_makes_run_terminal() {
        let mut run = make_run();
        run.finish(RunStatus::Succeeded);
        assert!(run.is_terminal());
        assert_eq!(run.status(), RunStatus::Succeeded);
    }

    #[test]
    fn run_status_terminality() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::FailedCompensated.is_terminal());
        assert!(RunStatus::FailedUncompensated.is_terminal());
    }

    #[test]
    fn status_display() {
        assert_eq!(RunStatus::Running.to_string(), "Running");
        assert_eq!(RunStatus::FailedUncompensated.to_string(), "FailedUncompensated");
        assert_eq!(StepStatus::Compensated.to_string(), "Compensated");
        assert_eq!(StepName::Payment.to_string(), "payment");
    }

    #[test]
    fn run_serialization_roundtrip() {
        let mut run = make_run();
        run.mark_committed(StepName::Flight, CommitToken::new("FL-0001"));
        run.mark_failed(StepName::Hotel, "no rooms");

        let json = serde_json::to_string(&run).unwrap();
        let deserialized: SagaRun = serde_json::from_str(&json).unwrap();
        assert_eq!(run, deserialized);
    }
}
