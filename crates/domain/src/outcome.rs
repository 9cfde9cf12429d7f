//! Per-iteration outcomes and terminal reports of a poll run.

use crate::snapshot::AccumulatedResult;
use serde::Serialize;
use std::fmt;
use telemetry_probe_shared::ErrorEnvelope;

/// Decision taken after one poll iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The predicate accepted the accumulated view.
    Converged,
    /// The predicate rejected the view and budget remains.
    ContinuePolling,
    /// The predicate rejected the view on the last budgeted poll.
    ExhaustedBudget,
}

impl PollOutcome {
    /// Decide the outcome for poll number `poll` (1-based) out of `budget`.
    ///
    /// Convergence wins over exhaustion on the final poll.
    #[must_use]
    pub const fn decide(converged: bool, poll: u32, budget: u32) -> Self {
        if converged {
            Self::Converged
        } else if poll >= budget {
            Self::ExhaustedBudget
        } else {
            Self::ContinuePolling
        }
    }

    /// Returns true when the run ends after this iteration.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::ContinuePolling)
    }
}

/// Terminal state of a poll run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PollStatus {
    /// The predicate held.
    Converged,
    /// The iteration budget ran out without convergence.
    Exhausted,
    /// A collector was stopped by its owner.
    Stopped,
}

impl PollStatus {
    /// Stable name used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::Exhausted => "exhausted",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for PollStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Result of a run that ended without a source failure.
#[derive(Debug, Clone, PartialEq)]
pub struct PollReport {
    status: PollStatus,
    polls: u32,
    result: AccumulatedResult,
}

impl PollReport {
    /// Build a report.
    #[must_use]
    pub const fn new(status: PollStatus, polls: u32, result: AccumulatedResult) -> Self {
        Self {
            status,
            polls,
            result,
        }
    }

    /// Terminal status.
    #[must_use]
    pub const fn status(&self) -> PollStatus {
        self.status
    }

    /// Number of completed poll cycles.
    #[must_use]
    pub const fn polls(&self) -> u32 {
        self.polls
    }

    /// Returns true when the predicate held.
    #[must_use]
    pub const fn converged(&self) -> bool {
        matches!(self.status, PollStatus::Converged)
    }

    /// Final accumulated view.
    #[must_use]
    pub const fn result(&self) -> &AccumulatedResult {
        &self.result
    }

    /// Consume the report, keeping only the accumulated view.
    #[must_use]
    pub fn into_result(self) -> AccumulatedResult {
        self.result
    }
}

/// A run that ended because the snapshot source failed, or was cancelled.
///
/// Carries whatever was accumulated before the failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("poll run failed after {polls} completed polls: {error}")]
pub struct PollFailure {
    #[source]
    error: ErrorEnvelope,
    polls: u32,
    partial: AccumulatedResult,
}

impl PollFailure {
    /// Build a failure.
    #[must_use]
    pub fn new(error: ErrorEnvelope, polls: u32, partial: AccumulatedResult) -> Self {
        Self {
            error,
            polls,
            partial,
        }
    }

    /// Underlying error.
    #[must_use]
    pub const fn error(&self) -> &ErrorEnvelope {
        &self.error
    }

    /// Number of poll cycles that completed before the failure.
    #[must_use]
    pub const fn polls(&self) -> u32 {
        self.polls
    }

    /// Data accumulated before the failure.
    #[must_use]
    pub const fn partial(&self) -> &AccumulatedResult {
        &self.partial
    }

    /// Returns true when the run was cancelled rather than failed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.error.is_cancelled()
    }

    /// Split into the error and the partial result.
    #[must_use]
    pub fn into_parts(self) -> (ErrorEnvelope, AccumulatedResult) {
        (self.error, self.partial)
    }
}

impl From<PollFailure> for ErrorEnvelope {
    fn from(failure: PollFailure) -> Self {
        failure
            .error
            .with_default_metadata("polls_completed", failure.polls.to_string())
    }
}
