//! Per-task outcomes and batch-level helpers.
//!
//! The executor never aborts a batch on failure; callers decide an aggregate
//! policy from the returned outcomes (log and continue, or fail the whole
//! batch via [`into_results`]).

use anyhow::{Result, anyhow};
use serde::Serialize;
use thiserror::Error;

/// Failure recorded for a single task.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("task {index} failed: {message}")]
pub struct TaskFailure {
    /// Position of the task in the submitted batch.
    pub index: usize,
    /// Full error chain rendered with `{:#}`.
    pub message: String,
}

/// Tagged result of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<R> {
    Success(R),
    Failure(TaskFailure),
    /// The batch was cancelled before this task finished.
    Cancelled,
}

impl<R> Outcome<R> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn success(&self) -> Option<&R> {
        match self {
            Outcome::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        match self {
            Outcome::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn into_success(self) -> Option<R> {
        match self {
            Outcome::Success(value) => Some(value),
            _ => None,
        }
    }
}

/// Counts of each outcome kind in a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn from_outcomes<R>(outcomes: &[Outcome<R>]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Success(_) => summary.succeeded += 1,
                Outcome::Failure(_) => summary.failed += 1,
                Outcome::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}

/// Failures in index order.
pub fn failures<R>(outcomes: &[Outcome<R>]) -> Vec<&TaskFailure> {
    outcomes.iter().filter_map(Outcome::failure).collect()
}

/// Collapse a batch into its values, failing on the first non-success.
///
/// This is the "abort on first failure" policy, applied after the batch ran.
pub fn into_results<R>(outcomes: Vec<Outcome<R>>) -> Result<Vec<R>> {
    let mut values = Vec::with_capacity(outcomes.len());
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Outcome::Success(value) => values.push(value),
            Outcome::Failure(failure) => return Err(failure.into()),
            Outcome::Cancelled => return Err(anyhow!("task {index} was cancelled")),
        }
    }
    Ok(values)
}
