//! Tagged task outcomes.
//!
//! Handlers never unwind: every failure is returned as a [`TaskFailure`] and
//! composed explicitly by the runner.

use std::fmt;

use sitesearch_types::{Task, TaskError};

use crate::error::HandlingError;

/// Outcome of handling one task.
pub type TaskResult = Result<(), TaskFailure>;

/// Why a task did not complete.
#[derive(Debug)]
pub enum TaskFailure {
    /// Temporary failure; `replacement` should be resubmitted after backoff.
    Retryable { replacement: Task, cause: String },

    /// The task can never succeed.
    Fatal(HandlingError),

    /// Several failures from one task (a site with bad items, a composite op).
    Aggregate(Vec<TaskFailure>),
}

impl TaskFailure {
    pub fn retry(replacement: Task, cause: impl fmt::Display) -> Self {
        TaskFailure::Retryable {
            replacement,
            cause: cause.to_string(),
        }
    }

    /// Build an aggregate from collected failures.
    ///
    /// Returns `None` for an empty list and the failure itself for a
    /// single-element list.
    pub fn aggregate(failures: Vec<TaskFailure>) -> Option<TaskFailure> {
        let mut members: Vec<TaskFailure> = failures
            .into_iter()
            .flat_map(TaskFailure::flatten)
            .collect();
        match members.len() {
            0 => None,
            1 => members.pop(),
            _ => Some(TaskFailure::Aggregate(members)),
        }
    }

    /// `Ok` when nothing failed, otherwise the aggregate of `failures`.
    pub fn result_of(failures: Vec<TaskFailure>) -> TaskResult {
        match TaskFailure::aggregate(failures) {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    /// Combine two failures into one flat aggregate.
    pub fn merge(self, other: TaskFailure) -> TaskFailure {
        let mut members = self.flatten();
        members.extend(other.flatten());
        TaskFailure::Aggregate(members)
    }

    /// Members of this failure with nested aggregates expanded.
    ///
    /// The result never contains an `Aggregate`.
    pub fn flatten(self) -> Vec<TaskFailure> {
        match self {
            TaskFailure::Aggregate(members) => {
                members.into_iter().flat_map(TaskFailure::flatten).collect()
            }
            other => vec![other],
        }
    }

    /// True if this failure or any member is retryable.
    pub fn has_retryable(&self) -> bool {
        match self {
            TaskFailure::Retryable { .. } => true,
            TaskFailure::Fatal(_) => false,
            TaskFailure::Aggregate(members) => members.iter().any(TaskFailure::has_retryable),
        }
    }

    /// Drop retryable members, keeping only the non-retryable ones.
    pub fn into_fatal(self) -> Option<TaskFailure> {
        let fatals: Vec<TaskFailure> = self
            .flatten()
            .into_iter()
            .filter(|member| matches!(member, TaskFailure::Fatal(_)))
            .collect();
        TaskFailure::aggregate(fatals)
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Retryable { replacement, cause } => {
                write!(f, "retryable ({}), replacement {}", cause, replacement)
            }
            TaskFailure::Fatal(err) => write!(f, "fatal: {}", err),
            TaskFailure::Aggregate(members) => write!(f, "{} failures", members.len()),
        }
    }
}

impl From<HandlingError> for TaskFailure {
    fn from(err: HandlingError) -> Self {
        TaskFailure::Fatal(err)
    }
}

impl From<TaskError> for TaskFailure {
    fn from(err: TaskError) -> Self {
        TaskFailure::Fatal(HandlingError::Task(err))
    }
}
