//! Backoff-aware task runner.
//!
//! Wraps every task execution with the shared [`Backoff`]: tasks wait while
//! the runners are frozen, a success resets the interval, and a retryable
//! failure resubmits its replacement and freezes every runner for the
//! current interval.

use std::sync::Arc;

use sitesearch_types::Task;
use tracing::{debug, error, warn};

use crate::backoff::Backoff;
use crate::context::TaskContext;
use crate::error::HandlingError;
use crate::failure::TaskFailure;
use crate::handler::{TaskHandler, TaskSubmitter};

/// How a run ended when it did not report a non-retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// A replacement task was resubmitted and the backoff engaged
    Retried,
    /// Shutdown arrived while waiting; the task was resubmitted unchanged
    Interrupted,
}

pub struct TaskRunner {
    handler: Arc<dyn TaskHandler>,
    backoff: Arc<Backoff>,
    submitter: Arc<dyn TaskSubmitter>,
}

impl TaskRunner {
    pub fn new(
        handler: Arc<dyn TaskHandler>,
        backoff: Arc<Backoff>,
        submitter: Arc<dyn TaskSubmitter>,
    ) -> Self {
        Self {
            handler,
            backoff,
            submitter,
        }
    }

    pub fn backoff(&self) -> &Arc<Backoff> {
        &self.backoff
    }

    /// Run one task.
    ///
    /// Non-retryable failures are logged and returned; the task is dropped.
    pub fn run(&self, task: Task) -> Result<RunOutcome, HandlingError> {
        if self.backoff.wait_while_frozen().is_err() {
            warn!(task = %task, "Interrupted while frozen, resubmitting task");
            self.submitter.submit(task);
            return Ok(RunOutcome::Interrupted);
        }

        let result = {
            let ctx = TaskContext::elevated(&task);
            ctx.span().in_scope(|| self.handler.handle(&task, &ctx))
        };

        match result {
            Ok(()) => {
                self.backoff.reset();
                debug!(task = %task, "Task completed");
                Ok(RunOutcome::Completed)
            }
            Err(failure) => self.recover(&task, failure),
        }
    }

    fn recover(&self, task: &Task, failure: TaskFailure) -> Result<RunOutcome, HandlingError> {
        let mut retry: Option<(Task, String)> = None;
        let mut fatals = Vec::new();

        for member in failure.flatten() {
            match member {
                TaskFailure::Retryable { replacement, cause } => {
                    if retry.is_none() {
                        retry = Some((replacement, cause));
                    } else {
                        warn!(task = %task, replacement = %replacement, cause = %cause, "Dropping additional retryable failure");
                    }
                }
                TaskFailure::Fatal(err) => {
                    error!(task = %task, error = %err, "Task failed");
                    fatals.push(err);
                }
                // flatten() never yields aggregates
                TaskFailure::Aggregate(_) => {}
            }
        }

        let mut outcome = RunOutcome::Completed;
        if let Some((replacement, cause)) = retry {
            warn!(task = %task, replacement = %replacement, cause = %cause, "Temporary failure, backing off");
            let submitter = &self.submitter;
            let engaged = self.backoff.engage(|| submitter.submit(replacement));
            outcome = match engaged {
                Ok(()) => RunOutcome::Retried,
                Err(_) => RunOutcome::Interrupted,
            };
        }

        match HandlingError::from_many(fatals) {
            Some(err) => Err(err),
            None => Ok(outcome),
        }
    }
}
