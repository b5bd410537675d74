//! Per-task execution context.
//!
//! The runner creates one [`TaskContext`] before dispatch and drops it when
//! the task finishes, on every exit path. Handlers receive it by reference;
//! nothing about the running task is kept in thread-local state.

use std::time::{Duration, Instant};

use sitesearch_types::Task;
use tracing::{debug, info_span, Span};
use ulid::Ulid;

/// Scoped state for one task execution.
#[derive(Debug)]
pub struct TaskContext {
    id: Ulid,
    task: String,
    elevated: bool,
    started: Instant,
    span: Span,
}

impl TaskContext {
    /// Context with indexing privileges, used for every queued task.
    pub fn elevated(task: &Task) -> Self {
        Self::with_privileges(task, true)
    }

    /// Context without elevated privileges; restricted content is unreadable
    /// under it.
    pub fn unprivileged(task: &Task) -> Self {
        Self::with_privileges(task, false)
    }

    fn with_privileges(task: &Task, elevated: bool) -> Self {
        let id = Ulid::new();
        let span = info_span!("task", context = %id, task = %task);
        debug!(context = %id, task = %task, elevated, "Acquired task context");
        Self {
            id,
            task: task.to_string(),
            elevated,
            started: Instant::now(),
            span,
        }
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    /// May read any content regardless of the triggering user's permissions.
    pub fn is_elevated(&self) -> bool {
        self.elevated
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Span covering the task; handlers' events are recorded inside it.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for TaskContext {
    fn drop(&mut self) {
        debug!(
            context = %self.id,
            task = %self.task,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Released task context"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_contexts_are_distinct() {
        let task = Task::index_all(Utc::now());
        let a = TaskContext::elevated(&task);
        let b = TaskContext::elevated(&task);
        assert_ne!(a.id(), b.id());
        assert!(a.is_elevated());
    }

    #[test]
    fn test_unprivileged_context() {
        let ctx = TaskContext::unprivileged(&Task::index_all(Utc::now()));
        assert!(!ctx.is_elevated());
        assert!(ctx.elapsed() < Duration::from_secs(60));
    }
}
