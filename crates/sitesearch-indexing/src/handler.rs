//! Seams between the queueing layer and task handling.

use std::sync::Arc;

use sitesearch_types::Task;

use crate::context::TaskContext;
use crate::failure::TaskResult;

/// Something that can handle a task: the splitter, a dispatcher, or a chain.
pub trait TaskHandler: Send + Sync {
    fn handle(&self, task: &Task, ctx: &TaskContext) -> TaskResult;
}

impl<H: TaskHandler + ?Sized> TaskHandler for Arc<H> {
    fn handle(&self, task: &Task, ctx: &TaskContext) -> TaskResult {
        (**self).handle(task, ctx)
    }
}

/// Queue Submission Port.
///
/// Submission never fails from the caller's point of view; implementations
/// that can lose a task (broker publish) log it.
pub trait TaskSubmitter: Send + Sync {
    fn submit(&self, task: Task);
}

impl<S: TaskSubmitter + ?Sized> TaskSubmitter for Arc<S> {
    fn submit(&self, task: Task) {
        (**self).submit(task)
    }
}
