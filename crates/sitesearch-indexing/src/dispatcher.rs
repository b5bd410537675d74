//! Task Dispatcher: routes a task to exactly one indexing operation.

use chrono::{DateTime, Utc};
use sitesearch_types::{Task, TaskType, REFERENCE, SITE_ID};
use tracing::debug;

use crate::context::TaskContext;
use crate::failure::TaskResult;
use crate::handler::TaskHandler;

/// The operations a task can invoke. `as_of` is the task's creation date;
/// `ctx` carries the privileges content reads run under.
pub trait IndexingOperations: Send + Sync {
    fn index_document(
        &self,
        reference: &str,
        as_of: DateTime<Utc>,
        ctx: &TaskContext,
    ) -> TaskResult;

    fn remove_document(
        &self,
        reference: &str,
        as_of: DateTime<Utc>,
        ctx: &TaskContext,
    ) -> TaskResult;

    fn index_site(&self, site_id: &str, as_of: DateTime<Utc>, ctx: &TaskContext) -> TaskResult;

    fn refresh_site(&self, site_id: &str, as_of: DateTime<Utc>, ctx: &TaskContext) -> TaskResult;

    fn index_all(&self, as_of: DateTime<Utc>, ctx: &TaskContext) -> TaskResult;

    fn refresh_all(&self, as_of: DateTime<Utc>, ctx: &TaskContext) -> TaskResult;

    fn purge_site_documents(
        &self,
        site_id: &str,
        as_of: DateTime<Utc>,
        ctx: &TaskContext,
    ) -> TaskResult;

    fn purge_all_documents(&self, as_of: DateTime<Utc>, ctx: &TaskContext) -> TaskResult;
}

/// Extracts required properties and invokes the matching operation.
///
/// A missing property is a non-retryable failure naming the task.
pub struct Dispatcher<O> {
    operations: O,
}

impl<O: IndexingOperations> Dispatcher<O> {
    pub fn new(operations: O) -> Self {
        Self { operations }
    }

    pub fn operations(&self) -> &O {
        &self.operations
    }
}

impl<O: IndexingOperations> TaskHandler for Dispatcher<O> {
    fn handle(&self, task: &Task, ctx: &TaskContext) -> TaskResult {
        let as_of = task.creation_date();
        debug!(context = %ctx.id(), task = %task, "Dispatching task");

        match task.task_type() {
            TaskType::IndexDocument => self
                .operations
                .index_document(task.require(REFERENCE)?, as_of, ctx),
            TaskType::RemoveDocument => self
                .operations
                .remove_document(task.require(REFERENCE)?, as_of, ctx),
            TaskType::IndexSite => self.operations.index_site(task.require(SITE_ID)?, as_of, ctx),
            TaskType::RefreshSite => self
                .operations
                .refresh_site(task.require(SITE_ID)?, as_of, ctx),
            TaskType::IndexAll => self.operations.index_all(as_of, ctx),
            TaskType::RefreshAll => self.operations.refresh_all(as_of, ctx),
            TaskType::PurgeSiteDocuments => self
                .operations
                .purge_site_documents(task.require(SITE_ID)?, as_of, ctx),
            TaskType::PurgeAllDocuments => self.operations.purge_all_documents(as_of, ctx),
        }
    }
}
