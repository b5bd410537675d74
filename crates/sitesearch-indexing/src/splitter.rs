//! Task Splitter.
//!
//! Expands whole-site and whole-collection tasks into per-document (or
//! per-site) tasks plus one trailing purge, all carrying the parent's
//! creation date, and resubmits them. Every other task passes through to the
//! next handler.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sitesearch_search::SearchEngine;
use sitesearch_types::{Task, TaskType, SITE_ID};
use tracing::{info, warn};

use crate::content::ContentRegistry;
use crate::context::TaskContext;
use crate::error::HandlingError;
use crate::failure::{TaskFailure, TaskResult};
use crate::handler::{TaskHandler, TaskSubmitter};
use crate::sites::{SiteDirectory, SitePolicy};

pub struct TaskSplitter {
    registry: Arc<ContentRegistry>,
    engine: Arc<dyn SearchEngine>,
    sites: Arc<dyn SiteDirectory>,
    policy: SitePolicy,
    submitter: Arc<dyn TaskSubmitter>,
    next: Arc<dyn TaskHandler>,
}

impl TaskSplitter {
    pub fn new(
        registry: Arc<ContentRegistry>,
        engine: Arc<dyn SearchEngine>,
        sites: Arc<dyn SiteDirectory>,
        policy: SitePolicy,
        submitter: Arc<dyn TaskSubmitter>,
        next: Arc<dyn TaskHandler>,
    ) -> Self {
        Self {
            registry,
            engine,
            sites,
            policy,
            submitter,
            next,
        }
    }

    /// INDEX_SITE: one INDEX_DOCUMENT per current content reference.
    fn split_index_site(&self, task: &Task, site_id: &str) -> TaskResult {
        let as_of = task.creation_date();
        let mut failures = Vec::new();
        let mut emitted = 0usize;

        for source in self.registry.sources() {
            let references = source
                .site_references(site_id)
                .map_err(|err| TaskFailure::Fatal(err.into()))?;
            for item in references {
                match item {
                    Ok(reference) => {
                        self.submitter.submit(Task::index_document(reference, as_of));
                        emitted += 1;
                    }
                    Err(err) => {
                        warn!(task = %task, source = source.name(), error = %err, "Skipping unreadable site item");
                        failures.push(TaskFailure::Fatal(HandlingError::Content(err)));
                    }
                }
            }
        }

        self.submitter.submit(Task::purge_site_documents(site_id, as_of));
        info!(task = %task, emitted, failed = failures.len(), "Split site into document tasks");
        TaskFailure::result_of(failures)
    }

    /// REFRESH_SITE: one INDEX_DOCUMENT per record already in the index.
    fn split_refresh_site(&self, task: &Task, site_id: &str) -> TaskResult {
        let as_of = task.creation_date();
        let references = self
            .engine
            .site_references(site_id)
            .map_err(|err| TaskFailure::Fatal(err.into()))?;

        let emitted = references.len();
        for reference in references {
            self.submitter.submit(Task::index_document(reference, as_of));
        }

        self.submitter.submit(Task::purge_site_documents(site_id, as_of));
        info!(task = %task, emitted, "Split site refresh into document tasks");
        Ok(())
    }

    /// INDEX_ALL / REFRESH_ALL: one site task per indexable site.
    fn split_all<F>(&self, task: &Task, per_site: F) -> TaskResult
    where
        F: Fn(String, DateTime<Utc>) -> Task,
    {
        let as_of = task.creation_date();
        let site_ids = self
            .policy
            .indexable_sites(self.sites.as_ref())
            .map_err(|err| TaskFailure::Fatal(err.into()))?;

        let emitted = site_ids.len();
        for site_id in site_ids {
            self.submitter.submit(per_site(site_id, as_of));
        }

        self.submitter.submit(Task::purge_all_documents(as_of));
        info!(task = %task, emitted, "Split collection into site tasks");
        Ok(())
    }
}

impl TaskHandler for TaskSplitter {
    fn handle(&self, task: &Task, ctx: &TaskContext) -> TaskResult {
        match task.task_type() {
            TaskType::IndexSite => self.split_index_site(task, task.require(SITE_ID)?),
            TaskType::RefreshSite => self.split_refresh_site(task, task.require(SITE_ID)?),
            TaskType::IndexAll => self.split_all(task, |site_id, as_of| Task::index_site(site_id, as_of)),
            TaskType::RefreshAll => {
                self.split_all(task, |site_id, as_of| Task::refresh_site(site_id, as_of))
            }
            _ => self.next.handle(task, ctx),
        }
    }
}
