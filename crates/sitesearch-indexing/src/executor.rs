//! Leaf task executor.
//!
//! Performs index/remove/purge against the search engine, reading content
//! through the registry and the extraction service. Every write ends with a
//! commit. Leaf errors are classified here: connectivity and I/O failures
//! become retryable with the same task, everything else is non-retryable.
//!
//! The composite operations run inline when no splitter sits in front of the
//! executor.

use std::io::Read;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sitesearch_search::{IndexDocument, SearchEngine, StaleFilter};
use sitesearch_types::Task;
use tracing::{debug, error, info, warn};

use crate::content::{ContentRegistry, ContentSource, DocumentContent};
use crate::context::TaskContext;
use crate::dispatcher::IndexingOperations;
use crate::error::{ContentError, HandlingError};
use crate::extractor::Extractor;
use crate::failure::{TaskFailure, TaskResult};
use crate::properties::{self, PropertySets};
use crate::sites::{SiteDirectory, SitePolicy};

/// Classify a leaf error for `task`.
fn classify(task: &Task, err: impl Into<HandlingError>) -> TaskFailure {
    let err = err.into();
    if err.is_transient() {
        warn!(task = %task, error = %err, "Temporary failure");
        TaskFailure::retry(task.clone(), err)
    } else {
        TaskFailure::Fatal(err)
    }
}

/// Replace a retryable member with a retry of the whole composite task,
/// keeping any non-retryable members.
fn retry_whole(composite: &Task, failure: TaskFailure) -> TaskFailure {
    let retry = TaskFailure::retry(composite.clone(), format!("member failed: {}", failure));
    match failure.into_fatal() {
        Some(fatal) => fatal.merge(retry),
        None => retry,
    }
}

/// Executes leaf operations against a search engine.
pub struct IndexExecutor {
    registry: Arc<ContentRegistry>,
    engine: Arc<dyn SearchEngine>,
    extractor: Arc<dyn Extractor>,
    sites: Arc<dyn SiteDirectory>,
    policy: SitePolicy,
}

impl IndexExecutor {
    pub fn new(
        registry: Arc<ContentRegistry>,
        engine: Arc<dyn SearchEngine>,
        extractor: Arc<dyn Extractor>,
        sites: Arc<dyn SiteDirectory>,
        policy: SitePolicy,
    ) -> Self {
        Self {
            registry,
            engine,
            extractor,
            sites,
            policy,
        }
    }

    pub fn engine(&self) -> &Arc<dyn SearchEngine> {
        &self.engine
    }

    /// Merge index segments.
    ///
    /// Not a task type; callers decide whether to retry on a transient error.
    pub fn optimize(&self) -> Result<(), HandlingError> {
        match self.engine.optimize() {
            Ok(()) => {
                info!("Index optimized");
                Ok(())
            }
            Err(err) => {
                if err.is_transient() {
                    warn!(error = %err, "Optimize failed temporarily");
                } else {
                    error!(error = %err, "Optimize failed");
                }
                Err(err.into())
            }
        }
    }

    fn commit(&self, task: &Task) -> TaskResult {
        self.engine.commit().map_err(|err| {
            warn!(task = %task, error = %err, "Commit failed, will retry");
            TaskFailure::retry(task.clone(), err)
        })
    }

    /// Delete the record for `identity` if it predates `as_of`, then commit.
    fn remove_identity(&self, task: &Task, identity: &str, as_of: DateTime<Utc>) -> TaskResult {
        self.engine
            .delete_stale(&StaleFilter::for_id(identity, as_of))
            .map_err(|err| classify(task, err))?;
        self.commit(task)?;
        debug!(task = %task, identity, "Removed document");
        Ok(())
    }

    fn build_record(
        &self,
        source: &dyn ContentSource,
        reference: &str,
        identity: String,
        as_of: DateTime<Utc>,
    ) -> Result<IndexDocument, HandlingError> {
        let metadata = source.metadata(reference)?;

        let mut properties = PropertySets::new();
        properties::flatten_into(reference, &metadata.custom_properties, &mut properties);

        let contents = match source.content(reference)? {
            DocumentContent::Text(text) => text,
            DocumentContent::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).map_err(ContentError::from)?;
                String::from_utf8_lossy(&buf).into_owned()
            }
            DocumentContent::Binary {
                mut stream,
                content_type,
            } => {
                let extracted = self
                    .extractor
                    .extract(stream.as_mut(), reference, &content_type)?;
                properties::merge_pairs(&extracted.metadata, &mut properties);
                extracted.text
            }
        };

        Ok(IndexDocument {
            id: identity,
            reference: reference.to_string(),
            site_id: metadata.site_id,
            container: metadata.container,
            doc_type: metadata.doc_type,
            tool: metadata.tool,
            title: metadata.title,
            url: metadata.url,
            properties,
            contents,
            date_stamp: as_of,
        })
    }

    /// Index each reference; stop at the first retryable failure and ask for
    /// the whole composite to be retried.
    fn index_references<I>(
        &self,
        composite: &Task,
        references: I,
        as_of: DateTime<Utc>,
        ctx: &TaskContext,
    ) -> TaskResult
    where
        I: IntoIterator<Item = Result<String, ContentError>>,
    {
        let mut failures = Vec::new();
        let mut indexed = 0usize;

        for item in references {
            match item {
                Ok(reference) => match self.index_document(&reference, as_of, ctx) {
                    Ok(()) => indexed += 1,
                    Err(failure) if failure.has_retryable() => {
                        failures.push(retry_whole(composite, failure));
                        return TaskFailure::result_of(failures);
                    }
                    Err(failure) => failures.push(failure),
                },
                Err(err) => failures.push(TaskFailure::Fatal(err.into())),
            }
        }

        debug!(task = %composite, indexed, failed = failures.len(), "Indexed references");
        TaskFailure::result_of(failures)
    }

    /// Run `step` for each site; stop at the first retryable failure.
    fn for_each_site<F>(&self, composite: &Task, mut step: F) -> Result<Vec<TaskFailure>, TaskFailure>
    where
        F: FnMut(&str) -> TaskResult,
    {
        let site_ids = self
            .policy
            .indexable_sites(self.sites.as_ref())
            .map_err(|err| TaskFailure::Fatal(err.into()))?;

        let mut failures = Vec::new();
        for site_id in &site_ids {
            match step(site_id) {
                Ok(()) => {}
                Err(failure) if failure.has_retryable() => {
                    failures.push(retry_whole(composite, failure));
                    return Err(TaskFailure::Aggregate(failures));
                }
                Err(failure) => failures.push(failure),
            }
        }
        Ok(failures)
    }

    /// Run the trailing purge of a composite, escalating a retry to the composite.
    fn trailing_purge(&self, composite: &Task, purge: TaskResult, failures: &mut Vec<TaskFailure>) {
        if let Err(failure) = purge {
            if failure.has_retryable() {
                failures.push(retry_whole(composite, failure));
            } else {
                failures.push(failure);
            }
        }
    }
}

impl IndexingOperations for IndexExecutor {
    fn index_document(
        &self,
        reference: &str,
        as_of: DateTime<Utc>,
        ctx: &TaskContext,
    ) -> TaskResult {
        let task = Task::index_document(reference, as_of);
        let source = self
            .registry
            .find(reference)
            .ok_or_else(|| HandlingError::NoContentSource(reference.to_string()))?;
        let identity = source.identity(reference);

        if !source.is_for_index(reference) {
            debug!(reference, "Content is not for index, removing older record");
            return self.remove_identity(&task, &identity, as_of);
        }

        let existing = self
            .engine
            .date_stamp(&identity)
            .map_err(|err| classify(&task, err))?;
        if let Some(stamp) = existing {
            if stamp >= as_of {
                debug!(reference, %stamp, %as_of, "Index is up to date, skipping");
                return Ok(());
            }
        }

        if !source.can_read(reference, ctx) {
            debug!(reference, context = %ctx.id(), elevated = ctx.is_elevated(), "Content not readable");
            return Err(HandlingError::Content(ContentError::Unreadable(reference.to_string())).into());
        }

        let record = self
            .build_record(source.as_ref(), reference, identity, as_of)
            .map_err(|err| classify(&task, err))?;
        let written = self
            .engine
            .add_document(&record)
            .map_err(|err| classify(&task, err))?;
        if !written {
            debug!(reference, "A newer record was written concurrently, skipping");
            return Ok(());
        }

        self.commit(&task)?;
        debug!(reference, identity = %record.id, "Indexed document");
        Ok(())
    }

    fn remove_document(
        &self,
        reference: &str,
        as_of: DateTime<Utc>,
        _ctx: &TaskContext,
    ) -> TaskResult {
        let task = Task::remove_document(reference, as_of);
        let source = self
            .registry
            .find(reference)
            .ok_or_else(|| HandlingError::NoContentSource(reference.to_string()))?;
        self.remove_identity(&task, &source.identity(reference), as_of)
    }

    fn index_site(&self, site_id: &str, as_of: DateTime<Utc>, ctx: &TaskContext) -> TaskResult {
        let task = Task::index_site(site_id, as_of);
        let mut failures = Vec::new();

        for source in self.registry.sources() {
            let references = source
                .site_references(site_id)
                .map_err(|err| TaskFailure::Fatal(err.into()))?;
            if let Err(failure) = self.index_references(&task, references, as_of, ctx) {
                let stop = failure.has_retryable();
                failures.push(failure);
                if stop {
                    return TaskFailure::result_of(failures);
                }
            }
        }

        let purge = self.purge_site_documents(site_id, as_of, ctx);
        self.trailing_purge(&task, purge, &mut failures);
        info!(task = %task, failures = failures.len(), "Indexed site inline");
        TaskFailure::result_of(failures)
    }

    fn refresh_site(&self, site_id: &str, as_of: DateTime<Utc>, ctx: &TaskContext) -> TaskResult {
        let task = Task::refresh_site(site_id, as_of);
        let references = self
            .engine
            .site_references(site_id)
            .map_err(|err| TaskFailure::Fatal(err.into()))?;

        let mut failures = Vec::new();
        let references = references.into_iter().map(Ok);
        if let Err(failure) = self.index_references(&task, references, as_of, ctx) {
            if failure.has_retryable() {
                return Err(failure);
            }
            failures.push(failure);
        }

        let purge = self.purge_site_documents(site_id, as_of, ctx);
        self.trailing_purge(&task, purge, &mut failures);
        info!(task = %task, failures = failures.len(), "Refreshed site inline");
        TaskFailure::result_of(failures)
    }

    fn index_all(&self, as_of: DateTime<Utc>, ctx: &TaskContext) -> TaskResult {
        let task = Task::index_all(as_of);
        let mut failures =
            self.for_each_site(&task, |site_id| self.index_site(site_id, as_of, ctx))?;

        let purge = self.purge_all_documents(as_of, ctx);
        self.trailing_purge(&task, purge, &mut failures);
        TaskFailure::result_of(failures)
    }

    fn refresh_all(&self, as_of: DateTime<Utc>, ctx: &TaskContext) -> TaskResult {
        let task = Task::refresh_all(as_of);
        let mut failures =
            self.for_each_site(&task, |site_id| self.refresh_site(site_id, as_of, ctx))?;

        let purge = self.purge_all_documents(as_of, ctx);
        self.trailing_purge(&task, purge, &mut failures);
        TaskFailure::result_of(failures)
    }

    fn purge_site_documents(
        &self,
        site_id: &str,
        as_of: DateTime<Utc>,
        _ctx: &TaskContext,
    ) -> TaskResult {
        let task = Task::purge_site_documents(site_id, as_of);
        self.engine
            .delete_stale(&StaleFilter::for_site(site_id, as_of))
            .map_err(|err| classify(&task, err))?;
        self.commit(&task)?;
        info!(site_id, %as_of, "Purged stale site documents");
        Ok(())
    }

    fn purge_all_documents(&self, as_of: DateTime<Utc>, _ctx: &TaskContext) -> TaskResult {
        let task = Task::purge_all_documents(as_of);
        self.engine
            .delete_stale(&StaleFilter::all(as_of))
            .map_err(|err| classify(&task, err))?;
        self.commit(&task)?;
        info!(%as_of, "Purged stale documents");
        Ok(())
    }
}
