//! Task runtime for the sitesearch indexing system.
//!
//! This crate keeps a search index in eventual consistency with a content
//! repository by scheduling, retrying and fanning out indexing tasks.
//!
//! ## Key Components
//!
//! - [`IndexTrigger`]: turns content events and admin requests into tasks
//! - [`TaskQueue`]: local indexing/splitting pools behind [`TaskSubmitter`]
//! - [`TaskSplitter`]: expands whole-site and whole-collection tasks
//! - [`TaskRunner`]: applies the shared [`Backoff`] around each task
//! - [`Dispatcher`]: routes a task to one [`IndexingOperations`] method
//! - [`IndexExecutor`]: leaf operations against a [`SearchEngine`](sitesearch_search::SearchEngine)
//!
//! ## Architecture
//!
//! 1. A trigger creates a task stamped with the current time
//! 2. The submitter routes it to a pool (or a broker queue)
//! 3. The runner waits out any freeze, then hands it to the handler chain
//! 4. The splitter resubmits coarse tasks as finer ones plus a trailing purge
//! 5. The dispatcher invokes the executor, whose writes never regress a
//!    record to an older `date_stamp`
//! 6. A retryable failure resubmits its replacement and freezes every runner

pub mod backoff;
pub mod content;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod failure;
pub mod handler;
pub mod properties;
pub mod queue;
pub mod runner;
pub mod sites;
pub mod splitter;
pub mod trigger;

#[cfg(test)]
mod test_support;

pub use backoff::{Backoff, Interrupted};
pub use content::{ContentMetadata, ContentRegistry, ContentSource, DocumentContent, SiteReferences};
pub use context::TaskContext;
pub use dispatcher::{Dispatcher, IndexingOperations};
pub use error::{ContentError, ExtractionError, HandlingError};
pub use executor::IndexExecutor;
pub use extractor::{Extracted, Extractor};
pub use failure::{TaskFailure, TaskResult};
pub use handler::{TaskHandler, TaskSubmitter};
pub use queue::{LocalSubmitter, PendingCounts, Pool, TaskQueue};
pub use runner::{RunOutcome, TaskRunner};
pub use sites::{SiteDirectory, SiteInfo, SitePolicy};
pub use splitter::TaskSplitter;
pub use trigger::{ContentEvent, IndexTrigger};
