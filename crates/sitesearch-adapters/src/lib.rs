//! # sitesearch-adapters
//!
//! Concrete collaborators for running sitesearch against a plain directory
//! tree.
//!
//! - [`FsContentSource`]: documents under `<root>/<site>/...`
//! - [`FsSiteDirectory`]: one site per top-level directory
//! - [`PlainTextExtractor`]: text-like binary content
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sitesearch_adapters::{FsContentSource, CONTENT_PREFIX};
//! use sitesearch_indexing::ContentRegistry;
//!
//! let registry = ContentRegistry::new()
//!     .with_source(CONTENT_PREFIX, Arc::new(FsContentSource::new("/srv/content")));
//! ```

pub mod fs_sites;
pub mod fs_source;
pub mod plain_text;

pub use fs_sites::FsSiteDirectory;
pub use fs_source::{content_type, FsContentSource, CONTENT_PREFIX};
pub use plain_text::PlainTextExtractor;
