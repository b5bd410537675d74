//! # sitesearch-search
//!
//! Search engine client for sitesearch, backed by an embedded Tantivy index.
//!
//! ## Features
//! - [`SearchEngine`] trait: the only surface the indexing core depends on
//! - One record per content identity, replaced on reindex
//! - Anti-regression: a record is never overwritten by an older one
//! - Staleness-filtered deletes by identity, site, or whole index
//! - BM25 queries over titles and contents

pub mod document;
pub mod engine;
pub mod error;
pub mod index;
pub mod indexer;
pub mod schema;
pub mod searcher;

pub use document::record_to_doc;
pub use engine::{IndexDocument, SearchEngine, SearchHit, StaleFilter};
pub use error::SearchError;
pub use index::{SearchIndex, SearchIndexConfig};
pub use indexer::SearchIndexer;
pub use schema::{build_record_schema, SearchSchema};
pub use searcher::RecordSearcher;
