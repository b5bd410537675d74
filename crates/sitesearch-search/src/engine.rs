//! Search engine client interface.
//!
//! The indexing core talks to the engine only through [`SearchEngine`].
//! [`SearchIndexer`](crate::SearchIndexer) is the Tantivy implementation.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::error::SearchError;

/// A document record ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    /// Content identity; stable even if the reference string changes
    pub id: String,
    pub reference: String,
    pub site_id: String,
    pub container: String,
    pub doc_type: String,
    pub tool: String,
    pub title: String,
    pub url: String,
    /// Normalized property name to its set of values
    pub properties: BTreeMap<String, BTreeSet<String>>,
    pub contents: String,
    /// As-of time of the task that built this record
    pub date_stamp: DateTime<Utc>,
}

/// Selects records whose `date_stamp` is strictly before `older_than`,
/// optionally narrowed to one identity or one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleFilter {
    pub id: Option<String>,
    pub site_id: Option<String>,
    pub older_than: DateTime<Utc>,
}

impl StaleFilter {
    pub fn all(older_than: DateTime<Utc>) -> Self {
        Self {
            id: None,
            site_id: None,
            older_than,
        }
    }

    pub fn for_site(site_id: impl Into<String>, older_than: DateTime<Utc>) -> Self {
        Self {
            id: None,
            site_id: Some(site_id.into()),
            older_than,
        }
    }

    pub fn for_id(id: impl Into<String>, older_than: DateTime<Utc>) -> Self {
        Self {
            id: Some(id.into()),
            site_id: None,
            older_than,
        }
    }

    /// Whether a record with these attributes is selected.
    pub fn matches(&self, id: &str, site_id: &str, date_stamp: DateTime<Utc>) -> bool {
        date_stamp < self.older_than
            && self.id.as_deref().is_none_or(|want| want == id)
            && self.site_id.as_deref().is_none_or(|want| want == site_id)
    }
}

/// A query result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub reference: String,
    pub site_id: String,
    pub title: String,
    pub score: f32,
}

/// Operations the indexing core needs from a search engine.
///
/// Implementations are shared across worker threads.
pub trait SearchEngine: Send + Sync {
    /// Write a record, replacing any record with the same id.
    ///
    /// Returns `false` without writing when a record with the same id and an
    /// equal or newer `date_stamp` already exists (committed or pending).
    fn add_document(&self, doc: &IndexDocument) -> Result<bool, SearchError>;

    /// Delete every record selected by the filter.
    fn delete_stale(&self, filter: &StaleFilter) -> Result<(), SearchError>;

    /// `date_stamp` of the record with this id, if any.
    fn date_stamp(&self, id: &str) -> Result<Option<DateTime<Utc>>, SearchError>;

    /// References of every record currently indexed for a site.
    fn site_references(&self, site_id: &str) -> Result<Vec<String>, SearchError>;

    /// Make pending changes durable and visible.
    fn commit(&self) -> Result<(), SearchError>;

    /// Merge segments.
    fn optimize(&self) -> Result<(), SearchError>;

    /// Full-text query over titles and contents.
    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError>;

    /// Number of committed records.
    fn num_docs(&self) -> Result<u64, SearchError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_stale_filter_is_strict() {
        let filter = StaleFilter::all(at(100));
        assert!(filter.matches("a", "s", at(99)));
        assert!(!filter.matches("a", "s", at(100)));
        assert!(!filter.matches("a", "s", at(101)));
    }

    #[test]
    fn test_stale_filter_scopes() {
        let by_site = StaleFilter::for_site("siteA", at(100));
        assert!(by_site.matches("x", "siteA", at(1)));
        assert!(!by_site.matches("x", "siteB", at(1)));

        let by_id = StaleFilter::for_id("doc1", at(100));
        assert!(by_id.matches("doc1", "any", at(1)));
        assert!(!by_id.matches("doc2", "any", at(1)));
    }
}
