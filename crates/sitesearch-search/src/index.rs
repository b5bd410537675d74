//! The on-disk record index.
//!
//! One directory holds one Tantivy index built from the record schema. Only
//! one writer may hold a directory at a time; readers are unrestricted, so
//! queries keep working while a daemon is indexing.

use std::fs;
use std::path::{Path, PathBuf};

use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyError};
use tracing::{debug, info};

use crate::error::SearchError;
use crate::schema::{build_record_schema, SearchSchema};

const META_FILE: &str = "meta.json";

const DEFAULT_WRITER_MEMORY_MB: usize = 50;

/// Smallest budget Tantivy accepts for one indexing thread
const MIN_WRITER_MEMORY_MB: usize = 15;

/// Where the record index lives and how much memory its writer may use.
#[derive(Debug, Clone)]
pub struct SearchIndexConfig {
    pub path: PathBuf,
    pub writer_memory_mb: usize,
}

impl SearchIndexConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
        }
    }

    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.writer_memory_mb = mb;
        self
    }

    fn writer_budget_bytes(&self) -> usize {
        self.writer_memory_mb.max(MIN_WRITER_MEMORY_MB) * 1024 * 1024
    }

    fn has_index(&self) -> bool {
        self.path.join(META_FILE).exists()
    }
}

/// An opened record index.
pub struct SearchIndex {
    index: Index,
    schema: SearchSchema,
    config: SearchIndexConfig,
}

impl SearchIndex {
    /// Open the record index at `config.path`, creating it when the
    /// directory holds none.
    ///
    /// An index built with a schema lacking any record field is refused.
    pub fn open_or_create(config: SearchIndexConfig) -> Result<Self, SearchError> {
        let index = if config.has_index() {
            Index::open_in_dir(&config.path)?
        } else {
            info!(path = %config.path.display(), "Creating record index");
            fs::create_dir_all(&config.path)?;
            Index::create_in_dir(&config.path, build_record_schema().schema().clone())?
        };
        Self::checked(index, config)
    }

    /// Open an index that must already exist. Used by read-only callers,
    /// which must not leave an empty index behind.
    pub fn open_existing(path: impl Into<PathBuf>) -> Result<Self, SearchError> {
        let config = SearchIndexConfig::new(path);
        if !config.has_index() {
            return Err(SearchError::Missing(config.path.display().to_string()));
        }
        let index = Index::open_in_dir(&config.path)?;
        Self::checked(index, config)
    }

    fn checked(index: Index, config: SearchIndexConfig) -> Result<Self, SearchError> {
        let schema = SearchSchema::from_schema(index.schema()).map_err(|err| match err {
            SearchError::SchemaMismatch(msg) => {
                SearchError::SchemaMismatch(format!("{}: {}", config.path.display(), msg))
            }
            other => other,
        })?;
        debug!(path = %config.path.display(), "Opened record index");
        Ok(Self {
            index,
            schema,
            config,
        })
    }

    pub fn schema(&self) -> &SearchSchema {
        &self.schema
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Take the directory's writer lock.
    ///
    /// A lock already held, by this process or another, is reported as
    /// [`SearchError::IndexLocked`], which is transient.
    pub fn writer(&self) -> Result<IndexWriter, SearchError> {
        let budget = self.config.writer_budget_bytes();
        let writer = self.index.writer(budget).map_err(|err| match err {
            TantivyError::LockFailure(..) => SearchError::IndexLocked(format!(
                "{} is held by another writer",
                self.config.path.display()
            )),
            other => other.into(),
        })?;
        debug!(
            path = %self.config.path.display(),
            budget_mb = budget >> 20,
            "Acquired index writer"
        );
        Ok(writer)
    }

    /// Reader that reloads only when told to; the indexer reloads it right
    /// after each commit so staleness checks see their own writes.
    pub fn reader(&self) -> Result<IndexReader, SearchError> {
        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::schema::{Schema, TEXT};
    use tempfile::TempDir;

    #[test]
    fn test_creates_then_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("records");

        let created = SearchIndex::open_or_create(SearchIndexConfig::new(&path)).unwrap();
        assert!(path.join(META_FILE).exists());
        drop(created);

        let reopened = SearchIndex::open_or_create(SearchIndexConfig::new(&path)).unwrap();
        assert_eq!(reopened.path(), path.as_path());
        assert!(reopened.index().schema().get_field("date_stamp").is_ok());
    }

    #[test]
    fn test_open_existing_leaves_empty_dir_alone() {
        let temp_dir = TempDir::new().unwrap();

        let err = SearchIndex::open_existing(temp_dir.path()).err().unwrap();
        assert!(matches!(err, SearchError::Missing(_)));
        assert!(!err.is_transient());
        assert!(!temp_dir.path().join(META_FILE).exists());

        SearchIndex::open_or_create(SearchIndexConfig::new(temp_dir.path())).unwrap();
        assert!(SearchIndex::open_existing(temp_dir.path()).is_ok());
    }

    #[test]
    fn test_foreign_schema_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let mut builder = Schema::builder();
        builder.add_text_field("body", TEXT);
        Index::create_in_dir(temp_dir.path(), builder.build()).unwrap();

        let err = SearchIndex::open_or_create(SearchIndexConfig::new(temp_dir.path()))
            .err()
            .unwrap();
        match err {
            SearchError::SchemaMismatch(msg) => assert!(msg.contains("missing id field"), "{msg}"),
            other => panic!("expected schema mismatch, got {other}"),
        }
    }

    #[test]
    fn test_second_writer_is_locked() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open_or_create(SearchIndexConfig::new(temp_dir.path())).unwrap();
        let _writer = index.writer().unwrap();
        let _reader = index.reader().unwrap();

        let err = index.writer().err().unwrap();
        assert!(matches!(err, SearchError::IndexLocked(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_writer_budget_floor() {
        let tiny = SearchIndexConfig::new("/tmp/records").with_memory_mb(1);
        assert_eq!(tiny.writer_budget_bytes(), MIN_WRITER_MEMORY_MB * 1024 * 1024);
        let roomy = SearchIndexConfig::new("/tmp/records").with_memory_mb(100);
        assert_eq!(roomy.writer_budget_bytes(), 100 * 1024 * 1024);
    }
}
