//! Tantivy implementation of [`SearchEngine`].
//!
//! The writer is shared behind a mutex. Records written since the last
//! commit are tracked in a pending map so that freshness checks see them
//! before they become visible to the reader.

use std::collections::HashMap;
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tantivy::query::{BooleanQuery, Occur, Query, RangeQuery, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{Index, IndexWriter, Term};
use tracing::{debug, info};

use crate::document::{millis_to_datetime, record_to_doc};
use crate::engine::{IndexDocument, SearchEngine, SearchHit, StaleFilter};
use crate::error::SearchError;
use crate::index::SearchIndex;
use crate::schema::SearchSchema;
use crate::searcher::RecordSearcher;

/// Uncommitted state of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pending {
    Written { date_stamp_ms: i64, site_id: String },
    Deleted,
}

struct WriterState {
    writer: IndexWriter,
    pending: HashMap<String, Pending>,
}

/// Manages document indexing operations.
pub struct SearchIndexer {
    index: Index,
    schema: SearchSchema,
    state: Mutex<WriterState>,
    searcher: RecordSearcher,
}

impl SearchIndexer {
    /// Create a new indexer from a SearchIndex.
    ///
    /// Takes the index writer lock for the lifetime of the indexer.
    pub fn new(index: &SearchIndex) -> Result<Self, SearchError> {
        let writer = index.writer()?;

        Ok(Self {
            index: index.index().clone(),
            schema: index.schema().clone(),
            state: Mutex::new(WriterState {
                writer,
                pending: HashMap::new(),
            }),
            searcher: RecordSearcher::new(index)?,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, WriterState>, SearchError> {
        self.state
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))
    }

    /// Stamp of a record as seen by the writer: pending first, then committed.
    fn current_stamp_ms(&self, state: &WriterState, id: &str) -> Result<Option<i64>, SearchError> {
        match state.pending.get(id) {
            Some(Pending::Written { date_stamp_ms, .. }) => Ok(Some(*date_stamp_ms)),
            Some(Pending::Deleted) => Ok(None),
            None => Ok(self
                .searcher
                .date_stamp(id)?
                .map(|stamp| stamp.timestamp_millis())),
        }
    }

    fn stale_query(&self, filter: &StaleFilter) -> Box<dyn Query> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        if let Some(id) = &filter.id {
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.schema.id, id),
                    IndexRecordOption::Basic,
                )),
            ));
        }
        if let Some(site_id) = &filter.site_id {
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.schema.site_id, site_id),
                    IndexRecordOption::Basic,
                )),
            ));
        }
        clauses.push((
            Occur::Must,
            Box::new(RangeQuery::new(
                Bound::Unbounded,
                Bound::Excluded(Term::from_field_i64(
                    self.schema.date_stamp,
                    filter.older_than.timestamp_millis(),
                )),
            )),
        ));

        Box::new(BooleanQuery::new(clauses))
    }

    /// Get the number of records written or deleted since the last commit.
    pub fn pending_ops(&self) -> Result<usize, SearchError> {
        Ok(self.lock()?.pending.len())
    }

    /// Access the read side.
    pub fn searcher(&self) -> &RecordSearcher {
        &self.searcher
    }
}

impl SearchEngine for SearchIndexer {
    fn add_document(&self, doc: &IndexDocument) -> Result<bool, SearchError> {
        let new_ms = doc.date_stamp.timestamp_millis();
        let mut state = self.lock()?;

        if let Some(existing_ms) = self.current_stamp_ms(&state, &doc.id)? {
            if existing_ms >= new_ms {
                debug!(
                    id = %doc.id,
                    existing_ms,
                    new_ms,
                    "Skipping write, index already has a record at least as new"
                );
                return Ok(false);
            }
        }

        state
            .writer
            .delete_term(Term::from_field_text(self.schema.id, &doc.id));
        state.writer.add_document(record_to_doc(&self.schema, doc))?;
        state.pending.insert(
            doc.id.clone(),
            Pending::Written {
                date_stamp_ms: new_ms,
                site_id: doc.site_id.clone(),
            },
        );

        debug!(id = %doc.id, reference = %doc.reference, "Indexed record");
        Ok(true)
    }

    fn delete_stale(&self, filter: &StaleFilter) -> Result<(), SearchError> {
        let query = self.stale_query(filter);
        let mut state = self.lock()?;

        state.writer.delete_query(query)?;

        let older_ms = filter.older_than.timestamp_millis();
        for (id, pending) in state.pending.iter_mut() {
            if let Pending::Written {
                date_stamp_ms,
                site_id,
            } = pending
            {
                let selected = millis_to_datetime(*date_stamp_ms)
                    .is_some_and(|stamp| filter.matches(id, site_id, stamp));
                if selected {
                    *pending = Pending::Deleted;
                }
            }
        }

        // A single-record delete of a committed record must also hide it
        // from freshness checks until the next commit.
        if let Some(id) = &filter.id {
            if !state.pending.contains_key(id) {
                if let Some(stamp) = self.searcher.date_stamp(id)? {
                    if stamp.timestamp_millis() < older_ms {
                        state.pending.insert(id.clone(), Pending::Deleted);
                    }
                }
            }
        }

        debug!(
            id = ?filter.id,
            site_id = ?filter.site_id,
            older_than = %filter.older_than,
            "Deleted stale records"
        );
        Ok(())
    }

    fn date_stamp(&self, id: &str) -> Result<Option<DateTime<Utc>>, SearchError> {
        let state = self.lock()?;
        Ok(self
            .current_stamp_ms(&state, id)?
            .and_then(millis_to_datetime))
    }

    fn site_references(&self, site_id: &str) -> Result<Vec<String>, SearchError> {
        self.searcher.site_references(site_id)
    }

    fn commit(&self) -> Result<(), SearchError> {
        let mut state = self.lock()?;

        let opstamp = state.writer.commit()?;
        let committed = state.pending.len();
        state.pending.clear();
        self.searcher.reload()?;

        info!(opstamp, committed, "Committed index changes");
        Ok(())
    }

    fn optimize(&self) -> Result<(), SearchError> {
        let mut state = self.lock()?;

        let segment_ids = self.index.searchable_segment_ids()?;
        if segment_ids.len() < 2 {
            debug!(segments = segment_ids.len(), "Nothing to merge");
            return Ok(());
        }

        state.writer.merge(&segment_ids).wait()?;
        self.searcher.reload()?;

        info!(merged = segment_ids.len(), "Merged index segments");
        Ok(())
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        self.searcher.search(query, limit)
    }

    fn num_docs(&self) -> Result<u64, SearchError> {
        Ok(self.searcher.num_docs())
    }
}
