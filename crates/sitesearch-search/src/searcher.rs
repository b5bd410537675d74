//! Read side of the index: record lookups and BM25 queries.
//!
//! [`RecordSearcher`] only needs a reader, so it works against an index
//! whose writer is held by another process.

use chrono::{DateTime, Utc};
use tantivy::collector::{DocSetCollector, TopDocs};
use tantivy::query::{QueryParser, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{IndexReader, TantivyDocument, Term};
use tracing::{debug, info};

use crate::document::{stored_date_stamp, stored_text};
use crate::engine::SearchHit;
use crate::error::SearchError;
use crate::index::SearchIndex;
use crate::schema::SearchSchema;

/// Searcher over committed records.
pub struct RecordSearcher {
    reader: IndexReader,
    schema: SearchSchema,
    query_parser: QueryParser,
}

impl RecordSearcher {
    /// Create a new searcher from a SearchIndex.
    pub fn new(index: &SearchIndex) -> Result<Self, SearchError> {
        let reader = index.reader()?;
        let schema = index.schema().clone();
        let query_parser =
            QueryParser::for_index(index.index(), vec![schema.title, schema.contents]);

        Ok(Self {
            reader,
            schema,
            query_parser,
        })
    }

    /// Reload the reader to see recent commits.
    pub fn reload(&self) -> Result<(), SearchError> {
        self.reader.reload()?;
        debug!("Reloaded search reader");
        Ok(())
    }

    /// `date_stamp` of the committed record with this id.
    pub fn date_stamp(&self, id: &str) -> Result<Option<DateTime<Utc>>, SearchError> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.schema.id, id),
            IndexRecordOption::Basic,
        );
        let top = searcher.search(&query, &TopDocs::with_limit(1))?;

        match top.first() {
            Some((_, address)) => {
                let doc: TantivyDocument = searcher.doc(*address)?;
                Ok(stored_date_stamp(&self.schema, &doc))
            }
            None => Ok(None),
        }
    }

    /// References of every committed record for a site, sorted.
    pub fn site_references(&self, site_id: &str) -> Result<Vec<String>, SearchError> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.schema.site_id, site_id),
            IndexRecordOption::Basic,
        );
        let addresses = searcher.search(&query, &DocSetCollector)?;

        let mut references = Vec::with_capacity(addresses.len());
        for address in addresses {
            let doc: TantivyDocument = searcher.doc(address)?;
            references.push(stored_text(&doc, self.schema.reference));
        }
        references.sort();

        debug!(site_id, count = references.len(), "Listed site references");
        Ok(references)
    }

    /// Search titles and contents with a query string.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        if query_str.trim().is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query = self.query_parser.parse_query(query_str)?;
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            results.push(SearchHit {
                id: stored_text(&doc, self.schema.id),
                reference: stored_text(&doc, self.schema.reference),
                site_id: stored_text(&doc, self.schema.site_id),
                title: stored_text(&doc, self.schema.title),
                score,
            });
        }

        info!(query = query_str, results = results.len(), "Search complete");
        Ok(results)
    }

    /// Get the number of committed records.
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{IndexDocument, SearchEngine};
    use crate::index::SearchIndexConfig;
    use crate::indexer::SearchIndexer;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn record(id: &str, site: &str, title: &str, contents: &str) -> IndexDocument {
        IndexDocument {
            id: id.to_string(),
            reference: format!("/content/{}/{}", site, id),
            site_id: site.to_string(),
            container: format!("/content/{}/", site),
            doc_type: "text/plain".to_string(),
            tool: "content".to_string(),
            title: title.to_string(),
            url: String::new(),
            properties: BTreeMap::new(),
            contents: contents.to_string(),
            date_stamp: Utc.timestamp_millis_opt(1_000).unwrap(),
        }
    }

    fn setup_index() -> (TempDir, SearchIndex) {
        let temp_dir = TempDir::new().unwrap();
        let config = SearchIndexConfig::new(temp_dir.path());
        let index = SearchIndex::open_or_create(config).unwrap();
        (temp_dir, index)
    }

    #[test]
    fn test_search_ranks_matches() {
        let (_temp_dir, index) = setup_index();
        let indexer = SearchIndexer::new(&index).unwrap();
        indexer
            .add_document(&record("a", "s1", "Budget", "quarterly budget review budget"))
            .unwrap();
        indexer
            .add_document(&record("b", "s1", "Minutes", "review of the budget"))
            .unwrap();
        indexer
            .add_document(&record("c", "s1", "Travel", "flights and hotels"))
            .unwrap();
        indexer.commit().unwrap();

        let searcher = RecordSearcher::new(&index).unwrap();
        let results = searcher.search("budget", 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn test_empty_query() {
        let (_temp_dir, index) = setup_index();
        let searcher = RecordSearcher::new(&index).unwrap();
        assert!(searcher.search("   ", 10).unwrap().is_empty());
    }

    #[test]
    fn test_site_references_and_stamp() {
        let (_temp_dir, index) = setup_index();
        let indexer = SearchIndexer::new(&index).unwrap();
        indexer.add_document(&record("b", "s1", "B", "x")).unwrap();
        indexer.add_document(&record("a", "s1", "A", "x")).unwrap();
        indexer.add_document(&record("c", "s2", "C", "x")).unwrap();
        indexer.commit().unwrap();

        let searcher = RecordSearcher::new(&index).unwrap();
        assert_eq!(
            searcher.site_references("s1").unwrap(),
            vec!["/content/s1/a", "/content/s1/b"]
        );
        assert_eq!(
            searcher.date_stamp("c").unwrap().map(|d| d.timestamp_millis()),
            Some(1_000)
        );
        assert!(searcher.date_stamp("zzz").unwrap().is_none());
        assert_eq!(searcher.num_docs(), 3);
    }

    #[test]
    fn test_reload_sees_new_commits() {
        let (_temp_dir, index) = setup_index();
        let searcher = RecordSearcher::new(&index).unwrap();
        assert_eq!(searcher.num_docs(), 0);

        let indexer = SearchIndexer::new(&index).unwrap();
        indexer.add_document(&record("a", "s1", "A", "x")).unwrap();
        indexer.commit().unwrap();

        searcher.reload().unwrap();
        assert_eq!(searcher.num_docs(), 1);
    }
}
