//! End-to-end test infrastructure for sitesearch.
//!
//! Provides a shared TestHarness plus in-memory collaborators (content
//! source, site directory, recording submitter, an engine wrapper that logs
//! every operation) for tests covering the trigger-to-index pipeline.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use sitesearch_indexing::{
    ContentError, ContentMetadata, ContentRegistry, ContentSource, Dispatcher, DocumentContent,
    Extracted, ExtractionError, Extractor, IndexExecutor, SiteDirectory, SiteInfo, SitePolicy,
    SiteReferences, TaskContext, TaskSplitter, TaskSubmitter,
};
use sitesearch_search::{
    IndexDocument, SearchEngine, SearchError, SearchHit, SearchIndex, SearchIndexConfig,
    SearchIndexer, StaleFilter,
};
use sitesearch_types::Task;

/// Millisecond timestamp helper.
pub fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

/// Poll until `done` holds, failing after ten seconds.
pub fn wait_for(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        thread::sleep(Duration::from_millis(5));
    }
}

#[derive(Debug, Clone)]
pub struct StoredDoc {
    pub site_id: String,
    pub title: String,
    pub body: String,
    pub properties: BTreeMap<String, Value>,
}

/// Content source holding documents in memory. Claims every reference;
/// identity is `doc:<reference>`.
#[derive(Default)]
pub struct MemoryContent {
    docs: RwLock<BTreeMap<String, StoredDoc>>,
    unreadable: RwLock<Vec<String>>,
    restricted: RwLock<Vec<String>>,
}

impl MemoryContent {
    pub fn put(&self, site_id: &str, reference: &str, title: &str, body: &str) {
        self.docs.write().insert(
            reference.to_string(),
            StoredDoc {
                site_id: site_id.to_string(),
                title: title.to_string(),
                body: body.to_string(),
                properties: BTreeMap::new(),
            },
        );
    }

    pub fn set_property(&self, reference: &str, name: &str, value: Value) {
        if let Some(doc) = self.docs.write().get_mut(reference) {
            doc.properties.insert(name.to_string(), value);
        }
    }

    pub fn delete(&self, reference: &str) {
        self.docs.write().remove(reference);
    }

    /// Only elevated contexts may read this reference.
    pub fn restrict(&self, reference: &str) {
        self.restricted.write().push(reference.to_string());
    }

    /// Make `site_references` yield an error item for this site.
    pub fn mark_unreadable(&self, site_id: &str) {
        self.unreadable.write().push(site_id.to_string());
    }
}

impl ContentSource for MemoryContent {
    fn name(&self) -> &str {
        "memory"
    }

    fn matches(&self, _reference: &str) -> bool {
        true
    }

    fn identity(&self, reference: &str) -> String {
        format!("doc:{}", reference)
    }

    fn is_for_index(&self, reference: &str) -> bool {
        self.docs.read().contains_key(reference)
    }

    fn can_read(&self, reference: &str, ctx: &TaskContext) -> bool {
        ctx.is_elevated() || !self.restricted.read().iter().any(|r| r == reference)
    }

    fn metadata(&self, reference: &str) -> Result<ContentMetadata, ContentError> {
        let docs = self.docs.read();
        let doc = docs
            .get(reference)
            .ok_or_else(|| ContentError::NotFound(reference.to_string()))?;
        Ok(ContentMetadata {
            container: format!("/{}", doc.site_id),
            doc_type: "text/plain".to_string(),
            title: doc.title.clone(),
            tool: "memory".to_string(),
            url: format!("mem://{}", reference),
            site_id: doc.site_id.clone(),
            custom_properties: doc.properties.clone(),
        })
    }

    fn content(&self, reference: &str) -> Result<DocumentContent, ContentError> {
        self.docs
            .read()
            .get(reference)
            .map(|doc| DocumentContent::Text(doc.body.clone()))
            .ok_or_else(|| ContentError::NotFound(reference.to_string()))
    }

    fn site_references(&self, site_id: &str) -> Result<SiteReferences<'_>, ContentError> {
        let mut items: Vec<Result<String, ContentError>> = self
            .docs
            .read()
            .iter()
            .filter(|(_, doc)| doc.site_id == site_id)
            .map(|(reference, _)| Ok(reference.clone()))
            .collect();
        if self.unreadable.read().iter().any(|s| s == site_id) {
            items.push(Err(ContentError::Invalid(format!("corrupt item in {}", site_id))));
        }
        Ok(Box::new(items.into_iter()))
    }
}

/// Fixed list of sites.
#[derive(Default)]
pub struct StaticSites {
    sites: RwLock<Vec<SiteInfo>>,
}

impl StaticSites {
    pub fn add(&self, site: SiteInfo) {
        self.sites.write().push(site);
    }
}

impl SiteDirectory for StaticSites {
    fn sites(&self) -> Result<Vec<SiteInfo>, ContentError> {
        Ok(self.sites.read().clone())
    }
}

/// The memory source never produces binary content.
pub struct NoExtractor;

impl Extractor for NoExtractor {
    fn extract(
        &self,
        _stream: &mut dyn std::io::Read,
        _resource_name: &str,
        content_type: &str,
    ) -> Result<Extracted, ExtractionError> {
        Err(ExtractionError::Unsupported(content_type.to_string()))
    }
}

/// Records submissions instead of running them.
#[derive(Default)]
pub struct RecordingSubmitter {
    tasks: Mutex<Vec<Task>>,
}

impl RecordingSubmitter {
    pub fn take(&self) -> Vec<Task> {
        std::mem::take(&mut *self.tasks.lock())
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaskSubmitter for RecordingSubmitter {
    fn submit(&self, task: Task) {
        self.tasks.lock().push(task);
    }
}

/// One call that reached the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOp {
    /// A record was written (id, title, date_stamp ms)
    Write { id: String, title: String, stamp_ms: i64 },
    /// A write was refused by the anti-regression check
    Refused { id: String },
    Delete,
    Commit,
}

/// Tantivy engine wrapper that logs operations and can fail writes.
pub struct LoggingEngine {
    inner: Arc<SearchIndexer>,
    ops: Mutex<Vec<EngineOp>>,
    failing_writes: AtomicUsize,
}

impl LoggingEngine {
    pub fn new(inner: Arc<SearchIndexer>) -> Self {
        Self {
            inner,
            ops: Mutex::new(Vec::new()),
            failing_writes: AtomicUsize::new(0),
        }
    }

    /// Fail the next `n` writes with a transient error.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    pub fn take_ops(&self) -> Vec<EngineOp> {
        std::mem::take(&mut *self.ops.lock())
    }

    pub fn writes(&self) -> usize {
        self.ops
            .lock()
            .iter()
            .filter(|op| matches!(op, EngineOp::Write { .. }))
            .count()
    }
}

impl SearchEngine for LoggingEngine {
    fn add_document(&self, doc: &IndexDocument) -> Result<bool, SearchError> {
        let fail = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(SearchError::Unavailable("node not reachable".to_string()));
        }

        let written = self.inner.add_document(doc)?;
        let op = if written {
            EngineOp::Write {
                id: doc.id.clone(),
                title: doc.title.clone(),
                stamp_ms: doc.date_stamp.timestamp_millis(),
            }
        } else {
            EngineOp::Refused { id: doc.id.clone() }
        };
        self.ops.lock().push(op);
        Ok(written)
    }

    fn delete_stale(&self, filter: &StaleFilter) -> Result<(), SearchError> {
        self.inner.delete_stale(filter)?;
        self.ops.lock().push(EngineOp::Delete);
        Ok(())
    }

    fn date_stamp(&self, id: &str) -> Result<Option<DateTime<Utc>>, SearchError> {
        self.inner.date_stamp(id)
    }

    fn site_references(&self, site_id: &str) -> Result<Vec<String>, SearchError> {
        self.inner.site_references(site_id)
    }

    fn commit(&self) -> Result<(), SearchError> {
        self.inner.commit()?;
        self.ops.lock().push(EngineOp::Commit);
        Ok(())
    }

    fn optimize(&self) -> Result<(), SearchError> {
        self.inner.optimize()
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        self.inner.search(query, limit)
    }

    fn num_docs(&self) -> Result<u64, SearchError> {
        self.inner.num_docs()
    }
}

/// Shared test harness for E2E tests.
///
/// A real Tantivy index in a temp directory behind a [`LoggingEngine`],
/// an in-memory content source and a mutable site list.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub engine: Arc<LoggingEngine>,
    pub content: Arc<MemoryContent>,
    pub sites: Arc<StaticSites>,
    pub registry: Arc<ContentRegistry>,
    pub policy: SitePolicy,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let index = SearchIndex::open_or_create(SearchIndexConfig::new(temp_dir.path().join("index")))
            .expect("Failed to create index");
        let indexer = SearchIndexer::new(&index).expect("Failed to create indexer");

        let content = Arc::new(MemoryContent::default());
        let registry = ContentRegistry::new().with_source("", content.clone());

        Self {
            _temp_dir: temp_dir,
            engine: Arc::new(LoggingEngine::new(Arc::new(indexer))),
            content,
            sites: Arc::new(StaticSites::default()),
            registry: Arc::new(registry),
            policy: SitePolicy::default(),
        }
    }

    /// Register `site_id` as an ordinary indexable site.
    pub fn add_site(&self, site_id: &str) {
        self.sites.add(SiteInfo::new(site_id));
    }

    pub fn executor(&self) -> IndexExecutor {
        IndexExecutor::new(
            self.registry.clone(),
            self.engine.clone(),
            Arc::new(NoExtractor),
            self.sites.clone(),
            self.policy,
        )
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher<IndexExecutor>> {
        Arc::new(Dispatcher::new(self.executor()))
    }

    /// Splitter resubmitting through `submitter`, with the dispatcher behind it.
    pub fn splitter(&self, submitter: Arc<dyn TaskSubmitter>) -> TaskSplitter {
        TaskSplitter::new(
            self.registry.clone(),
            self.engine.clone(),
            self.sites.clone(),
            self.policy,
            submitter,
            self.dispatcher(),
        )
    }

    /// Stamp of the record indexed for `reference`.
    pub fn stamp_of(&self, reference: &str) -> Option<DateTime<Utc>> {
        self.engine
            .date_stamp(&format!("doc:{}", reference))
            .expect("date_stamp lookup failed")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
