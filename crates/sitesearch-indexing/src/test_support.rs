//! In-memory collaborators shared by this crate's unit tests.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use sitesearch_search::{
    IndexDocument, SearchEngine, SearchError, SearchHit, SearchIndex, SearchIndexConfig,
    SearchIndexer, StaleFilter,
};
use sitesearch_types::Task;
use tempfile::TempDir;

use crate::content::{ContentMetadata, ContentSource, DocumentContent, SiteReferences};
use crate::context::TaskContext;
use crate::error::{ContentError, ExtractionError};
use crate::extractor::{Extracted, Extractor};
use crate::handler::TaskSubmitter;
use crate::sites::{SiteDirectory, SiteInfo};

pub fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

pub fn temp_engine() -> (TempDir, Arc<SearchIndexer>) {
    let dir = TempDir::new().unwrap();
    let index = SearchIndex::open_or_create(SearchIndexConfig::new(dir.path())).unwrap();
    let engine = Arc::new(SearchIndexer::new(&index).unwrap());
    (dir, engine)
}

#[derive(Clone)]
pub struct MemoryDoc {
    pub site_id: String,
    pub title: String,
    pub body: String,
    pub binary: bool,
    pub for_index: bool,
    /// Readable only by elevated contexts
    pub restricted: bool,
    pub custom: BTreeMap<String, serde_json::Value>,
}

/// Content source over `/mem/<site>/<name>` references.
#[derive(Default)]
pub struct MemorySource {
    pub docs: Mutex<BTreeMap<String, MemoryDoc>>,
    /// Site ids whose iterator yields one broken item before the rest
    pub broken_items: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn put(&self, site: &str, name: &str, title: &str, body: &str) -> String {
        let reference = format!("/mem/{}/{}", site, name);
        self.docs.lock().insert(
            reference.clone(),
            MemoryDoc {
                site_id: site.to_string(),
                title: title.to_string(),
                body: body.to_string(),
                binary: false,
                for_index: true,
                restricted: false,
                custom: BTreeMap::new(),
            },
        );
        reference
    }

    pub fn edit(&self, reference: &str, f: impl FnOnce(&mut MemoryDoc)) {
        if let Some(doc) = self.docs.lock().get_mut(reference) {
            f(doc);
        }
    }

    fn doc(&self, reference: &str) -> Result<MemoryDoc, ContentError> {
        self.docs
            .lock()
            .get(reference)
            .cloned()
            .ok_or_else(|| ContentError::NotFound(reference.to_string()))
    }
}

impl ContentSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn matches(&self, reference: &str) -> bool {
        reference.starts_with("/mem/")
    }

    fn identity(&self, reference: &str) -> String {
        format!("id:{}", reference)
    }

    fn is_for_index(&self, reference: &str) -> bool {
        self.doc(reference).map(|d| d.for_index).unwrap_or(false)
    }

    fn can_read(&self, reference: &str, ctx: &TaskContext) -> bool {
        self.doc(reference)
            .map(|d| !d.restricted || ctx.is_elevated())
            .unwrap_or(false)
    }

    fn metadata(&self, reference: &str) -> Result<ContentMetadata, ContentError> {
        let doc = self.doc(reference)?;
        Ok(ContentMetadata {
            container: format!("/mem/{}/", doc.site_id),
            doc_type: "text/plain".to_string(),
            title: doc.title,
            tool: "memory".to_string(),
            url: format!("mem:{}", reference),
            site_id: doc.site_id,
            custom_properties: doc.custom,
        })
    }

    fn content(&self, reference: &str) -> Result<DocumentContent, ContentError> {
        let doc = self.doc(reference)?;
        if doc.binary {
            Ok(DocumentContent::Binary {
                stream: Box::new(std::io::Cursor::new(doc.body.into_bytes())),
                content_type: "application/octet-stream".to_string(),
            })
        } else {
            Ok(DocumentContent::Text(doc.body))
        }
    }

    fn site_references(&self, site_id: &str) -> Result<SiteReferences<'_>, ContentError> {
        let mut items: Vec<Result<String, ContentError>> = Vec::new();
        if self.broken_items.lock().iter().any(|s| s == site_id) {
            items.push(Err(ContentError::Invalid(format!("broken item in {}", site_id))));
        }
        items.extend(
            self.docs
                .lock()
                .iter()
                .filter(|(_, doc)| doc.site_id == site_id)
                .map(|(reference, _)| Ok(reference.clone())),
        );
        Ok(Box::new(items.into_iter()))
    }
}

pub struct MemorySites(pub Vec<SiteInfo>);

impl SiteDirectory for MemorySites {
    fn sites(&self) -> Result<Vec<SiteInfo>, ContentError> {
        Ok(self.0.clone())
    }
}

/// Reads the stream as UTF-8 and reports its byte length.
pub struct EchoExtractor;

impl Extractor for EchoExtractor {
    fn extract(
        &self,
        stream: &mut dyn Read,
        _resource_name: &str,
        _content_type: &str,
    ) -> Result<Extracted, ExtractionError> {
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf)?;
        Ok(Extracted {
            metadata: vec![("Byte Count".to_string(), buf.len().to_string())],
            text: String::from_utf8_lossy(&buf).into_owned(),
        })
    }
}

#[derive(Default)]
pub struct RecordingSubmitter {
    pub tasks: Mutex<Vec<Task>>,
}

impl RecordingSubmitter {
    pub fn take(&self) -> Vec<Task> {
        std::mem::take(&mut *self.tasks.lock())
    }
}

impl TaskSubmitter for RecordingSubmitter {
    fn submit(&self, task: Task) {
        self.tasks.lock().push(task);
    }
}

/// Engine wrapper that fails a configurable number of calls.
pub struct FlakyEngine {
    pub inner: Arc<SearchIndexer>,
    pub failing_adds: AtomicUsize,
    pub failing_commits: AtomicUsize,
    pub permanent: bool,
    pub commits: AtomicUsize,
    pub writes: AtomicUsize,
    pub extra_refs: Mutex<HashMap<String, Vec<String>>>,
}

impl FlakyEngine {
    pub fn new(inner: Arc<SearchIndexer>) -> Self {
        Self {
            inner,
            failing_adds: AtomicUsize::new(0),
            failing_commits: AtomicUsize::new(0),
            permanent: false,
            commits: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            extra_refs: Mutex::new(HashMap::new()),
        }
    }

    fn error(&self) -> SearchError {
        if self.permanent {
            SearchError::Rejected("mapping conflict".to_string())
        } else {
            SearchError::Unavailable("connection refused".to_string())
        }
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl SearchEngine for FlakyEngine {
    fn add_document(&self, doc: &IndexDocument) -> Result<bool, SearchError> {
        if Self::take_failure(&self.failing_adds) {
            return Err(self.error());
        }
        let written = self.inner.add_document(doc)?;
        if written {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(written)
    }

    fn delete_stale(&self, filter: &StaleFilter) -> Result<(), SearchError> {
        self.inner.delete_stale(filter)
    }

    fn date_stamp(&self, id: &str) -> Result<Option<DateTime<Utc>>, SearchError> {
        self.inner.date_stamp(id)
    }

    fn site_references(&self, site_id: &str) -> Result<Vec<String>, SearchError> {
        let mut refs = self.inner.site_references(site_id)?;
        if let Some(extra) = self.extra_refs.lock().get(site_id) {
            refs.extend(extra.iter().cloned());
        }
        Ok(refs)
    }

    fn commit(&self) -> Result<(), SearchError> {
        if Self::take_failure(&self.failing_commits) {
            return Err(self.error());
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit()
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
