//! Content sources and the prefix registry that finds them.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use tracing::debug;

use crate::context::TaskContext;
use crate::error::ContentError;

/// Lazy, finite iterator over the references of one site.
pub type SiteReferences<'a> = Box<dyn Iterator<Item = Result<String, ContentError>> + Send + 'a>;

/// Descriptive fields a source reports for a reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentMetadata {
    pub container: String,
    pub doc_type: String,
    pub title: String,
    pub tool: String,
    pub url: String,
    pub site_id: String,
    /// Raw custom properties; flattened by the executor
    pub custom_properties: BTreeMap<String, serde_json::Value>,
}

/// Body of a document in one of the three shapes sources produce.
pub enum DocumentContent {
    Text(String),
    /// Character stream
    Reader(Box<dyn Read + Send>),
    /// Byte stream that needs the extraction service
    Binary {
        stream: Box<dyn Read + Send>,
        content_type: String,
    },
}

impl fmt::Debug for DocumentContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentContent::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            DocumentContent::Reader(_) => f.write_str("Reader"),
            DocumentContent::Binary { content_type, .. } => f
                .debug_struct("Binary")
                .field("content_type", content_type)
                .finish(),
        }
    }
}

/// A producer of indexable content, registered by reference prefix.
pub trait ContentSource: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Whether this source owns the reference.
    fn matches(&self, reference: &str) -> bool;

    /// Stable identity of the content behind a reference.
    fn identity(&self, reference: &str) -> String {
        reference.to_string()
    }

    /// False for content that exists but must not appear in the index.
    fn is_for_index(&self, reference: &str) -> bool;

    /// Whether the reference is readable under `ctx`. Content restricted to
    /// privileged readers is readable only when `ctx` is elevated.
    fn can_read(&self, reference: &str, ctx: &TaskContext) -> bool;

    fn metadata(&self, reference: &str) -> Result<ContentMetadata, ContentError>;

    fn content(&self, reference: &str) -> Result<DocumentContent, ContentError>;

    /// References of the current content of a site.
    fn site_references(&self, site_id: &str) -> Result<SiteReferences<'_>, ContentError>;
}

/// Prefix-keyed list of content sources, searched in registration order.
#[derive(Default, Clone)]
pub struct ContentRegistry {
    sources: Vec<(String, Arc<dyn ContentSource>)>,
}

impl ContentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, prefix: impl Into<String>, source: Arc<dyn ContentSource>) {
        let prefix = prefix.into();
        debug!(prefix = %prefix, source = source.name(), "Registered content source");
        self.sources.push((prefix, source));
    }

    pub fn with_source(mut self, prefix: impl Into<String>, source: Arc<dyn ContentSource>) -> Self {
        self.register(prefix, source);
        self
    }

    /// First source whose prefix starts the reference and which claims it.
    pub fn find(&self, reference: &str) -> Option<&Arc<dyn ContentSource>> {
        self.sources
            .iter()
            .find(|(prefix, source)| reference.starts_with(prefix.as_str()) && source.matches(reference))
            .map(|(_, source)| source)
    }

    /// Every registered source.
    pub fn sources(&self) -> impl Iterator<Item = &Arc<dyn ContentSource>> {
        self.sources.iter().map(|(_, source)| source)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl fmt::Debug for ContentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.sources.iter().map(|(prefix, source)| (prefix, source.name())))
            .finish()
    }
}
