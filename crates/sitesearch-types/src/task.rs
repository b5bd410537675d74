//! Indexing task model.
//!
//! A task is an immutable unit of indexing work: a type tag, the as-of
//! creation date used for staleness checks, and a small property bag.
//! Tasks created by splitting a coarse task carry the parent's creation
//! date, never their own spawn time.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Property key holding a document reference.
pub const REFERENCE: &str = "reference";

/// Property key holding a site identifier.
pub const SITE_ID: &str = "siteId";

/// Kind of indexing work a task describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Index (or re-index) one document
    IndexDocument,
    /// Remove one document from the index
    RemoveDocument,
    /// Rebuild a site from the content source
    IndexSite,
    /// Re-touch every document already indexed for a site
    RefreshSite,
    /// Rebuild every indexable site
    IndexAll,
    /// Refresh every indexable site
    RefreshAll,
    /// Delete a site's records stamped before the task's creation date
    PurgeSiteDocuments,
    /// Delete all records stamped before the task's creation date
    PurgeAllDocuments,
}

impl TaskType {
    pub const ALL: [TaskType; 8] = [
        TaskType::IndexDocument,
        TaskType::RemoveDocument,
        TaskType::IndexSite,
        TaskType::RefreshSite,
        TaskType::IndexAll,
        TaskType::RefreshAll,
        TaskType::PurgeSiteDocuments,
        TaskType::PurgeAllDocuments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::IndexDocument => "INDEX_DOCUMENT",
            TaskType::RemoveDocument => "REMOVE_DOCUMENT",
            TaskType::IndexSite => "INDEX_SITE",
            TaskType::RefreshSite => "REFRESH_SITE",
            TaskType::IndexAll => "INDEX_ALL",
            TaskType::RefreshAll => "REFRESH_ALL",
            TaskType::PurgeSiteDocuments => "PURGE_SITE_DOCUMENTS",
            TaskType::PurgeAllDocuments => "PURGE_ALL_DOCUMENTS",
        }
    }

    /// Parse from the wire tag, returning None for unknown types.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }

    /// Property keys that must be present for this type.
    pub fn required_properties(&self) -> &'static [&'static str] {
        match self {
            TaskType::IndexDocument | TaskType::RemoveDocument => &[REFERENCE],
            TaskType::IndexSite | TaskType::RefreshSite | TaskType::PurgeSiteDocuments => {
                &[SITE_ID]
            }
            TaskType::IndexAll | TaskType::RefreshAll | TaskType::PurgeAllDocuments => &[],
        }
    }

    /// Single-document work, routed to the indexing pool.
    pub fn is_document_task(&self) -> bool {
        matches!(self, TaskType::IndexDocument | TaskType::RemoveDocument)
    }

    /// Whole-site or whole-collection work that gets split.
    pub fn is_coarse(&self) -> bool {
        matches!(
            self,
            TaskType::IndexSite | TaskType::RefreshSite | TaskType::IndexAll | TaskType::RefreshAll
        )
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown task type: {}", s))
    }
}

/// A unit of indexing work.
///
/// The creation date is truncated to millisecond precision on construction so
/// that it survives serialization and compares exactly against stored
/// `date_stamp` values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "type")]
    task_type: TaskType,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    creation_date: DateTime<Utc>,

    #[serde(default)]
    properties: BTreeMap<String, String>,
}

impl Task {
    /// Create a task with no properties.
    pub fn new(task_type: TaskType, creation_date: DateTime<Utc>) -> Self {
        Self {
            task_type,
            creation_date: creation_date.trunc_subsecs(3),
            properties: BTreeMap::new(),
        }
    }

    /// Add a property, consuming the task.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn index_document(reference: impl Into<String>, creation_date: DateTime<Utc>) -> Self {
        Self::new(TaskType::IndexDocument, creation_date).with_property(REFERENCE, reference)
    }

    pub fn remove_document(reference: impl Into<String>, creation_date: DateTime<Utc>) -> Self {
        Self::new(TaskType::RemoveDocument, creation_date).with_property(REFERENCE, reference)
    }

    pub fn index_site(site_id: impl Into<String>, creation_date: DateTime<Utc>) -> Self {
        Self::new(TaskType::IndexSite, creation_date).with_property(SITE_ID, site_id)
    }

    pub fn refresh_site(site_id: impl Into<String>, creation_date: DateTime<Utc>) -> Self {
        Self::new(TaskType::RefreshSite, creation_date).with_property(SITE_ID, site_id)
    }

    pub fn index_all(creation_date: DateTime<Utc>) -> Self {
        Self::new(TaskType::IndexAll, creation_date)
    }

    pub fn refresh_all(creation_date: DateTime<Utc>) -> Self {
        Self::new(TaskType::RefreshAll, creation_date)
    }

    pub fn purge_site_documents(site_id: impl Into<String>, creation_date: DateTime<Utc>) -> Self {
        Self::new(TaskType::PurgeSiteDocuments, creation_date).with_property(SITE_ID, site_id)
    }

    pub fn purge_all_documents(creation_date: DateTime<Utc>) -> Self {
        Self::new(TaskType::PurgeAllDocuments, creation_date)
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn creation_date(&self) -> DateTime<Utc> {
        self.creation_date
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Get a property the task type requires.
    pub fn require(&self, key: &str) -> Result<&str, TaskError> {
        self.property(key).ok_or_else(|| TaskError::MissingProperty {
            task: self.to_string(),
            key: key.to_string(),
        })
    }

    /// Check that every property the type requires is present.
    pub fn validate(&self) -> Result<(), TaskError> {
        for key in self.task_type.required_properties() {
            self.require(key)?;
        }
        Ok(())
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, TaskError> {
        serde_json::to_vec(self).map_err(TaskError::from)
    }

    /// Deserialize from JSON bytes and validate required properties.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TaskError> {
        let mut task: Task = serde_json::from_slice(bytes)?;
        task.creation_date = task.creation_date.trunc_subsecs(3);
        task.validate()?;
        Ok(task)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.task_type)?;
        if !self.properties.is_empty() {
            let props: Vec<String> = self
                .properties
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "{{{}}}", props.join(","))?;
        }
        write!(f, "@{}", self.creation_date.timestamp_millis())
    }
}
