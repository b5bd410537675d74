//! Index triggers: turn content events and admin requests into tasks.
//!
//! Every trigger stamps the task with the current time and returns as soon
//! as it is submitted. Nothing is submitted while search is disabled.
//!
//! Stamps from one trigger strictly increase: a second event in the same
//! millisecond is stamped one millisecond later, so a removal that follows
//! an update always wins the staleness check.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sitesearch_types::{SearchSettings, Task};
use tracing::{debug, info};

use crate::handler::TaskSubmitter;

/// A change reported by the content repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEvent {
    Added(String),
    Updated(String),
    Removed(String),
}

pub struct IndexTrigger {
    submitter: Arc<dyn TaskSubmitter>,
    enabled: bool,
    last_stamp_ms: AtomicI64,
}

impl IndexTrigger {
    pub fn new(submitter: Arc<dyn TaskSubmitter>, settings: &SearchSettings) -> Self {
        Self {
            submitter,
            enabled: settings.enabled,
            last_stamp_ms: AtomicI64::new(i64::MIN),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current time, bumped past the previous stamp on a collision.
    fn stamp(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last_stamp_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or(now);
        let ms = now.max(previous.saturating_add(1));
        DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
    }

    fn submit(&self, task: Task) -> Option<Task> {
        if !self.enabled {
            debug!(task = %task, "Search disabled, ignoring trigger");
            return None;
        }
        self.submitter.submit(task.clone());
        Some(task)
    }

    /// Submit the task for a content event.
    pub fn on_event(&self, event: &ContentEvent) -> Option<Task> {
        let now = self.stamp();
        let task = match event {
            ContentEvent::Added(reference) | ContentEvent::Updated(reference) => {
                Task::index_document(reference.as_str(), now)
            }
            ContentEvent::Removed(reference) => Task::remove_document(reference.as_str(), now),
        };
        self.submit(task)
    }

    /// Rebuild one site from its current content.
    pub fn rebuild_site(&self, site_id: &str) -> Option<Task> {
        info!(site_id, "Site rebuild requested");
        self.submit(Task::index_site(site_id, self.stamp()))
    }

    /// Re-touch the documents already indexed for one site.
    pub fn refresh_site(&self, site_id: &str) -> Option<Task> {
        info!(site_id, "Site refresh requested");
        self.submit(Task::refresh_site(site_id, self.stamp()))
    }

    pub fn rebuild_all(&self) -> Option<Task> {
        info!("Full rebuild requested");
        self.submit(Task::index_all(self.stamp()))
    }

    pub fn refresh_all(&self) -> Option<Task> {
        info!("Full refresh requested");
        self.submit(Task::refresh_all(self.stamp()))
    }
}
