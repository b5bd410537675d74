//! Publishes submitted tasks to the broker queue.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use sitesearch_indexing::TaskSubmitter;
use sitesearch_types::{BrokerSettings, Task};
use tracing::{debug, error, warn};

use crate::broker::Broker;
use crate::error::BrokerError;

/// [`TaskSubmitter`] over a broker queue.
///
/// A failed publish is retried with exponential backoff for
/// `publish_retry_secs`; after that the task is logged and dropped.
pub struct BrokerSubmitter {
    broker: Arc<dyn Broker>,
    queue: String,
    retry_for: Duration,
}

impl BrokerSubmitter {
    pub fn new(broker: Arc<dyn Broker>, settings: &BrokerSettings) -> Self {
        Self {
            broker,
            queue: settings.queue_name.clone(),
            retry_for: Duration::from_secs(settings.publish_retry_secs),
        }
    }

    pub fn with_retry_for(mut self, retry_for: Duration) -> Self {
        self.retry_for = retry_for;
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Publish with retries. Returns the last error once the budget is spent.
    pub fn publish(&self, task: &Task) -> Result<(), BrokerError> {
        let payload = match task.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                // Encoding a valid task cannot fail transiently
                error!(task = %task, error = %e, "Failed to encode task");
                return Ok(());
            }
        };

        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(self.retry_for),
            ..Default::default()
        };

        loop {
            match self.broker.publish(&self.queue, &payload) {
                Ok(()) => {
                    debug!(task = %task, queue = %self.queue, "Task published");
                    return Ok(());
                }
                Err(e) => match backoff.next_backoff() {
                    Some(duration) if e.is_transient() => {
                        warn!(
                            task = %task,
                            error = %e,
                            retry_in_ms = duration.as_millis(),
                            "Publish failed, retrying"
                        );
                        thread::sleep(duration);
                    }
                    _ => return Err(e),
                },
            }
        }
    }
}

impl TaskSubmitter for BrokerSubmitter {
    fn submit(&self, task: Task) {
        if let Err(e) = self.publish(&task) {
            error!(task = %task, error = %e, "Publish retries exhausted, dropping task");
        }
    }
}
