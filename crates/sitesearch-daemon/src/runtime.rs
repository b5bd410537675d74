//! Wiring: builds the handler chain and the workers for the configured
//! queue mode.

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use sitesearch_adapters::{FsContentSource, FsSiteDirectory, PlainTextExtractor, CONTENT_PREFIX};
use sitesearch_broker::{Broker, BrokerConsumer, BrokerSubmitter, RedisBroker};
use sitesearch_indexing::{
    Backoff, ContentRegistry, Dispatcher, IndexExecutor, SiteDirectory, SitePolicy, TaskQueue,
    TaskRunner, TaskSplitter, TaskSubmitter,
};
use sitesearch_search::{SearchIndex, SearchIndexConfig, SearchIndexer};
use sitesearch_types::{QueueMode, Settings};
use tracing::info;

/// Collaborators shared by every task.
pub struct Components {
    pub engine: Arc<SearchIndexer>,
    pub registry: Arc<ContentRegistry>,
    pub sites: Arc<dyn SiteDirectory>,
    pub policy: SitePolicy,
}

impl Components {
    /// Open the index (taking its writer lock) and the content root.
    pub fn open(settings: &Settings) -> Result<Self> {
        let index_path = settings.expanded_index_path();
        fs::create_dir_all(&index_path).context("Failed to create index directory")?;
        let index = SearchIndex::open_or_create(
            SearchIndexConfig::new(&index_path).with_memory_mb(settings.writer_memory_mb),
        )
        .context("Failed to open search index")?;
        let engine = SearchIndexer::new(&index)
            .context("Failed to acquire index writer (is the daemon running?)")?;

        let content_root = settings.expanded_content_root();
        info!(index = %index_path.display(), content = %content_root.display(), "Opened index");

        let registry = ContentRegistry::new()
            .with_source(CONTENT_PREFIX, Arc::new(FsContentSource::new(&content_root)));

        Ok(Self {
            engine: Arc::new(engine),
            registry: Arc::new(registry),
            sites: Arc::new(FsSiteDirectory::new(content_root)),
            policy: SitePolicy::from(&settings.search),
        })
    }

    pub fn executor(&self) -> IndexExecutor {
        IndexExecutor::new(
            self.registry.clone(),
            self.engine.clone(),
            Arc::new(PlainTextExtractor),
            self.sites.clone(),
            self.policy,
        )
    }

    /// Splitter in front of the dispatcher, resubmitting through `submitter`.
    pub fn handler_chain(&self, submitter: Arc<dyn TaskSubmitter>) -> TaskSplitter {
        TaskSplitter::new(
            self.registry.clone(),
            self.engine.clone(),
            self.sites.clone(),
            self.policy,
            submitter,
            Arc::new(Dispatcher::new(self.executor())),
        )
    }
}

/// Name for this process's broker processing lists.
pub fn node_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

pub fn open_broker(settings: &Settings) -> Result<Arc<dyn Broker>> {
    let broker = RedisBroker::open(&settings.broker.url, node_name())
        .with_context(|| format!("Invalid broker URL {}", settings.broker.url))?;
    Ok(Arc::new(broker))
}

enum Workers {
    Local(TaskQueue),
    Distributed(BrokerConsumer),
}

/// Running workers plus the submitter that feeds them.
pub struct Runtime {
    workers: Workers,
    runner: Arc<TaskRunner>,
    submitter: Arc<dyn TaskSubmitter>,
}

impl Runtime {
    pub fn start(settings: &Settings, components: &Components) -> Result<Self> {
        let backoff = Arc::new(Backoff::new(
            settings.queue.backoff_base(),
            settings.queue.backoff_max(),
        ));

        match settings.queue.mode {
            QueueMode::Local => {
                let mut queue = TaskQueue::new(&settings.queue);
                let submitter: Arc<dyn TaskSubmitter> = Arc::new(queue.submitter());
                let handler = Arc::new(components.handler_chain(submitter.clone()));
                let runner = Arc::new(TaskRunner::new(handler, backoff, submitter.clone()));
                queue
                    .start(runner.clone())
                    .context("Failed to spawn worker threads")?;
                Ok(Self {
                    workers: Workers::Local(queue),
                    runner,
                    submitter,
                })
            }
            QueueMode::Distributed => {
                let broker = open_broker(settings)?;
                let submitter: Arc<dyn TaskSubmitter> =
                    Arc::new(BrokerSubmitter::new(broker.clone(), &settings.broker));
                let handler = Arc::new(components.handler_chain(submitter.clone()));
                let runner = Arc::new(TaskRunner::new(handler, backoff, submitter.clone()));
                let consumer = BrokerConsumer::start(broker, runner.clone(), &settings.broker)
                    .context("Failed to spawn consumer threads")?;
                Ok(Self {
                    workers: Workers::Distributed(consumer),
                    runner,
                    submitter,
                })
            }
        }
    }

    pub fn submitter(&self) -> Arc<dyn TaskSubmitter> {
        self.submitter.clone()
    }

    /// Tasks queued or running in this process. Broker-side backlog is not
    /// visible here.
    pub fn pending(&self) -> usize {
        match &self.workers {
            Workers::Local(queue) => queue.pending().total(),
            Workers::Distributed(consumer) => consumer.active(),
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.runner.backoff().is_frozen()
    }

    pub fn shutdown(self) {
        match self.workers {
            Workers::Local(mut queue) => queue.shutdown(&self.runner),
            Workers::Distributed(mut consumer) => consumer.stop(&self.runner),
        }
    }
}
