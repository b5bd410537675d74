//! Local in-process task queue.
//!
//! Two named worker pools fed by unbounded channels: "indexing" serves
//! INDEX_DOCUMENT / REMOVE_DOCUMENT, "splitting" serves everything else, so
//! whole-site rebuilds cannot starve single-document updates.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use sitesearch_types::{QueueSettings, Task};
use tracing::{debug, info, warn};

use crate::handler::TaskSubmitter;
use crate::runner::TaskRunner;

/// Which pool a task runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pool {
    Indexing,
    Splitting,
}

impl Pool {
    pub fn for_task(task: &Task) -> Self {
        if task.task_type().is_document_task() {
            Pool::Indexing
        } else {
            Pool::Splitting
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Pool::Indexing => "indexing",
            Pool::Splitting => "splitting",
        }
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queued and running task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub indexing_queued: usize,
    pub indexing_active: usize,
    pub splitting_queued: usize,
    pub splitting_active: usize,
}

impl PendingCounts {
    pub fn total(&self) -> usize {
        self.indexing_queued + self.indexing_active + self.splitting_queued + self.splitting_active
    }
}

#[derive(Debug, Default)]
struct ActiveCounters {
    indexing: AtomicUsize,
    splitting: AtomicUsize,
}

impl ActiveCounters {
    fn counter(&self, pool: Pool) -> &AtomicUsize {
        match pool {
            Pool::Indexing => &self.indexing,
            Pool::Splitting => &self.splitting,
        }
    }
}

/// Routes submissions to the pool channels. Cheap to clone.
#[derive(Clone)]
pub struct LocalSubmitter {
    indexing: Sender<Task>,
    splitting: Sender<Task>,
    active: Arc<ActiveCounters>,
}

impl LocalSubmitter {
    pub fn pending(&self) -> PendingCounts {
        PendingCounts {
            indexing_queued: self.indexing.len(),
            indexing_active: self.active.indexing.load(Ordering::SeqCst),
            splitting_queued: self.splitting.len(),
            splitting_active: self.active.splitting.load(Ordering::SeqCst),
        }
    }
}

impl TaskSubmitter for LocalSubmitter {
    fn submit(&self, task: Task) {
        let pool = Pool::for_task(&task);
        let sender = match pool {
            Pool::Indexing => &self.indexing,
            Pool::Splitting => &self.splitting,
        };
        debug!(task = %task, pool = %pool, "Submitting task");
        // Receivers live as long as the queue; a send only fails after shutdown.
        if let Err(err) = sender.send(task) {
            warn!(task = %err.into_inner(), pool = %pool, "Queue is shut down, dropping task");
        }
    }
}

/// The two worker pools.
pub struct TaskQueue {
    settings: QueueSettings,
    submitter: LocalSubmitter,
    indexing_rx: Receiver<Task>,
    splitting_rx: Receiver<Task>,
    shutdown_tx: Option<Sender<()>>,
    shutdown_rx: Receiver<()>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskQueue {
    /// Create the channels. Tasks submitted before [`start`](Self::start)
    /// wait in the channels.
    pub fn new(settings: &QueueSettings) -> Self {
        let (indexing_tx, indexing_rx) = unbounded();
        let (splitting_tx, splitting_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = unbounded();

        Self {
            settings: settings.clone(),
            submitter: LocalSubmitter {
                indexing: indexing_tx,
                splitting: splitting_tx,
                active: Arc::new(ActiveCounters::default()),
            },
            indexing_rx,
            splitting_rx,
            shutdown_tx: Some(shutdown_tx),
            shutdown_rx,
            workers: Vec::new(),
        }
    }

    /// A submission handle for triggers, the splitter and the runner.
    pub fn submitter(&self) -> LocalSubmitter {
        self.submitter.clone()
    }

    pub fn pending(&self) -> PendingCounts {
        self.submitter.pending()
    }

    /// Spawn the worker threads of both pools.
    pub fn start(&mut self, runner: Arc<TaskRunner>) -> std::io::Result<()> {
        let pools = [
            (Pool::Indexing, self.settings.indexing_workers, self.indexing_rx.clone()),
            (Pool::Splitting, self.settings.splitting_workers, self.splitting_rx.clone()),
        ];

        for (pool, count, tasks) in pools {
            for n in 0..count {
                let runner = runner.clone();
                let tasks = tasks.clone();
                let shutdown = self.shutdown_rx.clone();
                let active = self.submitter.active.clone();
                let handle = thread::Builder::new()
                    .name(format!("{}-{}", pool, n))
                    .spawn(move || worker_loop(pool, &runner, &tasks, &shutdown, &active))?;
                self.workers.push(handle);
            }
        }

        info!(
            indexing = self.settings.indexing_workers,
            splitting = self.settings.splitting_workers,
            "Task queue started"
        );
        Ok(())
    }

    /// Stop every worker: interrupt the backoff so frozen and sleeping
    /// workers wake, then join them. In-flight tasks interrupted while
    /// waiting are resubmitted; queued tasks are dropped with the queue.
    pub fn shutdown(&mut self, runner: &TaskRunner) {
        let pending = self.pending();
        runner.backoff().interrupt();
        self.shutdown_tx.take();

        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                warn!(worker = %name, "Worker panicked");
            }
        }

        info!(dropped = pending.indexing_queued + pending.splitting_queued, "Task queue stopped");
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

fn worker_loop(
    pool: Pool,
    runner: &TaskRunner,
    tasks: &Receiver<Task>,
    shutdown: &Receiver<()>,
    active: &ActiveCounters,
) {
    debug!(pool = %pool, "Worker started");
    loop {
        select! {
            recv(tasks) -> msg => match msg {
                Ok(task) => {
                    let counter = active.counter(pool);
                    counter.fetch_add(1, Ordering::SeqCst);
                    // Non-retryable failures are already logged by the runner.
                    let _ = runner.run(task);
                    counter.fetch_sub(1, Ordering::SeqCst);
                }
                Err(_) => break,
            },
            recv(shutdown) -> _ => break,
        }
    }
    debug!(pool = %pool, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::Backoff;
    use crate::context::TaskContext;
    use crate::failure::TaskResult;
    use crate::handler::TaskHandler;
    use crate::test_support::at;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct ThreadRecorder {
        seen: Mutex<Vec<(String, Task)>>,
    }

    impl TaskHandler for ThreadRecorder {
        fn handle(&self, task: &Task, _ctx: &TaskContext) -> TaskResult {
            let name = thread::current().name().unwrap_or("").to_string();
            self.seen.lock().push((name, task.clone()));
            Ok(())
        }
    }

    fn settings() -> QueueSettings {
        QueueSettings {
            indexing_workers: 2,
            splitting_workers: 1,
            ..QueueSettings::default()
        }
    }

    fn wait_for(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_pool_routing() {
        assert_eq!(Pool::for_task(&Task::index_document("r", at(1))), Pool::Indexing);
        assert_eq!(Pool::for_task(&Task::remove_document("r", at(1))), Pool::Indexing);
        assert_eq!(Pool::for_task(&Task::index_site("s", at(1))), Pool::Splitting);
        assert_eq!(Pool::for_task(&Task::purge_all_documents(at(1))), Pool::Splitting);
    }

    #[test]
    fn test_workers_run_tasks_on_their_pool() {
        let mut queue = TaskQueue::new(&settings());
        let submitter = queue.submitter();
        let recorder = Arc::new(ThreadRecorder::default());
        let backoff = Arc::new(Backoff::new(Duration::from_millis(1), Duration::from_millis(1)));
        let runner = Arc::new(TaskRunner::new(recorder.clone(), backoff, Arc::new(submitter.clone())));

        submitter.submit(Task::index_document("/a", at(1)));
        submitter.submit(Task::index_site("s", at(1)));
        assert_eq!(queue.pending().total(), 2);

        queue.start(runner.clone()).unwrap();
        assert_eq!(queue.worker_count(), 3);
        wait_for(|| recorder.seen.lock().len() == 2);

        for (thread_name, task) in recorder.seen.lock().iter() {
            let expected = Pool::for_task(task).as_str();
            assert!(thread_name.starts_with(expected), "{} ran on {}", task, thread_name);
        }

        queue.shutdown(&runner);
        assert_eq!(queue.worker_count(), 0);
    }

    #[test]
    fn test_submit_after_shutdown_is_dropped() {
        let mut queue = TaskQueue::new(&settings());
        let submitter = queue.submitter();
        let recorder = Arc::new(ThreadRecorder::default());
        let backoff = Arc::new(Backoff::new(Duration::from_millis(1), Duration::from_millis(1)));
        let runner = Arc::new(TaskRunner::new(recorder.clone(), backoff, Arc::new(submitter.clone())));

        queue.start(runner.clone()).unwrap();
        queue.shutdown(&runner);
        drop(queue);

        submitter.submit(Task::index_all(at(1)));
        assert!(recorder.seen.lock().is_empty());
    }
}
