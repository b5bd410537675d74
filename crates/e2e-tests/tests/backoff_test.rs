//! Runner throttle behavior under consecutive failures and concurrency.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use e2e_tests::{at, wait_for, RecordingSubmitter};
use sitesearch_indexing::{
    Backoff, RunOutcome, TaskContext, TaskFailure, TaskHandler, TaskResult, TaskRunner,
};
use sitesearch_types::Task;

/// Pops one scripted outcome per task; `true` means a retryable failure.
struct Scripted {
    script: Mutex<VecDeque<bool>>,
}

impl Scripted {
    fn new(script: &[bool]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
        }
    }
}

impl TaskHandler for Scripted {
    fn handle(&self, task: &Task, _ctx: &TaskContext) -> TaskResult {
        match self.script.lock().pop_front() {
            Some(true) => Err(TaskFailure::retry(task.clone(), "temporarily unavailable")),
            _ => Ok(()),
        }
    }
}

#[test]
fn test_interval_doubles_to_ceiling_then_resets() {
    let base = Duration::from_millis(2);
    let backoff = Arc::new(Backoff::new(base, Duration::from_millis(16)));
    let handler = Arc::new(Scripted::new(&[true, true, true, true, true, false]));
    let submitter = Arc::new(RecordingSubmitter::default());
    let runner = TaskRunner::new(handler, backoff.clone(), submitter.clone());

    let mut intervals = Vec::new();
    for _ in 0..5 {
        assert_eq!(runner.run(Task::index_all(at(1))).unwrap(), RunOutcome::Retried);
        intervals.push(backoff.current_interval().as_millis());
    }
    assert_eq!(intervals, vec![4, 8, 16, 16, 16]);
    assert_eq!(submitter.len(), 5);

    assert_eq!(runner.run(Task::index_all(at(1))).unwrap(), RunOutcome::Completed);
    assert_eq!(backoff.current_interval(), base);
}

/// Records whether the backoff was frozen when each dispatch began.
struct FreezeWatch {
    backoff: Arc<Backoff>,
    dispatches: Mutex<Vec<(Task, bool, Instant)>>,
}

impl TaskHandler for FreezeWatch {
    fn handle(&self, task: &Task, _ctx: &TaskContext) -> TaskResult {
        self.dispatches
            .lock()
            .push((task.clone(), self.backoff.is_frozen(), Instant::now()));
        if task.property("reference") == Some("flaky") {
            return Err(TaskFailure::retry(task.clone(), "connection reset"));
        }
        Ok(())
    }
}

#[test]
fn test_no_dispatch_starts_while_frozen() {
    let interval = Duration::from_millis(150);
    let backoff = Arc::new(Backoff::new(interval, interval));
    let watch = Arc::new(FreezeWatch {
        backoff: backoff.clone(),
        dispatches: Mutex::new(Vec::new()),
    });
    let submitter = Arc::new(RecordingSubmitter::default());
    let runner = Arc::new(TaskRunner::new(watch.clone(), backoff.clone(), submitter));

    let failing = {
        let runner = runner.clone();
        thread::spawn(move || runner.run(Task::index_document("flaky", at(1))))
    };
    wait_for(|| backoff.is_frozen());
    let frozen_at = Instant::now();

    let others: Vec<_> = (0..4)
        .map(|n| {
            let runner = runner.clone();
            thread::spawn(move || runner.run(Task::index_document(format!("doc{}", n), at(1))))
        })
        .collect();

    assert_eq!(failing.join().unwrap().unwrap(), RunOutcome::Retried);
    for handle in others {
        assert_eq!(handle.join().unwrap().unwrap(), RunOutcome::Completed);
    }

    let dispatches = watch.dispatches.lock();
    assert_eq!(dispatches.len(), 5);
    for (task, frozen, started) in dispatches.iter().skip(1) {
        assert!(!frozen, "{} dispatched while frozen", task);
        // Allow for the time between engage and our observation of it
        assert!(
            started.duration_since(frozen_at) + Duration::from_millis(50) >= interval,
            "{} dispatched {:?} into a {:?} freeze",
            task,
            started.duration_since(frozen_at),
            interval
        );
    }
}

#[test]
fn test_interrupt_releases_frozen_runners() {
    let backoff = Arc::new(Backoff::new(Duration::from_secs(30), Duration::from_secs(30)));
    let handler = Arc::new(Scripted::new(&[true]));
    let submitter = Arc::new(RecordingSubmitter::default());
    let runner = Arc::new(TaskRunner::new(handler, backoff.clone(), submitter.clone()));

    let failing = {
        let runner = runner.clone();
        thread::spawn(move || runner.run(Task::index_all(at(1))))
    };
    wait_for(|| backoff.is_frozen());

    let started = Instant::now();
    backoff.interrupt();
    assert_eq!(failing.join().unwrap().unwrap(), RunOutcome::Interrupted);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!backoff.is_frozen());

    // The replacement was requeued before the freeze began
    assert_eq!(submitter.take(), vec![Task::index_all(at(1))]);

    // Later tasks are not held back once the freeze is gone
    assert_eq!(runner.run(Task::refresh_all(at(2))).unwrap(), RunOutcome::Completed);
}
