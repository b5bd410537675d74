//! Broker consumers: pull tasks off the queue and run them.
//!
//! Each consumer thread owns one broker connection. A delivery is
//! acknowledged only after the runner returns, so a process dying mid-task
//! leaves the message for redelivery. A closed connection is reopened until
//! the consumer is stopped.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use backoff::{backoff::Backoff, ExponentialBackoff};
use sitesearch_indexing::TaskRunner;
use sitesearch_types::{BrokerSettings, Task};
use tracing::{debug, info, warn};

use crate::broker::{Broker, BrokerConnection, Delivery};

const STOP_POLL: Duration = Duration::from_millis(50);

pub struct BrokerConsumer {
    stop: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    workers: Vec<JoinHandle<()>>,
}

impl BrokerConsumer {
    /// Spawn `settings.consumers` consumer threads on `settings.queue_name`.
    pub fn start(
        broker: Arc<dyn Broker>,
        runner: Arc<TaskRunner>,
        settings: &BrokerSettings,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let active = Arc::new(AtomicUsize::new(0));
        let poll = Duration::from_millis(settings.poll_timeout_ms);
        let mut workers = Vec::with_capacity(settings.consumers);

        for n in 0..settings.consumers {
            let consumer = ConsumerLoop {
                slot: n,
                broker: broker.clone(),
                queue: settings.queue_name.clone(),
                runner: runner.clone(),
                stop: stop.clone(),
                active: active.clone(),
                poll,
            };
            let handle = thread::Builder::new()
                .name(format!("consumer-{}", n))
                .spawn(move || consumer.run())?;
            workers.push(handle);
        }

        info!(queue = %settings.queue_name, consumers = settings.consumers, "Broker consumers started");
        Ok(Self {
            stop,
            active,
            workers,
        })
    }

    /// Deliveries currently being handled.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn consumer_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop consuming and join the threads. Frozen runners are interrupted
    /// and resubmit their task before the delivery is acknowledged.
    pub fn stop(&mut self, runner: &TaskRunner) {
        self.stop.store(true, Ordering::SeqCst);
        runner.backoff().interrupt();
        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("consumer").to_string();
            if handle.join().is_err() {
                warn!(consumer = %name, "Consumer panicked");
            }
        }
        info!("Broker consumers stopped");
    }
}

struct ConsumerLoop {
    /// Fixed for the thread's lifetime so reconnects reclaim its leftovers
    slot: usize,
    broker: Arc<dyn Broker>,
    queue: String,
    runner: Arc<TaskRunner>,
    stop: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    poll: Duration,
}

impl ConsumerLoop {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn run(self) {
        let mut connection: Option<Box<dyn BrokerConnection>> = None;
        let mut reconnect = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(30),
            max_elapsed_time: None,
            ..Default::default()
        };

        while !self.stopped() {
            if connection.is_none() {
                match self.broker.connect(&self.queue, self.slot) {
                    Ok(conn) => {
                        debug!(queue = %self.queue, slot = self.slot, "Consumer connected");
                        reconnect.reset();
                        connection = Some(conn);
                    }
                    Err(e) => {
                        let wait = reconnect.next_backoff().unwrap_or(reconnect.max_interval);
                        warn!(error = %e, retry_in_ms = wait.as_millis(), "Broker connect failed, retrying");
                        self.sleep_unless_stopped(wait);
                        continue;
                    }
                }
            }
            let Some(conn) = connection.as_mut() else {
                continue;
            };

            match conn.next_delivery(self.poll) {
                Ok(None) => {}
                Ok(Some(delivery)) => {
                    self.handle(&delivery);
                    if let Err(e) = conn.ack(delivery.tag) {
                        warn!(error = %e, tag = delivery.tag, "Ack failed, reconnecting");
                        connection = None;
                    }
                }
                Err(e) => {
                    info!(error = %e, "Broker connection lost, reconnecting");
                    connection = None;
                }
            }
        }
        debug!(queue = %self.queue, "Consumer stopped");
    }

    fn handle(&self, delivery: &Delivery) {
        let task = match Task::from_bytes(&delivery.payload) {
            Ok(task) => task,
            Err(e) => {
                warn!(error = %e, tag = delivery.tag, "Dropping undecodable message");
                return;
            }
        };

        self.active.fetch_add(1, Ordering::SeqCst);
        // Non-retryable failures are already logged by the runner.
        let _ = self.runner.run(task);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn sleep_unless_stopped(&self, wait: Duration) {
        let deadline = Instant::now() + wait;
        while !self.stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(STOP_POLL.min(deadline - now));
        }
    }
}
