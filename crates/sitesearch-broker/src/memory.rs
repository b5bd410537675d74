//! In-process broker with the same delivery contract as the Redis one.
//!
//! Used by tests and single-host setups that still want consumer
//! semantics. Unacknowledged deliveries go back to the head of their queue
//! when the connection is dropped or closed.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::broker::{Broker, BrokerConnection, Delivery};
use crate::error::BrokerError;

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<Vec<u8>>>,
    next_tag: u64,
    /// Bumped by `close_connections`; older connections report closed
    generation: u64,
    unavailable: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    arrived: Condvar,
}

#[derive(Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages waiting in `queue`, not counting unacknowledged ones.
    pub fn queued(&self, queue: &str) -> usize {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    /// Force every open connection to report [`BrokerError::ConnectionClosed`].
    pub fn close_connections(&self) {
        self.shared.state.lock().generation += 1;
        self.shared.arrived.notify_all();
    }

    /// Make publish and connect fail until called again with `false`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.state.lock().unavailable = unavailable;
    }
}

impl Broker for MemoryBroker {
    fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let mut state = self.shared.state.lock();
        if state.unavailable {
            return Err(BrokerError::Unavailable("memory broker offline".into()));
        }
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_vec());
        drop(state);
        self.shared.arrived.notify_all();
        Ok(())
    }

    fn connect(
        &self,
        queue: &str,
        _slot: usize,
    ) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        let state = self.shared.state.lock();
        if state.unavailable {
            return Err(BrokerError::Unavailable("memory broker offline".into()));
        }
        Ok(Box::new(MemoryConnection {
            shared: self.shared.clone(),
            queue: queue.to_string(),
            generation: state.generation,
            unacked: Vec::new(),
        }))
    }
}

struct MemoryConnection {
    shared: Arc<Shared>,
    queue: String,
    generation: u64,
    unacked: Vec<(u64, Vec<u8>)>,
}

impl MemoryConnection {
    fn requeue_unacked(&mut self) {
        if self.unacked.is_empty() {
            return;
        }
        let mut state = self.shared.state.lock();
        let queue = state.queues.entry(self.queue.clone()).or_default();
        for (_, payload) in self.unacked.drain(..).rev() {
            queue.push_front(payload);
        }
        drop(state);
        self.shared.arrived.notify_all();
        debug!(queue = %self.queue, "Requeued unacknowledged deliveries");
    }
}

impl BrokerConnection for MemoryConnection {
    fn next_delivery(&mut self, timeout: Duration) -> Result<Option<Delivery>, BrokerError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if state.generation != self.generation {
                drop(state);
                self.requeue_unacked();
                return Err(BrokerError::ConnectionClosed);
            }
            if let Some(payload) = state.queues.get_mut(&self.queue).and_then(VecDeque::pop_front) {
                state.next_tag += 1;
                let tag = state.next_tag;
                self.unacked.push((tag, payload.clone()));
                return Ok(Some(Delivery { tag, payload }));
            }
            if self.shared.arrived.wait_until(&mut state, deadline).timed_out() {
                return Ok(None);
            }
        }
    }

    fn ack(&mut self, tag: u64) -> Result<(), BrokerError> {
        match self.unacked.iter().position(|(t, _)| *t == tag) {
            Some(pos) => {
                self.unacked.remove(pos);
                Ok(())
            }
            None => Err(BrokerError::UnknownDelivery(tag)),
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.requeue_unacked();
    }
}
