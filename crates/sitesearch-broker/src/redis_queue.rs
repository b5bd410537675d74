//! Redis-backed broker.
//!
//! A queue is a Redis list. Publishers `LPUSH`; consumers `BLMOVE` the
//! oldest message into their own processing list and `LREM` it on ack.
//! Whatever is left in a processing list when its consumer reconnects was
//! never acknowledged and goes back on the queue.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use redis::{Client, Connection};
use tracing::{debug, info, warn};

use crate::broker::{Broker, BrokerConnection, Delivery};
use crate::error::BrokerError;

pub struct RedisBroker {
    client: Client,
    node: String,
    publisher: Mutex<Option<Connection>>,
}

impl RedisBroker {
    /// Open a client for `url`. No connection is made until first use.
    ///
    /// `node` names this process's processing lists; it must be stable
    /// across restarts for leftovers to be reclaimed.
    pub fn open(url: &str, node: impl Into<String>) -> Result<Self, BrokerError> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            node: node.into(),
            publisher: Mutex::new(None),
        })
    }

    fn processing_list(&self, queue: &str, slot: usize) -> String {
        format!("{}:processing:{}:{}", queue, self.node, slot)
    }
}

impl Broker for RedisBroker {
    fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let mut guard = self.publisher.lock();
        if guard.is_none() {
            *guard = Some(self.client.get_connection()?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(BrokerError::ConnectionClosed);
        };

        let result: redis::RedisResult<i64> =
            redis::cmd("LPUSH").arg(queue).arg(payload).query(conn);
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                // Reconnect on the next publish
                *guard = None;
                Err(err.into())
            }
        }
    }

    fn connect(
        &self,
        queue: &str,
        slot: usize,
    ) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        let mut conn = self.client.get_connection()?;
        let processing = self.processing_list(queue, slot);

        let mut reclaimed = 0usize;
        loop {
            let moved: Option<Vec<u8>> = redis::cmd("LMOVE")
                .arg(&processing)
                .arg(queue)
                .arg("RIGHT")
                .arg("RIGHT")
                .query(&mut conn)?;
            if moved.is_none() {
                break;
            }
            reclaimed += 1;
        }
        if reclaimed > 0 {
            info!(queue, processing = %processing, reclaimed, "Requeued unacknowledged deliveries");
        }

        debug!(queue, processing = %processing, "Broker connection opened");
        Ok(Box::new(RedisConnection {
            conn,
            queue: queue.to_string(),
            processing,
            next_tag: 0,
            unacked: HashMap::new(),
        }))
    }
}

struct RedisConnection {
    conn: Connection,
    queue: String,
    processing: String,
    next_tag: u64,
    unacked: HashMap<u64, Vec<u8>>,
}

impl BrokerConnection for RedisConnection {
    fn next_delivery(&mut self, timeout: Duration) -> Result<Option<Delivery>, BrokerError> {
        let payload: Option<Vec<u8>> = redis::cmd("BLMOVE")
            .arg(&self.queue)
            .arg(&self.processing)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(timeout.as_secs_f64())
            .query(&mut self.conn)
            .map_err(|err| {
                if err.is_connection_dropped() {
                    BrokerError::ConnectionClosed
                } else {
                    BrokerError::Redis(err)
                }
            })?;

        Ok(payload.map(|payload| {
            self.next_tag += 1;
            self.unacked.insert(self.next_tag, payload.clone());
            Delivery {
                tag: self.next_tag,
                payload,
            }
        }))
    }

    fn ack(&mut self, tag: u64) -> Result<(), BrokerError> {
        let payload = self
            .unacked
            .remove(&tag)
            .ok_or(BrokerError::UnknownDelivery(tag))?;
        let removed: i64 = redis::cmd("LREM")
            .arg(&self.processing)
            .arg(1)
            .arg(payload)
            .query(&mut self.conn)?;
        if removed == 0 {
            warn!(processing = %self.processing, tag, "Acknowledged delivery was not in the processing list");
        }
        Ok(())
    }
}
