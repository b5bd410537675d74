//! Message broker interface: named queues, publish, consume with manual ack.

use std::time::Duration;

use crate::error::BrokerError;

/// One message handed to a consumer. Must be acknowledged by `tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: u64,
    pub payload: Vec<u8>,
}

pub trait Broker: Send + Sync {
    fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Open a consuming connection on `queue` for consumer `slot`.
    ///
    /// A consumer keeps its slot across reconnects; opening a slot first
    /// requeues whatever an earlier connection on it left unacknowledged.
    fn connect(&self, queue: &str, slot: usize) -> Result<Box<dyn BrokerConnection>, BrokerError>;
}

/// A consumer's connection.
///
/// Deliveries not acknowledged when the connection goes away are
/// redelivered to some consumer.
pub trait BrokerConnection: Send {
    /// Wait up to `timeout` for the next delivery.
    ///
    /// [`BrokerError::ConnectionClosed`] signals a broker-side shutdown.
    fn next_delivery(&mut self, timeout: Duration) -> Result<Option<Delivery>, BrokerError>;

    fn ack(&mut self, tag: u64) -> Result<(), BrokerError>;
}
