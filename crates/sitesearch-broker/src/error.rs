//! Broker error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    /// Redis client error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The broker closed this connection; the consumer must reconnect
    #[error("Broker connection closed")]
    ConnectionClosed,

    /// Broker unreachable
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// Ack for a delivery this connection does not hold
    #[error("Unknown delivery tag: {0}")]
    UnknownDelivery(u64),
}

impl BrokerError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BrokerError::Redis(err) => {
                err.is_io_error() || err.is_connection_dropped() || err.is_timeout()
            }
            BrokerError::ConnectionClosed | BrokerError::Unavailable(_) => true,
            BrokerError::UnknownDelivery(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            BrokerError::Unavailable("refused".into()).to_string(),
            "Broker unavailable: refused"
        );
        assert_eq!(BrokerError::UnknownDelivery(7).to_string(), "Unknown delivery tag: 7");
    }

    #[test]
    fn test_transient() {
        assert!(BrokerError::ConnectionClosed.is_transient());
        assert!(!BrokerError::UnknownDelivery(1).is_transient());
    }
}
