//! Distributed task queue for sitesearch.
//!
//! Replaces the local worker pools when several processes share one
//! search index: tasks are published to a broker queue and pulled by
//! consumer threads with at-least-once delivery.
//!
//! - [`BrokerSubmitter`]: a [`TaskSubmitter`](sitesearch_indexing::TaskSubmitter) that publishes
//! - [`BrokerConsumer`]: consumer threads feeding a [`TaskRunner`](sitesearch_indexing::TaskRunner)
//! - [`RedisBroker`]: Redis list transport
//! - [`MemoryBroker`]: in-process transport with the same ack contract

pub mod broker;
pub mod consumer;
pub mod error;
pub mod memory;
pub mod redis_queue;
pub mod submitter;

pub use broker::{Broker, BrokerConnection, Delivery};
pub use consumer::BrokerConsumer;
pub use error::BrokerError;
pub use memory::MemoryBroker;
pub use redis_queue::RedisBroker;
pub use submitter::BrokerSubmitter;
