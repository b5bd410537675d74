//! # sitesearch-types
//!
//! Shared domain types for the sitesearch indexing system.
//!
//! - [`Task`]: immutable unit of indexing work with an as-of creation date
//! - [`TaskType`]: the eight kinds of work the queueing layer carries
//! - [`Settings`]: layered configuration (defaults, file, environment)

pub mod config;
pub mod error;
pub mod task;

pub use config::{BrokerSettings, QueueMode, QueueSettings, SearchSettings, Settings};
pub use error::{ConfigError, TaskError};
pub use task::{Task, TaskType, REFERENCE, SITE_ID};
