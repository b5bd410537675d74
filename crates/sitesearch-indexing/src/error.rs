//! Error types for task handling.

use sitesearch_search::SearchError;
use sitesearch_types::TaskError;
use thiserror::Error;

/// Errors raised by content sources and the site directory.
#[derive(Error, Debug)]
pub enum ContentError {
    /// The reference does not resolve to any content
    #[error("Content not found: {0}")]
    NotFound(String),

    /// The reference resolves but may not be read
    #[error("Content not readable: {0}")]
    Unreadable(String),

    /// Backing store could not be reached
    #[error("Content unavailable: {0}")]
    Unavailable(String),

    /// Metadata or properties are malformed
    #[error("Invalid content: {0}")]
    Invalid(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContentError {
    /// Connectivity and I/O class failures that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            ContentError::Unavailable(_) => true,
            ContentError::Io(err) => io_is_transient(err),
            ContentError::NotFound(_) | ContentError::Unreadable(_) | ContentError::Invalid(_) => {
                false
            }
        }
    }
}

/// Errors raised by the content-extraction service.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// No extractor handles this content type
    #[error("Unsupported content type: {0}")]
    Unsupported(String),

    /// Extraction ran and failed on the content itself
    #[error("Extraction failed: {0}")]
    Failed(String),

    /// IO error while streaming content to the extractor
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExtractionError::Io(err) if io_is_transient(err))
    }
}

/// Non-retryable reason a task could not be handled.
#[derive(Error, Debug)]
pub enum HandlingError {
    /// Malformed task (missing property, unknown type tag)
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    /// No registered content source matches the reference
    #[error("No content source for reference {0}")]
    NoContentSource(String),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// The handler does not implement this task type
    #[error("Unsupported task: {0}")]
    Unsupported(String),

    /// Several non-retryable failures reported together
    #[error("{} failures: {}", .0.len(), join_messages(.0))]
    Multiple(Vec<HandlingError>),
}

impl HandlingError {
    /// Whether the underlying cause is a connectivity or I/O failure.
    ///
    /// Only meaningful at the executor boundary, where leaf errors are
    /// classified into retryable and non-retryable failures.
    pub fn is_transient(&self) -> bool {
        match self {
            HandlingError::Content(err) => err.is_transient(),
            HandlingError::Extraction(err) => err.is_transient(),
            HandlingError::Search(err) => err.is_transient(),
            _ => false,
        }
    }

    /// Collapse a list of errors: one error stays as is, more become `Multiple`.
    pub fn from_many(mut errors: Vec<HandlingError>) -> Option<HandlingError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(HandlingError::Multiple(errors)),
        }
    }
}

fn join_messages(errors: &[HandlingError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn io_is_transient(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    !matches!(
        err.kind(),
        ErrorKind::NotFound
            | ErrorKind::PermissionDenied
            | ErrorKind::InvalidInput
            | ErrorKind::InvalidData
            | ErrorKind::Unsupported
    )
}
