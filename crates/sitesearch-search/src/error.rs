//! Search error types.

use thiserror::Error;

/// Errors that can occur during search engine operations.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Tantivy index error
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// Query parse error
    #[error("Query parse error: {0}")]
    QueryParse(#[from] tantivy::query::QueryParserError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema mismatch
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// No index at the given path
    #[error("No record index at {0}")]
    Missing(String),

    /// Writer mutex poisoned or held by another process
    #[error("Index is locked: {0}")]
    IndexLocked(String),

    /// Engine unreachable (remote engines, test doubles)
    #[error("Search engine unavailable: {0}")]
    Unavailable(String),

    /// Engine refused the request
    #[error("Search engine rejected request: {0}")]
    Rejected(String),
}

impl SearchError {
    /// Connectivity and I/O class failures that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::Io(_) | SearchError::IndexLocked(_) | SearchError::Unavailable(_) => {
                true
            }
            SearchError::Tantivy(err) => matches!(
                err,
                tantivy::TantivyError::IoError(_)
                    | tantivy::TantivyError::LockFailure(..)
                    | tantivy::TantivyError::Poisoned
                    | tantivy::TantivyError::ErrorInThread(_)
            ),
            SearchError::QueryParse(_)
            | SearchError::SchemaMismatch(_)
            | SearchError::Missing(_)
            | SearchError::Rejected(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let io = SearchError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(io.is_transient());
        assert!(SearchError::Unavailable("down".into()).is_transient());
        assert!(SearchError::IndexLocked("poisoned".into()).is_transient());
        assert!(!SearchError::Rejected("bad doc".into()).is_transient());
        assert!(!SearchError::SchemaMismatch("missing id".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = SearchError::Unavailable("connection refused".to_string());
        assert_eq!(
            err.to_string(),
            "Search engine unavailable: connection refused"
        );
    }
}
