//! Content-extraction service interface.

use std::io::Read;

use crate::error::ExtractionError;

/// Text and metadata pulled out of a binary stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub text: String,
    /// Name/value pairs reported by the extractor (author, page count, ...)
    pub metadata: Vec<(String, String)>,
}

/// Turns binary content into indexable text.
pub trait Extractor: Send + Sync {
    fn extract(
        &self,
        stream: &mut dyn Read,
        resource_name: &str,
        content_type: &str,
    ) -> Result<Extracted, ExtractionError>;
}
