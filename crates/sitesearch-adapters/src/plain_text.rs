//! Extractor for text-like binary streams.

use std::io::Read;

use sitesearch_indexing::{Extracted, ExtractionError, Extractor};

/// Decodes text-like content as lossy UTF-8. Everything else is
/// [`ExtractionError::Unsupported`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn supports(content_type: &str) -> bool {
        let essence = content_type.split(';').next().unwrap_or("").trim();
        essence.starts_with("text/")
            || matches!(essence, "application/json" | "application/xml" | "application/javascript")
            || essence.ends_with("+xml")
            || essence.ends_with("+json")
    }
}

impl Extractor for PlainTextExtractor {
    fn extract(
        &self,
        stream: &mut dyn Read,
        _resource_name: &str,
        content_type: &str,
    ) -> Result<Extracted, ExtractionError> {
        if !Self::supports(content_type) {
            return Err(ExtractionError::Unsupported(content_type.to_string()));
        }

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf)?;
        Ok(Extracted {
            text: String::from_utf8_lossy(&buf).into_owned(),
            metadata: vec![("content_type".to_string(), content_type.to_string())],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_supports() {
        assert!(PlainTextExtractor::supports("text/plain; charset=utf-8"));
        assert!(PlainTextExtractor::supports("application/json"));
        assert!(PlainTextExtractor::supports("image/svg+xml"));
        assert!(!PlainTextExtractor::supports("application/pdf"));
    }

    #[test]
    fn test_extract_lossy() {
        let mut stream = Cursor::new(b"caf\xe9 au lait".to_vec());
        let extracted = PlainTextExtractor
            .extract(&mut stream, "/content/s/menu", "application/xml")
            .unwrap();
        assert!(extracted.text.starts_with("caf"));
        assert!(extracted.text.ends_with(" au lait"));
        assert_eq!(
            extracted.metadata,
            vec![("content_type".to_string(), "application/xml".to_string())]
        );
    }

    #[test]
    fn test_unsupported() {
        let mut stream = Cursor::new(vec![0u8; 4]);
        let err = PlainTextExtractor
            .extract(&mut stream, "/content/s/pic", "image/png")
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Unsupported(_)));
    }
}
