//! Tantivy schema for indexed document records.
//!
//! One record per content identity. `date_stamp` holds the as-of time of the
//! task that wrote the record and drives every staleness-filtered delete.

use tantivy::schema::{Field, Schema, FAST, INDEXED, STORED, STRING, TEXT};

use crate::SearchError;

/// Schema field handles for efficient access
#[derive(Debug, Clone)]
pub struct SearchSchema {
    schema: Schema,
    /// Content identity, the record's primary key (STRING | STORED)
    pub id: Field,
    /// Reference string the record was built from (STRING | STORED)
    pub reference: Field,
    /// Owning site (STRING | STORED)
    pub site_id: Field,
    /// Container within the site (STRING | STORED)
    pub container: Field,
    /// Content type reported by the source (STRING | STORED)
    pub doc_type: Field,
    /// Tool that produced the content (STRING | STORED)
    pub tool: Field,
    /// Title (TEXT | STORED)
    pub title: Field,
    /// Link back to the content (STORED)
    pub url: Field,
    /// Flattened custom properties as `name=value` (STRING | STORED, multi-valued)
    pub property: Field,
    /// Full text (TEXT)
    pub contents: Field,
    /// As-of time in milliseconds (INDEXED | STORED | FAST)
    pub date_stamp: Field,
}

impl SearchSchema {
    /// Get the underlying Tantivy schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Create a SearchSchema from an existing Tantivy Schema
    pub fn from_schema(schema: Schema) -> Result<Self, SearchError> {
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| SearchError::SchemaMismatch(format!("missing {} field", name)))
        };

        Ok(Self {
            id: field("id")?,
            reference: field("reference")?,
            site_id: field("site_id")?,
            container: field("container")?,
            doc_type: field("doc_type")?,
            tool: field("tool")?,
            title: field("title")?,
            url: field("url")?,
            property: field("property")?,
            contents: field("contents")?,
            date_stamp: field("date_stamp")?,
            schema,
        })
    }
}

/// Build the document record schema.
pub fn build_record_schema() -> SearchSchema {
    let mut schema_builder = Schema::builder();

    let id = schema_builder.add_text_field("id", STRING | STORED);
    let reference = schema_builder.add_text_field("reference", STRING | STORED);
    let site_id = schema_builder.add_text_field("site_id", STRING | STORED);
    let container = schema_builder.add_text_field("container", STRING | STORED);
    let doc_type = schema_builder.add_text_field("doc_type", STRING | STORED);
    let tool = schema_builder.add_text_field("tool", STRING | STORED);
    let title = schema_builder.add_text_field("title", TEXT | STORED);
    let url = schema_builder.add_text_field("url", STORED);
    let property = schema_builder.add_text_field("property", STRING | STORED);
    let contents = schema_builder.add_text_field("contents", TEXT);
    let date_stamp = schema_builder.add_i64_field("date_stamp", INDEXED | STORED | FAST);

    let schema = schema_builder.build();

    SearchSchema {
        schema,
        id,
        reference,
        site_id,
        container,
        doc_type,
        tool,
        title,
        url,
        property,
        contents,
        date_stamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_schema() {
        let schema = build_record_schema();
        assert!(schema.schema.get_field("id").is_ok());
        assert!(schema.schema.get_field("date_stamp").is_ok());
        assert!(schema.schema.get_field("contents").is_ok());
    }

    #[test]
    fn test_from_schema() {
        let original = build_record_schema();
        let rebuilt = SearchSchema::from_schema(original.schema().clone()).unwrap();
        assert_eq!(rebuilt.id, original.id);
        assert_eq!(rebuilt.site_id, original.site_id);
        assert_eq!(rebuilt.date_stamp, original.date_stamp);
    }

    #[test]
    fn test_from_foreign_schema_fails() {
        let mut builder = Schema::builder();
        builder.add_text_field("doc_id", STRING | STORED);
        let err = SearchSchema::from_schema(builder.build()).unwrap_err();
        assert!(matches!(err, SearchError::SchemaMismatch(_)));
    }
}
