//! Document mapping between [`IndexDocument`] records and Tantivy documents.
//!
//! Properties are stored flattened as `name=value` terms so that one
//! multi-valued field can hold any number of custom properties.

use chrono::{DateTime, TimeZone, Utc};
use tantivy::doc;
use tantivy::schema::Value;
use tantivy::TantivyDocument;

use crate::engine::IndexDocument;
use crate::schema::SearchSchema;

/// Convert a record to a Tantivy document.
pub fn record_to_doc(schema: &SearchSchema, record: &IndexDocument) -> TantivyDocument {
    let mut doc = doc!(
        schema.id => record.id.clone(),
        schema.reference => record.reference.clone(),
        schema.site_id => record.site_id.clone(),
        schema.container => record.container.clone(),
        schema.doc_type => record.doc_type.clone(),
        schema.tool => record.tool.clone(),
        schema.title => record.title.clone(),
        schema.url => record.url.clone(),
        schema.contents => record.contents.clone(),
        schema.date_stamp => record.date_stamp.timestamp_millis()
    );

    for (name, values) in &record.properties {
        for value in values {
            doc.add_text(schema.property, format!("{}={}", name, value));
        }
    }

    doc
}

/// Read a stored text field, empty when absent.
pub fn stored_text(doc: &TantivyDocument, field: tantivy::schema::Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

/// Read the stored `date_stamp` of a document.
pub fn stored_date_stamp(schema: &SearchSchema, doc: &TantivyDocument) -> Option<DateTime<Utc>> {
    doc.get_first(schema.date_stamp)
        .and_then(|v| v.as_i64())
        .and_then(millis_to_datetime)
}

pub(crate) fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::build_record_schema;
    use std::collections::{BTreeMap, BTreeSet};

    fn sample_record() -> IndexDocument {
        let mut properties = BTreeMap::new();
        properties.insert(
            "tags".to_string(),
            BTreeSet::from(["alpha".to_string(), "beta".to_string()]),
        );
        IndexDocument {
            id: "doc-1".to_string(),
            reference: "/content/siteA/notes.txt".to_string(),
            site_id: "siteA".to_string(),
            container: "/content/siteA/".to_string(),
            doc_type: "text/plain".to_string(),
            tool: "content".to_string(),
            title: "notes.txt".to_string(),
            url: "file:///srv/siteA/notes.txt".to_string(),
            properties,
            contents: "meeting notes about the budget".to_string(),
            date_stamp: Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
        }
    }

    #[test]
    fn test_record_to_doc() {
        let schema = build_record_schema();
        let doc = record_to_doc(&schema, &sample_record());

        assert_eq!(stored_text(&doc, schema.id), "doc-1");
        assert_eq!(stored_text(&doc, schema.site_id), "siteA");
        assert_eq!(
            stored_date_stamp(&schema, &doc).map(|d| d.timestamp_millis()),
            Some(1_700_000_000_123)
        );
    }

    #[test]
    fn test_properties_flattened() {
        let schema = build_record_schema();
        let doc = record_to_doc(&schema, &sample_record());

        let props: Vec<String> = doc
            .get_all(schema.property)
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect();
        assert_eq!(props, vec!["tags=alpha", "tags=beta"]);
    }

    #[test]
    fn test_missing_field_reads_empty() {
        let schema = build_record_schema();
        let doc = TantivyDocument::default();
        assert_eq!(stored_text(&doc, schema.title), "");
        assert!(stored_date_stamp(&schema, &doc).is_none());
    }
}
