//! Splitting, idempotence and anti-regression properties.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use e2e_tests::{at, EngineOp, RecordingSubmitter, TestHarness};
use sitesearch_indexing::{TaskContext, TaskHandler, TaskResult};
use sitesearch_search::SearchEngine;
use sitesearch_types::{Task, TaskType};

fn handle(handler: &dyn TaskHandler, task: &Task) -> TaskResult {
    handler.handle(task, &TaskContext::elevated(task))
}

#[test]
fn test_site_split_covers_every_reference() {
    let harness = TestHarness::new();
    harness.add_site("siteA");
    for n in 0..25 {
        harness
            .content
            .put("siteA", &format!("doc{:02}", n), "Title", "body");
    }
    harness.content.put("siteB", "elsewhere", "Other", "body");

    let submitter = Arc::new(RecordingSubmitter::default());
    let splitter = harness.splitter(submitter.clone());
    let parent = Task::index_site("siteA", at(900));
    handle(&splitter, &parent).unwrap();

    let tasks = submitter.take();
    let (purges, documents): (Vec<&Task>, Vec<&Task>) = tasks
        .iter()
        .partition(|t| t.task_type() == TaskType::PurgeSiteDocuments);

    assert_eq!(documents.len(), 25);
    assert_eq!(purges.len(), 1);
    assert!(documents.iter().all(|t| t.task_type() == TaskType::IndexDocument));
    assert!(tasks.iter().all(|t| t.creation_date() == parent.creation_date()));
    // The purge trails every document task
    assert_eq!(tasks.last().map(Task::task_type), Some(TaskType::PurgeSiteDocuments));
}

#[test]
fn test_site_split_with_bad_item_still_purges() {
    let harness = TestHarness::new();
    harness.add_site("siteA");
    harness.content.put("siteA", "good", "Good", "body");
    harness.content.mark_unreadable("siteA");

    let submitter = Arc::new(RecordingSubmitter::default());
    let splitter = harness.splitter(submitter.clone());
    let parent = Task::index_site("siteA", at(10));

    assert!(handle(&splitter, &parent).is_err());
    assert_eq!(
        submitter.take(),
        vec![
            Task::index_document("good", at(10)),
            Task::purge_site_documents("siteA", at(10)),
        ]
    );
}

#[test]
fn test_refresh_enumerates_the_index() {
    let harness = TestHarness::new();
    harness.add_site("siteA");
    harness.content.put("siteA", "kept", "Kept", "body");
    harness.content.put("siteA", "gone", "Gone", "body");
    let dispatcher = harness.dispatcher();
    handle(&dispatcher, &Task::index_site("siteA", at(100))).unwrap();

    // Content changes behind the index's back
    harness.content.delete("gone");
    harness.content.put("siteA", "new", "New", "body");

    let submitter = Arc::new(RecordingSubmitter::default());
    let splitter = harness.splitter(submitter.clone());
    handle(&splitter, &Task::refresh_site("siteA", at(200))).unwrap();

    assert_eq!(
        submitter.take(),
        vec![
            Task::index_document("gone", at(200)),
            Task::index_document("kept", at(200)),
            Task::purge_site_documents("siteA", at(200)),
        ]
    );
}

#[test]
fn test_reindex_same_date_writes_once() {
    let harness = TestHarness::new();
    harness.content.put("siteA", "doc1", "Doc One", "body");
    let dispatcher = harness.dispatcher();
    let task = Task::index_document("doc1", at(500));

    handle(&dispatcher, &task).unwrap();
    handle(&dispatcher, &task).unwrap();

    assert_eq!(harness.engine.writes(), 1);
}

#[test]
fn test_older_remove_keeps_record() {
    let harness = TestHarness::new();
    harness.content.put("siteA", "doc1", "Doc One", "body");
    let dispatcher = harness.dispatcher();
    handle(&dispatcher, &Task::index_document("doc1", at(1_000))).unwrap();

    handle(&dispatcher, &Task::remove_document("doc1", at(999))).unwrap();
    assert_eq!(harness.stamp_of("doc1"), Some(at(1_000)));

    handle(&dispatcher, &Task::remove_document("doc1", at(1_001))).unwrap();
    assert_eq!(harness.stamp_of("doc1"), None);
}

#[test]
fn test_older_index_does_not_overwrite() {
    let harness = TestHarness::new();
    harness.content.put("siteA", "doc1", "Original", "body");
    let dispatcher = harness.dispatcher();
    handle(&dispatcher, &Task::index_document("doc1", at(1_000))).unwrap();

    harness.content.put("siteA", "doc1", "Edited", "body");
    handle(&dispatcher, &Task::index_document("doc1", at(900))).unwrap();

    let hits = harness.engine.search("original", 10).unwrap();
    let references: Vec<&str> = hits.iter().map(|hit| hit.reference.as_str()).collect();
    assert_eq!(references, vec!["doc1"]);
    assert!(!harness
        .engine
        .take_ops()
        .iter()
        .any(|op| matches!(op, EngineOp::Write { title, .. } if title == "Edited")));
}

#[test]
fn test_older_purge_spares_newer_records() {
    let harness = TestHarness::new();
    harness.add_site("siteA");
    harness.content.put("siteA", "a", "A", "body");
    harness.content.put("siteA", "b", "B", "body");
    let dispatcher = harness.dispatcher();

    handle(&dispatcher, &Task::index_document("a", at(100))).unwrap();
    handle(&dispatcher, &Task::index_document("b", at(300))).unwrap();
    handle(&dispatcher, &Task::purge_site_documents("siteA", at(200))).unwrap();

    assert_eq!(harness.stamp_of("a"), None);
    assert_eq!(harness.stamp_of("b"), Some(at(300)));
}
