use super::*;
use crate::dataapi::InMemoryDatabase;
use crate::dataapi::memory::table_definition;
use crate::source::SourceKind;
use serde_json::{Value, json};

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture must be an object, got {}", other),
    }
}

fn articles(count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| doc(json!({"_id": format!("a{}", i), "title": "T", "$vector": [i, 1]})))
        .collect()
}

fn docs_table_ref() -> SourceRef {
    SourceRef::Table {
        name: "docs".to_string(),
        vector_column: "embedding".to_string(),
        primary_key_columns: vec!["id".to_string()],
        partition_key_columns: Vec::new(),
    }
}

#[test]
fn sample_is_capped_at_page_size() {
    let db = InMemoryDatabase::new()
        .with_page_size(50)
        .with_collection("articles", Some(2), articles(25));

    let rows = sample(&db, &SourceRef::collection("articles")).expect("should sample");

    assert_eq!(rows.len(), SAMPLE_PAGE_SIZE);
    assert!(rows[0].contains_key("$vector"));
    assert!(rows[0].contains_key("title"));

    let queries = db.find_queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].limit, Some(SAMPLE_PAGE_SIZE));
}

#[test]
fn table_sample_returns_all_columns() {
    let db = InMemoryDatabase::new().with_table(
        table_definition("docs", &["id"], "embedding", 2, &["title"]),
        vec![doc(json!({"id": "1", "title": "One", "embedding": [0.5, 0.5]}))],
    );

    let rows = sample(&db, &docs_table_ref()).expect("should sample");

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].len(), 3);
    assert!(db.find_queries()[0].projection.is_none());
}

#[test]
fn rows_without_vector_are_kept_in_preview() {
    let mut rows = articles(3);
    rows[1].remove("$vector");
    let db = InMemoryDatabase::new().with_collection("articles", Some(2), rows);

    let sampled = sample(&db, &SourceRef::collection("articles")).expect("should sample");
    assert_eq!(sampled.len(), 3);
}

#[test]
fn empty_source_is_reported() {
    let db = InMemoryDatabase::new().with_collection("empty", Some(2), Vec::new());

    let result = sample(&db, &SourceRef::collection("empty"));
    assert!(matches!(result, Err(ProjectorError::EmptySample(name)) if name == "empty"));
}

#[test]
fn unknown_source_is_not_found() {
    let db = InMemoryDatabase::new();

    let result = sample(&db, &SourceRef::collection("missing"));
    assert!(matches!(
        result,
        Err(ProjectorError::SourceNotFound {
            kind: SourceKind::Collection,
            ..
        })
    ));
}

#[test]
fn blank_name_fails_before_querying() {
    let db = InMemoryDatabase::new();

    let result = sample(&db, &SourceRef::collection("  "));
    assert!(matches!(result, Err(ProjectorError::Validation(_))));
    assert!(db.find_queries().is_empty());
}
