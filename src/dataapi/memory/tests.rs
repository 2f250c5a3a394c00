use super::*;
use serde_json::json;

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture must be an object, got {}", other),
    }
}

fn numbered_rows(count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| doc(json!({"id": format!("row-{}", i), "title": format!("Title {}", i), "embedding": [i, 0, 1]})))
        .collect()
}

#[test]
fn pages_respect_limit_and_page_size() {
    let db = InMemoryDatabase::new()
        .with_page_size(3)
        .with_table(table_definition("docs", &["id"], "embedding", 3, &["title"]), numbered_rows(10));

    let first = db
        .find(SourceKind::Table, "docs", &FindQuery::default().with_limit(Some(5)))
        .expect("first page");
    assert_eq!(first.documents.len(), 3);
    assert_eq!(first.next_page_state.as_deref(), Some("3"));

    let second = db
        .find(
            SourceKind::Table,
            "docs",
            &FindQuery::default()
                .with_limit(Some(5))
                .with_page_state(first.next_page_state),
        )
        .expect("second page");
    assert_eq!(second.documents.len(), 2);
    assert_eq!(second.next_page_state, None);
    assert_eq!(second.documents[1]["id"], json!("row-4"));
}

#[test]
fn projection_keeps_id_for_collections() {
    let db = InMemoryDatabase::new().with_collection(
        "articles",
        Some(2),
        vec![doc(json!({"_id": "a", "$vector": [1.0, 2.0], "title": "A", "body": "long"}))],
    );

    let page = db
        .find(
            SourceKind::Collection,
            "articles",
            &FindQuery::default().with_projection(["$vector", "title"]),
        )
        .expect("find succeeds");

    let keys: Vec<&str> = page.documents[0].keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["_id", "$vector", "title"]);
}

#[test]
fn token_ranges_partition_rows() {
    let db = InMemoryDatabase::new()
        .with_table(table_definition("docs", &["id"], "embedding", 3, &[]), numbered_rows(50));

    let mut low_filter = Document::new();
    low_filter.insert("token(id)".to_string(), json!({"$gte": i64::MIN, "$lt": 0}));
    let mut high_filter = Document::new();
    high_filter.insert(
        "token(id)".to_string(),
        json!({"$gte": 0, "$lt": 9_223_372_036_854_775_808_u64}),
    );

    let low = db
        .find(SourceKind::Table, "docs", &FindQuery::default().with_filter(low_filter).with_limit(Some(100)))
        .expect("low half");
    let high = db
        .find(SourceKind::Table, "docs", &FindQuery::default().with_filter(high_filter).with_limit(Some(100)))
        .expect("high half");

    assert_eq!(low.documents.len() + high.documents.len(), 50);
}

#[test]
fn unknown_source_is_not_found() {
    let db = InMemoryDatabase::new();
    let result = db.find(SourceKind::Table, "missing", &FindQuery::default());
    assert!(matches!(
        result,
        Err(ProjectorError::SourceNotFound {
            kind: SourceKind::Table,
            ..
        })
    ));
}

#[test]
fn failing_count_is_reported() {
    let db = InMemoryDatabase::new()
        .with_collection("articles", Some(2), Vec::new())
        .with_failing_count("articles");

    assert!(db.estimated_count("articles").is_err());
}

#[test]
fn find_queries_are_recorded() {
    let db = InMemoryDatabase::new().with_collection("articles", Some(2), Vec::new());
    let clone = db.clone();

    clone
        .find(SourceKind::Collection, "articles", &FindQuery::default().with_limit(Some(4)))
        .expect("find succeeds");

    let queries = db.find_queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].limit, Some(4));
}

#[test]
fn wildcard_projection_returns_whole_row() {
    let db = InMemoryDatabase::new().with_collection(
        "articles",
        Some(2),
        vec![doc(json!({"_id": "a", "$vector": [1.0, 2.0], "title": "A"}))],
    );

    let page = db
        .find(
            SourceKind::Collection,
            "articles",
            &FindQuery::default().with_projection([WILDCARD_PROJECTION]),
        )
        .expect("find succeeds");

    assert_eq!(page.documents[0].len(), 3);
}
