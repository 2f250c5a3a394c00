use super::*;
use crate::dataapi::memory::table_definition;
use crate::dataapi::{
    CollectionDefinition, ColumnDefinition, Document, FindPage, FindQuery, InMemoryDatabase,
    VectorOptions,
};
use serde_json::{Value, json};

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture must be an object, got {}", other),
    }
}

struct RejectingDatabase;

impl VectorDatabase for RejectingDatabase {
    fn list_collections(&self) -> Result<Vec<CollectionDefinition>> {
        Err(ProjectorError::Auth("token rejected".to_string()))
    }

    fn list_tables(&self) -> Result<Vec<TableDefinition>> {
        Err(ProjectorError::Connection("unreachable".to_string()))
    }

    fn estimated_count(&self, _collection: &str) -> Result<Option<u64>> {
        Ok(None)
    }

    fn find(&self, _kind: SourceKind, _name: &str, _query: &FindQuery) -> Result<FindPage> {
        Ok(FindPage::default())
    }
}

#[test]
fn only_collections_with_a_dimension_are_listed() {
    let db = InMemoryDatabase::new()
        .with_collection(
            "articles",
            Some(3),
            vec![doc(json!({"_id": "a", "$vector": [0.1, 0.2, 0.3]}))],
        )
        .with_collection("vectorize_only", None, Vec::new())
        .with_plain_collection("settings", vec![doc(json!({"_id": "x"}))]);

    let collections = list_collections(&db).expect("should list collections");

    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0].name, "articles");
    assert_eq!(collections[0].dimension, 3);
    assert_eq!(collections[0].count, EstimatedCount::Known(1));
    assert!(collections.iter().all(|c| c.dimension > 0));
}

#[test]
fn failing_count_degrades_to_error_marker() {
    let db = InMemoryDatabase::new()
        .with_collection("articles", Some(2), Vec::new())
        .with_collection("products", Some(4), Vec::new())
        .with_failing_count("products");

    let collections = list_collections(&db).expect("should list collections");

    assert_eq!(collections[0].count, EstimatedCount::Known(0));
    assert_eq!(collections[1].count, EstimatedCount::Error);
}

#[test]
fn no_vector_collections_is_an_error() {
    let db = InMemoryDatabase::new().with_plain_collection("settings", Vec::new());

    let result = list_collections(&db);
    assert!(matches!(
        result,
        Err(ProjectorError::NoSources(SourceKind::Collection))
    ));
}

#[test]
fn connection_failures_propagate() {
    assert!(matches!(
        list_collections(&RejectingDatabase),
        Err(ProjectorError::Auth(_))
    ));
    assert!(matches!(
        list_tables(&RejectingDatabase),
        Err(ProjectorError::Connection(_))
    ));
}

#[test]
fn tables_report_vector_columns_and_keys() {
    let mut definition = table_definition("events", &["tenant"], "embedding", 4, &["kind"]);
    definition.partition_sort = vec!["ts".to_string()];
    definition.columns.push(ColumnDefinition {
        name: "pending".to_string(),
        column_type: "vector".to_string(),
        dimension: None,
    });

    let db = InMemoryDatabase::new()
        .with_table(definition, Vec::new())
        .with_table(
            TableDefinition {
                name: "plain".to_string(),
                columns: vec![ColumnDefinition {
                    name: "id".to_string(),
                    column_type: "text".to_string(),
                    dimension: None,
                }],
                partition_by: vec!["id".to_string()],
                partition_sort: Vec::new(),
            },
            Vec::new(),
        );

    let tables = list_tables(&db).expect("should list tables");

    assert_eq!(tables.len(), 1);
    let table = &tables[0];
    assert_eq!(table.name, "events");
    assert_eq!(
        table.vector_columns,
        vec![VectorColumn {
            name: "embedding".to_string(),
            dimension: 4
        }]
    );
    assert_eq!(table.primary_key_columns, vec!["tenant", "ts"]);
    assert_eq!(table.partition_key_columns, vec!["tenant"]);
    assert_eq!(table.count, EstimatedCount::NotAvailable);
}

#[test]
fn partition_keys_fall_back_to_primary_key() {
    let mut definition = table_definition("docs", &[], "embedding", 3, &["title"]);
    definition.partition_sort = vec!["id".to_string()];

    let table = describe_table(definition).expect("table has a vector column");
    assert_eq!(table.primary_key_columns, vec!["id"]);
    assert_eq!(table.partition_key_columns, vec!["id"]);
}

#[test]
fn no_vector_tables_is_an_error() {
    let result = list_tables(&InMemoryDatabase::new());
    assert!(matches!(
        result,
        Err(ProjectorError::NoSources(SourceKind::Table))
    ));
}

#[test]
fn vectorize_collections_need_a_reported_dimension() {
    let collection = |vector: Option<VectorOptions>| CollectionDefinition {
        name: "c".to_string(),
        vector,
    };

    assert_eq!(
        collection_dimension(&collection(Some(VectorOptions {
            dimension: Some(1024),
            vectorize: true,
        }))),
        Some(1024)
    );
    assert_eq!(
        collection_dimension(&collection(Some(VectorOptions {
            dimension: None,
            vectorize: true,
        }))),
        None
    );
    assert_eq!(
        collection_dimension(&collection(Some(VectorOptions {
            dimension: Some(0),
            vectorize: false,
        }))),
        None
    );
    assert_eq!(collection_dimension(&collection(None)), None);
}
