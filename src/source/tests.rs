use super::*;
use serde_json::json;

fn docs_table() -> TableDescriptor {
    TableDescriptor {
        name: "docs".to_string(),
        vector_columns: vec![VectorColumn {
            name: "embedding".to_string(),
            dimension: 3,
        }],
        primary_key_columns: vec!["id".to_string()],
        partition_key_columns: Vec::new(),
        count: EstimatedCount::NotAvailable,
    }
}

#[test]
fn keyspace_defaults_when_absent_or_blank() {
    let info = ConnectionInfo::new("https://db.example.com", "token");
    assert_eq!(info.keyspace(), DEFAULT_KEYSPACE);

    let blank = info.clone().with_keyspace("   ");
    assert_eq!(blank.keyspace(), DEFAULT_KEYSPACE);

    let named = info.with_keyspace("vectors");
    assert_eq!(named.keyspace(), "vectors");
}

#[test]
fn debug_output_redacts_token() {
    let info = ConnectionInfo::new("https://db.example.com", "AstraCS:secret-value");
    let rendered = format!("{:?}", info);
    assert!(!rendered.contains("secret-value"));
    assert!(rendered.contains("<redacted>"));
}

#[test]
fn connection_validation() {
    assert!(
        ConnectionInfo::new("https://db.example.com", "token")
            .validate()
            .is_ok()
    );

    let missing_token = ConnectionInfo::new("https://db.example.com", " ");
    assert!(matches!(
        missing_token.validate(),
        Err(ProjectorError::Validation(_))
    ));

    let bad_url = ConnectionInfo::new("not a url", "token");
    assert!(matches!(bad_url.validate(), Err(ProjectorError::Validation(_))));

    let bad_scheme = ConnectionInfo::new("ftp://db.example.com", "token");
    assert!(matches!(
        bad_scheme.validate(),
        Err(ProjectorError::Validation(_))
    ));
}

#[test]
fn estimated_count_serialization() {
    assert_eq!(
        serde_json::to_value(EstimatedCount::Known(12)).expect("serializes"),
        json!(12)
    );
    assert_eq!(
        serde_json::to_value(EstimatedCount::NotAvailable).expect("serializes"),
        json!("N/A")
    );
    assert_eq!(
        serde_json::to_value(EstimatedCount::Error).expect("serializes"),
        json!("Error")
    );

    let parsed: EstimatedCount = serde_json::from_value(json!("Error")).expect("parses");
    assert_eq!(parsed, EstimatedCount::Error);
    let parsed: EstimatedCount = serde_json::from_value(json!(7)).expect("parses");
    assert_eq!(parsed, EstimatedCount::Known(7));
}

#[test]
fn table_partition_keys_fall_back_to_primary_key() {
    let mut table = docs_table();
    assert_eq!(table.partition_keys(), ["id".to_string()]);

    table.partition_key_columns = vec!["tenant".to_string()];
    assert_eq!(table.partition_keys(), ["tenant".to_string()]);
}

#[test]
fn table_source_ref_carries_keys() {
    let source = docs_table().source_ref("embedding");

    assert_eq!(source.kind(), SourceKind::Table);
    assert_eq!(source.vector_field(), "embedding");
    assert_eq!(source.key_columns(), vec!["id"]);
    assert_eq!(source.partition_keys(), ["id".to_string()]);
    assert!(source.validate().is_ok());
}

#[test]
fn collection_source_ref_uses_reserved_fields() {
    let source = SourceRef::collection("articles");

    assert_eq!(source.vector_field(), COLLECTION_VECTOR_FIELD);
    assert_eq!(source.key_columns(), vec![COLLECTION_ID_FIELD]);
    assert!(source.partition_keys().is_empty());
}

#[test]
fn source_ref_validation_rejects_incomplete_tables() {
    let no_column = SourceRef::Table {
        name: "docs".to_string(),
        vector_column: String::new(),
        primary_key_columns: vec!["id".to_string()],
        partition_key_columns: Vec::new(),
    };
    assert!(matches!(
        no_column.validate(),
        Err(ProjectorError::Validation(_))
    ));

    let no_keys = SourceRef::Table {
        name: "docs".to_string(),
        vector_column: "embedding".to_string(),
        primary_key_columns: Vec::new(),
        partition_key_columns: Vec::new(),
    };
    assert!(matches!(no_keys.validate(), Err(ProjectorError::Validation(_))));

    assert!(matches!(
        SourceRef::collection("").validate(),
        Err(ProjectorError::Validation(_))
    ));
}

#[test]
fn source_ref_wire_format() {
    let parsed: SourceRef = serde_json::from_value(json!({
        "kind": "table",
        "name": "docs",
        "vector_column": "embedding",
        "primary_key_columns": ["id"]
    }))
    .expect("table ref parses");

    assert_eq!(parsed.name(), "docs");
    assert_eq!(parsed.partition_keys(), ["id".to_string()]);
}
