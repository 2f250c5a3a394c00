use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEYSPACE_PATH: &str = "/api/json/v1/default_keyspace";

fn client_for(server: &MockServer) -> DataApiClient {
    let info = ConnectionInfo::new(server.uri(), "AstraCS:test-token");
    DataApiClient::new(&info)
        .expect("client builds")
        .with_timeout(Duration::from_secs(5))
}

async fn blocking<T, F>(task: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .expect("blocking task should complete")
}

#[test]
fn builds_keyspace_url() {
    let info = ConnectionInfo::new("https://db-id-us-east1.apps.example.com/", "token")
        .with_keyspace("vectors");
    let client = DataApiClient::new(&info).expect("client builds");

    assert_eq!(
        client.keyspace_url().as_str(),
        "https://db-id-us-east1.apps.example.com/api/json/v1/vectors"
    );
}

#[test]
fn debug_output_hides_token() {
    let info = ConnectionInfo::new("https://db.example.com", "AstraCS:hidden");
    let client = DataApiClient::new(&info).expect("client builds");
    assert!(!format!("{:?}", client).contains("AstraCS:hidden"));
}

#[test]
fn rejects_invalid_connection_before_any_request() {
    let info = ConnectionInfo::new("", "token");
    assert!(matches!(
        DataApiClient::new(&info),
        Err(ProjectorError::Validation(_))
    ));
}

#[test]
fn find_command_shape() {
    let query = FindQuery::default()
        .with_projection(["$vector", "title"])
        .with_limit(Some(25))
        .with_page_state(Some("abc".to_string()));

    assert_eq!(
        find_command(&query),
        json!({
            "find": {
                "filter": {},
                "projection": {"$vector": true, "title": true},
                "options": {"limit": 25, "pageState": "abc"}
            }
        })
    );

    let bare = find_command(&FindQuery::default());
    assert_eq!(bare, json!({"find": {"filter": {}}}));
}

#[tokio::test]
async fn lists_collections_with_token_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(KEYSPACE_PATH))
        .and(header("Token", "AstraCS:test-token"))
        .and(body_partial_json(json!({"findCollections": {}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": {
                "collections": [
                    {"name": "articles", "options": {"vector": {"dimension": 3, "metric": "cosine"}}},
                    {"name": "plain", "options": {}},
                    {"name": "auto", "options": {"vector": {"service": {"provider": "nvidia"}}}}
                ]
            }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let collections = blocking(move || client.list_collections())
        .await
        .expect("collections listed");

    assert_eq!(collections.len(), 3);
    assert_eq!(
        collections[0].vector,
        Some(VectorOptions {
            dimension: Some(3),
            vectorize: false
        })
    );
    assert_eq!(collections[1].vector, None);
    assert_eq!(
        collections[2].vector,
        Some(VectorOptions {
            dimension: None,
            vectorize: true
        })
    );
}

#[tokio::test]
async fn lists_tables_in_declared_column_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(KEYSPACE_PATH))
        .and(body_partial_json(json!({"listTables": {}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": {
                "tables": [{
                    "name": "docs",
                    "definition": {
                        "columns": {
                            "id": {"type": "text"},
                            "embedding": {"type": "vector", "dimension": 3},
                            "title": {"type": "text"},
                            "summary_vec": {"type": "vector", "dimension": 8}
                        },
                        "primaryKey": {"partitionBy": ["id"], "partitionSort": {"created": 1}}
                    }
                }]
            }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let tables = blocking(move || client.list_tables())
        .await
        .expect("tables listed");

    assert_eq!(tables.len(), 1);
    let table = &tables[0];
    let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "embedding", "title", "summary_vec"]);
    assert!(table.columns[1].is_vector());
    assert_eq!(table.columns[3].dimension, Some(8));
    assert_eq!(table.partition_by, vec!["id".to_string()]);
    assert_eq!(table.partition_sort, vec!["created".to_string()]);
}

#[tokio::test]
async fn find_returns_documents_and_page_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/articles", KEYSPACE_PATH)))
        .and(body_partial_json(json!({"find": {"options": {"limit": 2}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "documents": [
                    {"_id": "a", "$vector": [0.1, 0.2]},
                    {"_id": "b", "$vector": [0.3, 0.4]}
                ],
                "nextPageState": "next-token"
            }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let page = blocking(move || {
        client.find(
            SourceKind::Collection,
            "articles",
            &FindQuery::default().with_limit(Some(2)),
        )
    })
    .await
    .expect("find succeeds");

    assert_eq!(page.documents.len(), 2);
    assert_eq!(page.documents[0]["_id"], json!("a"));
    assert_eq!(page.next_page_state.as_deref(), Some("next-token"));
}

#[tokio::test]
async fn estimated_count_reads_status_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/articles", KEYSPACE_PATH)))
        .and(body_partial_json(json!({"estimatedDocumentCount": {}})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": {"count": 1200}})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let count = blocking(move || client.estimated_count("articles"))
        .await
        .expect("count succeeds");

    assert_eq!(count, Some(1200));
}

#[tokio::test]
async fn unauthorized_status_maps_to_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = blocking(move || client.list_collections()).await;

    assert!(matches!(result, Err(ProjectorError::Auth(_))), "{:?}", result);
}

#[tokio::test]
async fn missing_collection_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{
                "message": "Collection does not exist, collection name: ghosts",
                "errorCode": "COLLECTION_NOT_EXIST"
            }]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = blocking(move || {
        client.find(SourceKind::Collection, "ghosts", &FindQuery::default())
    })
    .await;

    match result {
        Err(ProjectorError::SourceNotFound { kind, name }) => {
            assert_eq!(kind, SourceKind::Collection);
            assert_eq!(name, "ghosts");
        }
        other => panic!("expected SourceNotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn other_api_errors_are_upstream_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{"message": "Invalid filter expression", "errorCode": "INVALID_FILTER_EXPRESSION"}]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = blocking(move || client.find(SourceKind::Table, "docs", &FindQuery::default())).await;

    match result {
        Err(ProjectorError::Upstream(message)) => {
            assert!(message.contains("INVALID_FILTER_EXPRESSION"));
        }
        other => panic!("expected Upstream, got {:?}", other),
    }
}

#[test]
fn unreachable_endpoint_is_connection_error() {
    let info = ConnectionInfo::new("http://127.0.0.1:1", "token");
    let client = DataApiClient::new(&info)
        .expect("client builds")
        .with_timeout(Duration::from_secs(2));
    let result = client.list_tables();

    assert!(
        matches!(result, Err(ProjectorError::Connection(_))),
        "{:?}",
        result
    );
}
