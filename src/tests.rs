use super::*;
use crate::source::SourceKind;

#[test]
fn status_codes_follow_error_class() {
    let cases = [
        (ProjectorError::validation("bad"), StatusCode::UNPROCESSABLE_ENTITY),
        (ProjectorError::Auth("denied".to_string()), StatusCode::BAD_REQUEST),
        (ProjectorError::Connection("down".to_string()), StatusCode::BAD_REQUEST),
        (
            ProjectorError::SourceNotFound {
                kind: SourceKind::Table,
                name: "docs".to_string(),
            },
            StatusCode::NOT_FOUND,
        ),
        (
            ProjectorError::NoSources(SourceKind::Collection),
            StatusCode::NOT_FOUND,
        ),
        (ProjectorError::NoMetadataKeys, StatusCode::NOT_FOUND),
        (
            ProjectorError::DimensionMismatch {
                row: 1,
                expected: 3,
                actual: 2,
            },
            StatusCode::BAD_REQUEST,
        ),
        (ProjectorError::Upstream("boom".to_string()), StatusCode::BAD_GATEWAY),
        (
            ProjectorError::Io(std::io::Error::other("disk full")),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (error, expected) in cases {
        assert_eq!(error.status_code(), expected, "status for {}", error);
    }
}

#[test]
fn messages_name_the_source() {
    let error = ProjectorError::SourceNotFound {
        kind: SourceKind::Collection,
        name: "articles".to_string(),
    };
    assert_eq!(error.to_string(), "Collection 'articles' not found");

    let error = ProjectorError::NoSources(SourceKind::Table);
    assert_eq!(
        error.to_string(),
        "No vector-enabled tables found in this keyspace"
    );
}
