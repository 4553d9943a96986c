use super::models::{FieldOperator, Fields, Value};
use super::query::Query;
use super::{FirebaseFirestore, FirestoreError};
use chrono::{TimeZone, Utc};
use httpmock::prelude::*;
use reqwest::Client;
use reqwest_middleware::ClientBuilder;
use serde_json::json;

const ROOT: &str = "/v1/projects/p/databases/(default)/documents";

fn db_for(server: &MockServer) -> FirebaseFirestore {
    let client = ClientBuilder::new(Client::new()).build();
    FirebaseFirestore::new_with_client(client, server.url(ROOT))
}

fn tracker_fields() -> Fields {
    Fields::from([
        ("isAnonymous".to_string(), Value::boolean(true)),
        (
            "lastActiveAt".to_string(),
            Value::timestamp(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        ),
    ])
}

#[tokio::test]
async fn test_list_documents_reads_typed_fields_across_pages() {
    let server = MockServer::start();
    let db = db_for(&server);

    let second = server.mock(|when, then| {
        when.method(GET)
            .path(format!("{}/users", ROOT))
            .query_param("pageToken", "next");
        then.status(200).json_body(json!({
            "documents": [{
                "name": "projects/p/databases/(default)/documents/users/u2",
                "fields": { "photoURL": { "nullValue": null } },
                "createTime": "2024-01-02T00:00:00Z"
            }]
        }));
    });
    let first = server.mock(|when, then| {
        when.method(GET)
            .path(format!("{}/users", ROOT))
            .query_param("pageSize", "300")
            .query_param_missing("pageToken");
        then.status(200).json_body(json!({
            "documents": [{
                "name": "projects/p/databases/(default)/documents/users/u1",
                "fields": {
                    "photoURL": { "stringValue": "avatars/u1/a.jpg" },
                    "lastActiveAt": { "timestampValue": "2024-01-01T00:00:00Z" }
                },
                "createTime": "2024-01-01T00:00:00Z",
                "updateTime": "2024-01-01T00:00:00Z"
            }],
            "nextPageToken": "next"
        }));
    });

    let docs = db.collection("users").list_documents(false).await.unwrap();

    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].relative_path(), "users/u1");
    assert_eq!(docs[0].fields["photoURL"].as_str(), Some("avatars/u1/a.jpg"));
    assert_eq!(
        docs[0].fields["lastActiveAt"].as_timestamp(),
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    );
    assert_eq!(docs[1].id(), "u2");
    assert_eq!(docs[1].fields["photoURL"].as_str(), None);
    first.assert();
    second.assert();
}

#[tokio::test]
async fn test_create_posts_with_document_id() {
    let server = MockServer::start();
    let db = db_for(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{}/users/u1/tracker", ROOT))
            .query_param("documentId", "status")
            .json_body(json!({
                "fields": {
                    "isAnonymous": { "booleanValue": true },
                    "lastActiveAt": { "timestampValue": "2024-01-01T00:00:00.000000Z" }
                }
            }));
        then.status(200).json_body(json!({
            "name": "projects/p/databases/(default)/documents/users/u1/tracker/status",
            "createTime": "2024-01-01T00:00:00Z",
            "updateTime": "2024-01-01T00:00:00Z"
        }));
    });

    db.doc("users/u1/tracker/status").create(&tracker_fields()).await.unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_create_existing_document_is_already_exists() {
    let server = MockServer::start();
    let db = db_for(&server);

    server.mock(|when, then| {
        when.method(POST).path(format!("{}/users/u1/tracker", ROOT));
        then.status(409).json_body(json!({
            "error": { "code": 409, "message": "Document already exists", "status": "ALREADY_EXISTS" }
        }));
    });

    let result = db.doc("users/u1/tracker/status").create(&tracker_fields()).await;
    assert!(matches!(result, Err(FirestoreError::AlreadyExists(path)) if path == "users/u1/tracker/status"));
}

#[tokio::test]
async fn test_update_fields_sends_mask_and_precondition() {
    let server = MockServer::start();
    let db = db_for(&server);

    let mock = server.mock(|when, then| {
        when.method(PATCH)
            .path(format!("{}/users/u1/tracker/status", ROOT))
            .query_param("updateMask.fieldPaths", "isAnonymous")
            .query_param("currentDocument.exists", "true")
            .json_body(json!({ "fields": { "isAnonymous": { "booleanValue": false } } }));
        then.status(200).json_body(json!({
            "name": "projects/p/databases/(default)/documents/users/u1/tracker/status"
        }));
    });

    let fields = Fields::from([("isAnonymous".to_string(), Value::boolean(false))]);
    db.doc("users/u1/tracker/status").update_fields(&fields).await.unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_update_missing_document_is_not_found() {
    let server = MockServer::start();
    let db = db_for(&server);

    server.mock(|when, then| {
        when.method(PATCH).path(format!("{}/users/u1/tracker/status", ROOT));
        then.status(404).json_body(json!({
            "error": { "code": 404, "message": "No document to update", "status": "NOT_FOUND" }
        }));
    });

    let fields = Fields::from([("isAnonymous".to_string(), Value::boolean(false))]);
    let result = db.doc("users/u1/tracker/status").update_fields(&fields).await;
    assert!(matches!(result, Err(FirestoreError::NotFound(_))));
}

#[tokio::test]
async fn test_collection_group_query() {
    let server = MockServer::start();
    let db = db_for(&server);
    let cutoff = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{}:runQuery", ROOT))
            .json_body(json!({
                "structuredQuery": {
                    "from": [{ "collectionId": "tracker", "allDescendants": true }],
                    "where": {
                        "compositeFilter": {
                            "op": "AND",
                            "filters": [
                                { "fieldFilter": {
                                    "field": { "fieldPath": "isAnonymous" },
                                    "op": "EQUAL",
                                    "value": { "booleanValue": true }
                                } },
                                { "fieldFilter": {
                                    "field": { "fieldPath": "lastActiveAt" },
                                    "op": "LESS_THAN",
                                    "value": { "timestampValue": "2024-01-01T00:00:00.000000Z" }
                                } }
                            ]
                        }
                    }
                }
            }));
        then.status(200).json_body(json!([
            {
                "document": {
                    "name": "projects/p/databases/(default)/documents/users/a1/tracker/status",
                    "fields": { "isAnonymous": { "booleanValue": true } },
                    "createTime": "2023-01-01T00:00:00Z",
                    "updateTime": "2023-01-01T00:00:00Z"
                },
                "readTime": "2024-02-01T00:00:00Z"
            },
            {
                "document": {
                    "name": "projects/p/databases/(default)/documents/users/a2/tracker/status",
                    "fields": { "isAnonymous": { "booleanValue": true } },
                    "createTime": "2023-01-01T00:00:00Z",
                    "updateTime": "2023-01-01T00:00:00Z"
                },
                "readTime": "2024-02-01T00:00:00Z"
            },
            { "readTime": "2024-02-01T00:00:00Z" }
        ]));
    });

    let query = Query::collection_group("tracker")
        .where_value("isAnonymous", FieldOperator::Equal, Value::boolean(true))
        .where_value("lastActiveAt", FieldOperator::LessThan, Value::timestamp(cutoff));

    let docs = db.query(query).get().await.unwrap();
    let paths: Vec<&str> = docs.iter().map(|d| d.relative_path()).collect();
    assert_eq!(paths, vec!["users/a1/tracker/status", "users/a2/tracker/status"]);
    mock.assert();
}

#[tokio::test]
async fn test_delete_recursive_removes_children_then_parent() {
    let server = MockServer::start();
    let db = db_for(&server);

    server.mock(|when, then| {
        when.method(POST).path(format!("{}/users/u1:listCollectionIds", ROOT));
        then.status(200).json_body(json!({ "collectionIds": ["tracker"] }));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path(format!("{}/users/u1/tracker", ROOT))
            .query_param("showMissing", "true");
        then.status(200).json_body(json!({
            "documents": [{
                "name": "projects/p/databases/(default)/documents/users/u1/tracker/status",
                "createTime": "2023-01-01T00:00:00Z",
                "updateTime": "2023-01-01T00:00:00Z"
            }]
        }));
    });
    server.mock(|when, then| {
        when.method(POST).path(format!("{}/users/u1/tracker/status:listCollectionIds", ROOT));
        then.status(200).json_body(json!({}));
    });
    let delete_child = server.mock(|when, then| {
        when.method(DELETE).path(format!("{}/users/u1/tracker/status", ROOT));
        then.status(200).json_body(json!({}));
    });
    let delete_parent = server.mock(|when, then| {
        when.method(DELETE).path(format!("{}/users/u1", ROOT));
        then.status(200).json_body(json!({}));
    });

    let deleted = db.doc("users/u1").delete_recursive().await.unwrap();
    assert_eq!(deleted, 2);
    delete_child.assert();
    delete_parent.assert();
}
