use super::*;
use httpmock::prelude::*;
use reqwest::Client;
use reqwest_middleware::ClientBuilder;
use serde_json::json;

fn auth_for(server: &MockServer) -> FirebaseAuth {
    let client = ClientBuilder::new(Client::new()).build();
    FirebaseAuth::new_with_client(client, server.url("/v1/projects/test-project"))
}

#[tokio::test]
async fn test_get_user_counts_linked_providers() {
    let server = MockServer::start();
    let auth = auth_for(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/test-project/accounts:lookup")
            .json_body(json!({ "localId": ["user-1"] }));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "users": [{
                    "localId": "user-1",
                    "email": "reader@example.com",
                    "providerUserInfo": [
                        { "providerId": "password", "email": "reader@example.com" }
                    ]
                }]
            }));
    });

    let user = auth.get_user("user-1").await.unwrap();
    assert_eq!(user.local_id, "user-1");
    assert_eq!(user.provider_count(), 1);
    assert!(!user.is_anonymous());

    mock.assert();
}

#[tokio::test]
async fn test_get_user_without_providers_is_anonymous() {
    let server = MockServer::start();
    let auth = auth_for(&server);

    server.mock(|when, then| {
        when.method(POST).path("/v1/projects/test-project/accounts:lookup");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({ "users": [{ "localId": "anon-1" }] }));
    });

    let user = auth.get_user("anon-1").await.unwrap();
    assert!(user.is_anonymous());
}

#[tokio::test]
async fn test_get_user_empty_lookup_is_not_found() {
    let server = MockServer::start();
    let auth = auth_for(&server);

    server.mock(|when, then| {
        when.method(POST).path("/v1/projects/test-project/accounts:lookup");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({ "kind": "identitytoolkit#GetAccountInfoResponse" }));
    });

    let result = auth.get_user("gone").await;
    assert!(matches!(result, Err(AuthError::UserNotFound)));
}

#[tokio::test]
async fn test_delete_user() {
    let server = MockServer::start();
    let auth = auth_for(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/test-project/accounts:delete")
            .json_body(json!({ "localId": "anon-1" }));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({}));
    });

    auth.delete_user("anon-1").await.unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_delete_missing_user_maps_to_user_not_found() {
    let server = MockServer::start();
    let auth = auth_for(&server);

    server.mock(|when, then| {
        when.method(POST).path("/v1/projects/test-project/accounts:delete");
        then.status(400)
            .header("content-type", "application/json")
            .json_body(json!({
                "error": { "code": 400, "message": "USER_NOT_FOUND", "errors": [] }
            }));
    });

    let result = auth.delete_user("gone").await;
    assert!(matches!(result, Err(AuthError::UserNotFound)));
}

#[tokio::test]
async fn test_delete_user_other_failure_is_api_error() {
    let server = MockServer::start();
    let auth = auth_for(&server);

    server.mock(|when, then| {
        when.method(POST).path("/v1/projects/test-project/accounts:delete");
        then.status(403)
            .header("content-type", "application/json")
            .json_body(json!({
                "error": { "code": 403, "message": "PERMISSION_DENIED", "status": "PERMISSION_DENIED" }
            }));
    });

    match auth.delete_user("anon-1").await {
        Err(AuthError::ApiError(msg)) => assert!(msg.contains("PERMISSION_DENIED")),
        other => panic!("unexpected result: {:?}", other.err()),
    }
}

#[tokio::test]
async fn test_create_anonymous_user() {
    let server = MockServer::start();
    let auth = auth_for(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/test-project/accounts")
            .json_body(json!({}));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({ "kind": "identitytoolkit#SignupNewUserResponse", "localId": "new-anon" }));
    });

    let uid = auth.create_user(CreateUserRequest::default()).await.unwrap();
    assert_eq!(uid, "new-anon");
    mock.assert();
}
