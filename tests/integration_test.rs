// Integration tests for the Webflow proxy
//
// These tests drive the credential manager against a stub token endpoint and
// the full router against a stub CMS.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use webflow_proxy::{
    auth::{
        CredentialError, CredentialManager, CredentialRecord, CredentialState, CredentialStore,
        MemoryStore, OAuthClient, OAuthSettings, SqliteStore,
    },
    http_client::CmsHttpClient,
    routes::{self, AppState},
};

const KEY: &str = "webflow:oauth:token";
const TOKEN_PATH: &str = "/oauth/access_token";

// ==================================================================================================
// Test Helpers
// ==================================================================================================

fn oauth_client(server: &ServerGuard) -> OAuthClient {
    OAuthClient::new(
        OAuthSettings {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uri: "http://localhost:8000/auth/callback".to_string(),
            scope: "cms:read cms:write".to_string(),
            authorize_url: "https://webflow.com/oauth/authorize".to_string(),
            token_url: format!("{}{}", server.url(), TOKEN_PATH),
        },
        5,
    )
    .expect("Failed to create OAuth client")
}

fn manager_with(server: &ServerGuard, store: Arc<dyn CredentialStore>) -> CredentialManager {
    CredentialManager::new(store, KEY, oauth_client(server), 300)
}

fn put_record(store: &dyn CredentialStore, record: &CredentialRecord) {
    store
        .set(KEY, &serde_json::to_string(record).unwrap())
        .unwrap();
}

fn stored_record(store: &dyn CredentialStore) -> Option<CredentialRecord> {
    store
        .get(KEY)
        .unwrap()
        .map(|json| serde_json::from_str(&json).unwrap())
}

fn expired_record(access: &str, refresh: Option<&str>) -> CredentialRecord {
    CredentialRecord {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        expires_at: Some(Utc::now() - Duration::seconds(30)),
    }
}

async fn exchange_mock(server: &mut ServerGuard, code: &str, body: &str, status: usize) -> Mock {
    server
        .mock("POST", TOKEN_PATH)
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), code.into()),
            Matcher::UrlEncoded(
                "redirect_uri".into(),
                "http://localhost:8000/auth/callback".into(),
            ),
        ]))
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

async fn refresh_mock(server: &mut ServerGuard, refresh_token: &str, body: &str, status: usize) -> Mock {
    server
        .mock("POST", TOKEN_PATH)
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), refresh_token.into()),
            Matcher::UrlEncoded("client_id".into(), "client-id".into()),
        ]))
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

/// Any token endpoint call at all; used with expect(0)
async fn no_token_calls(server: &mut ServerGuard) -> Mock {
    server
        .mock("POST", TOKEN_PATH)
        .with_status(500)
        .expect(0)
        .create_async()
        .await
}

fn build_test_app(server: &ServerGuard, store: Arc<dyn CredentialStore>) -> Router {
    let credentials = manager_with(server, store);
    let cms_client = Arc::new(
        CmsHttpClient::new(credentials.clone(), &server.url(), 5, 5)
            .expect("Failed to create CMS client"),
    );
    let state = AppState {
        proxy_api_key: None,
        credentials,
        cms_client,
    };

    Router::new()
        .merge(routes::health_routes())
        .merge(routes::auth_routes(state.clone()))
        .merge(routes::cms_routes(state))
}

async fn parse_json_body(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ==================================================================================================
// Authorization Code Exchange
// ==================================================================================================

#[tokio::test]
async fn test_complete_authorization_then_serves_token_offline() {
    let mut server = mockito::Server::new_async().await;
    let exchange = exchange_mock(
        &mut server,
        "abc123",
        r#"{"access_token":"T1","refresh_token":"R1","expires_in":3600}"#,
        200,
    )
    .await;

    let store = Arc::new(MemoryStore::new());
    let manager = manager_with(&server, store.clone());

    assert_eq!(manager.state().unwrap(), CredentialState::Unauthenticated);
    manager.complete_authorization("abc123").await.unwrap();
    assert_eq!(manager.state().unwrap(), CredentialState::Authorized);

    // Repeated reads never touch the token endpoint again
    for _ in 0..3 {
        assert_eq!(manager.get_valid_token().await.unwrap(), "T1");
    }
    exchange.assert_async().await;

    let record = stored_record(store.as_ref()).unwrap();
    assert_eq!(record.refresh_token.as_deref(), Some("R1"));
    let expires_at = record.expires_at.unwrap();
    let lifetime = expires_at - Utc::now();
    assert!(lifetime > Duration::seconds(3500) && lifetime <= Duration::seconds(3600));
}

#[tokio::test]
async fn test_invalid_code_leaves_record_unchanged() {
    let mut server = mockito::Server::new_async().await;
    exchange_mock(
        &mut server,
        "bad-code",
        r#"{"error":"invalid_grant","error_description":"code expired"}"#,
        400,
    )
    .await;

    let store = Arc::new(MemoryStore::new());
    let existing = CredentialRecord {
        access_token: "T0".to_string(),
        refresh_token: Some("R0".to_string()),
        expires_at: None,
    };
    put_record(store.as_ref(), &existing);
    let manager = manager_with(&server, store.clone());

    let err = manager.complete_authorization("bad-code").await.unwrap_err();
    match err {
        CredentialError::UpstreamAuthError { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert_eq!(stored_record(store.as_ref()), Some(existing));
}

// ==================================================================================================
// Refresh Lifecycle
// ==================================================================================================

#[tokio::test]
async fn test_expired_token_refreshes_once() {
    let mut server = mockito::Server::new_async().await;
    let refresh = refresh_mock(
        &mut server,
        "R1",
        r#"{"access_token":"T2","refresh_token":"R2","expires_in":3600}"#,
        200,
    )
    .await;

    let store = Arc::new(MemoryStore::new());
    put_record(store.as_ref(), &expired_record("T1", Some("R1")));
    let manager = manager_with(&server, store.clone());

    assert_eq!(manager.state().unwrap(), CredentialState::Expired);
    assert_eq!(manager.get_valid_token().await.unwrap(), "T2");
    assert_eq!(manager.get_valid_token().await.unwrap(), "T2");
    refresh.assert_async().await;

    let record = stored_record(store.as_ref()).unwrap();
    assert_eq!(record.access_token, "T2");
    assert_eq!(record.refresh_token.as_deref(), Some("R2"));
}

#[tokio::test]
async fn test_rejected_refresh_requires_reauthorization() {
    let mut server = mockito::Server::new_async().await;
    let refresh = refresh_mock(
        &mut server,
        "R1",
        r#"{"error":"invalid_grant"}"#,
        400,
    )
    .await;

    let store = Arc::new(MemoryStore::new());
    put_record(store.as_ref(), &expired_record("T1", Some("R1")));
    let manager = manager_with(&server, store.clone());

    assert_eq!(
        manager.get_valid_token().await,
        Err(CredentialError::ReauthorizationRequired)
    );
    // The dead record is not reused and no second refresh is attempted
    assert_eq!(
        manager.get_valid_token().await,
        Err(CredentialError::ReauthorizationRequired)
    );
    refresh.assert_async().await;

    assert_eq!(manager.state().unwrap(), CredentialState::Expired);
    let record = stored_record(store.as_ref()).unwrap();
    assert!(record.refresh_token.is_none());
}

#[tokio::test]
async fn test_expired_without_refresh_token_makes_no_network_call() {
    let mut server = mockito::Server::new_async().await;
    let guard = no_token_calls(&mut server).await;

    let store = Arc::new(MemoryStore::new());
    put_record(store.as_ref(), &expired_record("T1", None));
    let manager = manager_with(&server, store);

    assert_eq!(
        manager.get_valid_token().await,
        Err(CredentialError::ReauthorizationRequired)
    );
    guard.assert_async().await;
}

#[tokio::test]
async fn test_upstream_failure_forces_refresh_of_valid_token() {
    let mut server = mockito::Server::new_async().await;
    let refresh = refresh_mock(
        &mut server,
        "R1",
        r#"{"access_token":"T2","refresh_token":"R2","expires_in":3600}"#,
        200,
    )
    .await;

    let store = Arc::new(MemoryStore::new());
    put_record(
        store.as_ref(),
        &CredentialRecord {
            access_token: "T1".to_string(),
            refresh_token: Some("R1".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        },
    );
    let manager = manager_with(&server, store);

    assert_eq!(manager.get_valid_token().await.unwrap(), "T1");
    manager.handle_upstream_auth_failure().unwrap();
    assert_eq!(manager.state().unwrap(), CredentialState::Expired);

    assert_eq!(manager.get_valid_token().await.unwrap(), "T2");
    assert_eq!(manager.state().unwrap(), CredentialState::Authorized);
    refresh.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_refresh() {
    let mut server = mockito::Server::new_async().await;
    // Slow token endpoint so every caller arrives while the refresh is pending
    let refresh = server
        .mock("POST", TOKEN_PATH)
        .match_body(Matcher::UrlEncoded("refresh_token".into(), "R1".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body_from_request(|_| {
            std::thread::sleep(std::time::Duration::from_millis(200));
            br#"{"access_token":"T2","refresh_token":"R2","expires_in":3600}"#.to_vec()
        })
        .expect(1)
        .create_async()
        .await;

    let store = Arc::new(MemoryStore::new());
    put_record(store.as_ref(), &expired_record("T1", Some("R1")));
    let manager = manager_with(&server, store.clone());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.get_valid_token().await })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        assert_eq!(result.unwrap().unwrap(), "T2");
    }

    refresh.assert_async().await;
    assert_eq!(
        stored_record(store.as_ref()).unwrap().refresh_token.as_deref(),
        Some("R2")
    );
}

#[tokio::test]
async fn test_full_lifecycle_scenario() {
    let mut server = mockito::Server::new_async().await;
    let exchange = exchange_mock(
        &mut server,
        "abc123",
        r#"{"access_token":"T1","refresh_token":"R1","expires_in":3600}"#,
        200,
    )
    .await;
    let refresh = refresh_mock(
        &mut server,
        "R1",
        r#"{"access_token":"T2","refresh_token":"R2","expires_in":3600}"#,
        200,
    )
    .await;

    let store = Arc::new(MemoryStore::new());
    let manager = manager_with(&server, store.clone());

    assert_eq!(
        manager.get_valid_token().await,
        Err(CredentialError::ReauthorizationRequired)
    );

    manager.complete_authorization("abc123").await.unwrap();
    assert_eq!(manager.state().unwrap(), CredentialState::Authorized);
    assert_eq!(manager.get_valid_token().await.unwrap(), "T1");

    manager.handle_upstream_auth_failure().unwrap();
    assert_eq!(manager.get_valid_token().await.unwrap(), "T2");

    let record = stored_record(store.as_ref()).unwrap();
    assert_eq!(record.refresh_token.as_deref(), Some("R2"));

    exchange.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_credentials_survive_restart() {
    let mut server = mockito::Server::new_async().await;
    exchange_mock(
        &mut server,
        "abc123",
        r#"{"access_token":"T1","refresh_token":"R1","expires_in":3600}"#,
        200,
    )
    .await;

    let path = std::env::temp_dir().join(format!(
        "webflow-proxy-it-{}.sqlite3",
        uuid::Uuid::new_v4()
    ));

    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let manager = manager_with(&server, store);
        manager.complete_authorization("abc123").await.unwrap();
    }

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let manager = manager_with(&server, store);
    assert_eq!(manager.state().unwrap(), CredentialState::Authorized);
    assert_eq!(manager.get_valid_token().await.unwrap(), "T1");

    let _ = std::fs::remove_file(&path);
}

// ==================================================================================================
// HTTP Surface
// ==================================================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let server = mockito::Server::new_async().await;
    let app = build_test_app(&server, Arc::new(MemoryStore::new()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_callback_completes_authorization() {
    let mut server = mockito::Server::new_async().await;
    exchange_mock(
        &mut server,
        "abc123",
        r#"{"access_token":"T1","refresh_token":"R1","expires_in":3600}"#,
        200,
    )
    .await;

    let app = build_test_app(&server, Arc::new(MemoryStore::new()));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/callback?code=abc123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["status"], "authorized");
    assert!(body["expires_at"].is_string());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["state"], "authorized");
    assert_eq!(body["has_refresh_token"], true);
}

#[tokio::test]
async fn test_callback_with_rejected_code() {
    let mut server = mockito::Server::new_async().await;
    exchange_mock(&mut server, "stale", r#"{"error":"invalid_grant"}"#, 400).await;

    let app = build_test_app(&server, Arc::new(MemoryStore::new()));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/callback?code=stale")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["error"]["type"], "upstream_auth_error");
}

#[tokio::test]
async fn test_cms_401_refreshes_and_retries_once() {
    let mut server = mockito::Server::new_async().await;
    let rejected = server
        .mock("GET", "/sites")
        .match_header("authorization", "Bearer T1")
        .with_status(401)
        .with_body(r#"{"message":"Unauthorized"}"#)
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("GET", "/sites")
        .match_header("authorization", "Bearer T2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"sites":[{"id":"s1"}]}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = refresh_mock(
        &mut server,
        "R1",
        r#"{"access_token":"T2","refresh_token":"R2","expires_in":3600}"#,
        200,
    )
    .await;

    let store = Arc::new(MemoryStore::new());
    put_record(
        store.as_ref(),
        &CredentialRecord {
            access_token: "T1".to_string(),
            refresh_token: Some("R1".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        },
    );
    let app = build_test_app(&server, store);

    let response = app
        .oneshot(Request::builder().uri("/cms/sites").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["sites"][0]["id"], "s1");

    rejected.assert_async().await;
    accepted.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_cms_list_filtered_by_owner() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/collections/c1/items")
        .match_query(Matcher::UrlEncoded("limit".into(), "10".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"items":[
                {"id":"1","fieldData":{"firebase-uid":"alice"}},
                {"id":"2","fieldData":{"firebase-uid":"bob"}}
            ],"count":2,"pagination":{"limit":10,"offset":0,"total":2}}"#,
        )
        .create_async()
        .await;

    let store = Arc::new(MemoryStore::new());
    put_record(
        store.as_ref(),
        &CredentialRecord {
            access_token: "T1".to_string(),
            refresh_token: None,
            expires_at: None,
        },
    );
    let app = build_test_app(&server, store);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/cms/collections/c1/items?limit=10")
                .header("firebase-uid", "alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_json_body(response.into_body()).await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], "1");
    assert_eq!(body["count"], 1);
    assert_eq!(body["pagination"]["total"], 1);
}

#[tokio::test]
async fn test_cms_create_stamps_owner() {
    let mut server = mockito::Server::new_async().await;
    let create = server
        .mock("POST", "/collections/c1/items")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "fieldData": {"name": "Post", "firebase-uid": "alice"}
        })))
        .with_status(202)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"new"}"#)
        .create_async()
        .await;

    let store = Arc::new(MemoryStore::new());
    put_record(
        store.as_ref(),
        &CredentialRecord {
            access_token: "T1".to_string(),
            refresh_token: None,
            expires_at: None,
        },
    );
    let app = build_test_app(&server, store);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cms/collections/c1/items")
                .header("firebase-uid", "alice")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"fieldData":{"name":"Post"}}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    create.assert_async().await;
}

#[tokio::test]
async fn test_cms_error_status_is_forwarded() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/collections/missing")
        .with_status(404)
        .with_body(r#"{"message":"Resource not found"}"#)
        .create_async()
        .await;

    let store = Arc::new(MemoryStore::new());
    put_record(
        store.as_ref(),
        &CredentialRecord {
            access_token: "T1".to_string(),
            refresh_token: None,
            expires_at: None,
        },
    );
    let app = build_test_app(&server, store);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/cms/collections/missing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["error"]["type"], "cms_api_error");
}

// ==================================================================================================
// Item Ownership
// ==================================================================================================

fn authorized_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    put_record(
        store.as_ref(),
        &CredentialRecord {
            access_token: "T1".to_string(),
            refresh_token: None,
            expires_at: None,
        },
    );
    store
}

async fn item_mock(server: &mut ServerGuard, item_id: &str, owner: &str) -> Mock {
    server
        .mock("GET", format!("/collections/c1/items/{}", item_id).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "id": item_id,
                "fieldData": {"name": "Post", "firebase-uid": owner}
            })
            .to_string(),
        )
        .create_async()
        .await
}

#[tokio::test]
async fn test_cms_update_of_foreign_item_is_refused() {
    let mut server = mockito::Server::new_async().await;
    item_mock(&mut server, "bob-item", "bob").await;
    let patch = server
        .mock("PATCH", "/collections/c1/items/bob-item")
        .expect(0)
        .create_async()
        .await;

    let app = build_test_app(&server, authorized_store());
    let response = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/cms/collections/c1/items/bob-item")
                .header("firebase-uid", "alice")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"fieldData":{"name":"Mine now"}}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["error"]["type"], "not_found");
    patch.assert_async().await;
}

#[tokio::test]
async fn test_cms_update_of_own_item_keeps_owner() {
    let mut server = mockito::Server::new_async().await;
    item_mock(&mut server, "alice-item", "alice").await;
    let patch = server
        .mock("PATCH", "/collections/c1/items/alice-item")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "fieldData": {"name": "Renamed", "firebase-uid": "alice"}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"alice-item"}"#)
        .expect(1)
        .create_async()
        .await;

    let app = build_test_app(&server, authorized_store());
    let response = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/cms/collections/c1/items/alice-item")
                .header("firebase-uid", "alice")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"fieldData":{"name":"Renamed","firebase-uid":"bob"}}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    patch.assert_async().await;
}

#[tokio::test]
async fn test_cms_delete_of_foreign_item_is_refused() {
    let mut server = mockito::Server::new_async().await;
    item_mock(&mut server, "bob-item", "bob").await;
    let delete = server
        .mock("DELETE", "/collections/c1/items/bob-item")
        .expect(0)
        .create_async()
        .await;

    let app = build_test_app(&server, authorized_store());
    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/cms/collections/c1/items/bob-item")
                .header("firebase-uid", "alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    delete.assert_async().await;
}

#[tokio::test]
async fn test_cms_read_of_foreign_item_is_hidden() {
    let mut server = mockito::Server::new_async().await;
    item_mock(&mut server, "bob-item", "bob").await;
    let app = build_test_app(&server, authorized_store());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/cms/collections/c1/items/bob-item")
                .header("firebase-uid", "alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/cms/collections/c1/items/bob-item")
                .header("firebase-uid", "bob")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["id"], "bob-item");
}

#[tokio::test]
async fn test_cms_bulk_write_is_forbidden_for_owner() {
    let mut server = mockito::Server::new_async().await;
    let bulk = server
        .mock("DELETE", "/collections/c1/items")
        .expect(0)
        .create_async()
        .await;

    let app = build_test_app(&server, authorized_store());
    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/cms/collections/c1/items")
                .header("firebase-uid", "alice")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"items":[{"id":"bob-item"}]}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    bulk.assert_async().await;
}
