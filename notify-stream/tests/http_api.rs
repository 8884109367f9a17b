//! Token endpoint and notifications REST client against a local axum app.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use notify_stream::config::CredentialConfig;
use notify_stream::credential::{CredentialDispatcher, HttpCredentialSource};
use notify_stream::error::SourceErrorKind;
use notify_stream::store::{ApiError, NotificationStore, NotificationsApi};
use notify_stream::Url;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Default)]
struct Backend {
    token_calls: AtomicU32,
    token_queries: Mutex<Vec<HashMap<String, String>>>,
    token_error: Mutex<Option<(StatusCode, &'static str)>>,
    accepted_token: Mutex<Option<String>>,
    read_ids: Mutex<Vec<String>>,
    deleted_ids: Mutex<Vec<String>>,
}

type Shared = Arc<Backend>;

async fn issue_token(
    State(backend): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let call = backend.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
    backend.token_queries.lock().unwrap().push(query);
    if let Some((status, code)) = *backend.token_error.lock().unwrap() {
        return (status, Json(json!({"error": code}))).into_response();
    }
    Json(json!({"accessToken": format!("tok-{call}"), "expiresIn": 3600})).into_response()
}

fn authorized(backend: &Backend, headers: &HeaderMap) -> bool {
    let presented = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    match (presented, backend.accepted_token.lock().unwrap().as_deref()) {
        (Some(presented), Some(accepted)) => presented == accepted,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

async fn list(State(backend): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&backend, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "data": [
            {
                "id": "n-1",
                "type": "mention",
                "title": "You were mentioned",
                "message": "in #general",
                "isRead": false,
                "createdAt": "2024-05-01T12:00:00Z"
            },
            {"id": "n-2", "type": "system", "title": "Maintenance", "read": true}
        ]
    }))
    .into_response()
}

async fn unread_count(State(backend): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&backend, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({"unreadCount": 4})).into_response()
}

async fn mark_all_read(State(backend): State<Shared>, headers: HeaderMap) -> StatusCode {
    if !authorized(&backend, &headers) {
        return StatusCode::UNAUTHORIZED;
    }
    StatusCode::NO_CONTENT
}

async fn mark_read(
    State(backend): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    if !authorized(&backend, &headers) {
        return StatusCode::UNAUTHORIZED;
    }
    if id == "missing" {
        return StatusCode::NOT_FOUND;
    }
    backend.read_ids.lock().unwrap().push(id);
    StatusCode::NO_CONTENT
}

async fn remove(
    State(backend): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    if !authorized(&backend, &headers) {
        return StatusCode::UNAUTHORIZED;
    }
    backend.deleted_ids.lock().unwrap().push(id);
    StatusCode::NO_CONTENT
}

async fn serve(backend: Shared) -> SocketAddr {
    let app = Router::new()
        .route("/auth/token", get(issue_token))
        .route("/api/v1/notifications", get(list))
        .route("/api/v1/notifications/unread-count", get(unread_count))
        .route("/api/v1/notifications/mark-all-read", put(mark_all_read))
        .route("/api/v1/notifications/:id/read", put(mark_read))
        .route("/api/v1/notifications/:id", delete(remove))
        .with_state(backend);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn dispatcher(addr: SocketAddr, config: CredentialConfig) -> CredentialDispatcher {
    let source = HttpCredentialSource::new(format!("http://{addr}/auth/token"), &config);
    CredentialDispatcher::new(source, config).unwrap()
}

#[tokio::test]
async fn test_token_endpoint_lifetime_and_query() {
    let backend = Shared::default();
    let addr = serve(Arc::clone(&backend)).await;
    let config = CredentialConfig::default()
        .with_audience("https://api.example.com")
        .with_scope("notifications:read");
    let dispatcher = dispatcher(addr, config);

    let credential = dispatcher.get_token(false).await.unwrap();
    assert_eq!(credential.token().expose(), "tok-1");
    // 3600s reported; the 5 minute cache duration wins.
    assert_eq!(
        credential.expires_at() - credential.cached_at(),
        Duration::from_secs(300)
    );

    let forced = dispatcher.get_token(true).await.unwrap();
    assert_eq!(forced.token().expose(), "tok-2");

    let queries = backend.token_queries.lock().unwrap().clone();
    assert_eq!(queries[0]["audience"], "https://api.example.com");
    assert_eq!(queries[0]["scope"], "notifications:read");
    assert!(!queries[0].contains_key("cache"));
    assert_eq!(queries[1]["cache"], "off");
}

#[tokio::test]
async fn test_token_endpoint_login_required() {
    let backend = Shared::default();
    *backend.token_error.lock().unwrap() = Some((StatusCode::BAD_REQUEST, "login_required"));
    let addr = serve(Arc::clone(&backend)).await;
    let dispatcher = dispatcher(addr, CredentialConfig::default());

    let err = dispatcher.get_token(false).await.unwrap_err();

    assert_eq!(err.kind(), SourceErrorKind::LoginRequired);
    assert_eq!(err.attempts, 1);
    assert_eq!(backend.token_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_token_endpoint_stale_refresh_retries_without_cache() {
    let backend = Shared::default();
    *backend.token_error.lock().unwrap() = Some((StatusCode::BAD_REQUEST, "invalid_grant"));
    let addr = serve(Arc::clone(&backend)).await;
    let config = CredentialConfig::default()
        .with_max_retries(1)
        .with_retry_base_delay(Duration::from_millis(10));
    let dispatcher = dispatcher(addr, config);

    let err = dispatcher.get_token(false).await.unwrap_err();

    assert_eq!(err.kind(), SourceErrorKind::StaleRefresh);
    assert_eq!(err.attempts, 2);
    let queries = backend.token_queries.lock().unwrap().clone();
    assert!(!queries[0].contains_key("cache"));
    assert_eq!(queries[1]["cache"], "off");
}

#[tokio::test]
async fn test_notifications_api_round_trip() {
    let backend = Shared::default();
    let addr = serve(Arc::clone(&backend)).await;
    let api = NotificationsApi::new(
        Url::parse(&format!("http://{addr}")).unwrap(),
        dispatcher(addr, CredentialConfig::default()),
    );

    let notifications = api.list().await.unwrap();
    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[0].kind, "mention");
    assert_eq!(notifications[0].body.as_deref(), Some("in #general"));
    assert!(!notifications[0].is_read);
    assert!(notifications[0].created_at.is_some());
    assert!(notifications[1].is_read);

    let store = NotificationStore::new();
    assert_eq!(store.refresh(&api).await.unwrap(), 4);
    store.mark_read(&api, "n-1").await.unwrap();
    assert_eq!(store.unread_count(), 3);
    assert_eq!(*backend.read_ids.lock().unwrap(), ["n-1"]);

    let err = store.mark_read(&api, "missing").await.unwrap_err();
    assert!(matches!(err, ApiError::Status(404)));
    assert_eq!(store.unread_count(), 3);

    store.mark_all_read(&api).await.unwrap();
    assert_eq!(store.unread_count(), 0);
    assert_eq!(backend.token_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_delete_lowers_count_only_for_unread() {
    let backend = Shared::default();
    let addr = serve(Arc::clone(&backend)).await;
    let api = NotificationsApi::new(
        Url::parse(&format!("http://{addr}")).unwrap(),
        dispatcher(addr, CredentialConfig::default()),
    );

    let store = NotificationStore::new();
    store.refresh(&api).await.unwrap();
    store.delete(&api, "n-2", false).await.unwrap();
    assert_eq!(store.unread_count(), 4);
    store.delete(&api, "n-1", true).await.unwrap();
    assert_eq!(store.unread_count(), 3);
    assert_eq!(*backend.deleted_ids.lock().unwrap(), ["n-2", "n-1"]);

    let err = store.delete(&api, "..", true).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidId(_)));
    assert_eq!(store.unread_count(), 3);
}

#[tokio::test]
async fn test_ids_stay_inside_their_path_segment() {
    let backend = Shared::default();
    let addr = serve(Arc::clone(&backend)).await;
    let api = NotificationsApi::new(
        Url::parse(&format!("http://{addr}")).unwrap(),
        dispatcher(addr, CredentialConfig::default()),
    );

    api.mark_read("a/b?c").await.unwrap();
    api.delete("x/read").await.unwrap();

    assert_eq!(*backend.read_ids.lock().unwrap(), ["a/b?c"]);
    assert_eq!(*backend.deleted_ids.lock().unwrap(), ["x/read"]);
}

#[tokio::test]
async fn test_notifications_api_refreshes_rejected_credential() {
    let backend = Shared::default();
    *backend.accepted_token.lock().unwrap() = Some("tok-2".into());
    let addr = serve(Arc::clone(&backend)).await;
    let api = NotificationsApi::new(
        Url::parse(&format!("http://{addr}")).unwrap(),
        dispatcher(addr, CredentialConfig::default()),
    );

    assert_eq!(api.unread_count().await.unwrap(), 4);
    assert_eq!(backend.token_calls.load(Ordering::SeqCst), 2);

    *backend.accepted_token.lock().unwrap() = Some("never".into());
    let err = api.unread_count().await.unwrap_err();
    assert!(matches!(err, ApiError::Status(401)));
}
