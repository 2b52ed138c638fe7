use std::sync::Arc;

use adacta_client::session::{TOKEN_KEY, USERNAME_KEY};
use adacta_client::{
    ApiClient, ClientError, FileStore, HttpTransport, KeyValueStore, MemoryStore,
    RequestAuthenticator, SessionStore,
};
use axum::body::Bytes;
use axum::extract::Path;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

async fn auth(Json(body): Json<Value>) -> Response {
    if body["password"] == "pw" {
        Json(json!({"username": body["username"], "token": "abc"})).into_response()
    } else {
        (
            StatusCode::FORBIDDEN,
            Json(json!({"message": "Invalid credentials"})),
        )
            .into_response()
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn inbox(headers: HeaderMap) -> Response {
    let docs = Json(json!({"count": 1, "docs": ["d1"]}));
    match bearer(&headers) {
        // The first token is rotated on use.
        Some("abc") => ([(header::AUTHORIZATION, "Bearer def")], docs).into_response(),
        Some("def") => docs.into_response(),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "token expired"})),
        )
            .into_response(),
    }
}

async fn document(Path(id): Path<String>, headers: HeaderMap) -> Response {
    if bearer(&headers).is_none() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    format!("%PDF {id}").into_response()
}

async fn upload(headers: HeaderMap, body: Bytes) -> Response {
    if bearer(&headers).is_none() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    if content_type != Some("application/pdf") || !body.starts_with(b"%PDF") {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }
    Json(json!({"id": format!("doc-{}", body.len())})).into_response()
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/api/auth", post(auth))
        .route("/api/inbox", get(inbox))
        .route("/api/repo/{id}/document", get(document))
        .route("/api/upload", post(upload));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api")
}

fn client(base_url: &str) -> (Arc<SessionStore>, ApiClient) {
    client_with_store(base_url, Arc::new(MemoryStore::new()))
}

fn client_with_store(
    base_url: &str,
    store: Arc<dyn KeyValueStore>,
) -> (Arc<SessionStore>, ApiClient) {
    let transport = Arc::new(HttpTransport::new(base_url).unwrap());
    let session = Arc::new(SessionStore::open(store, transport.clone()).unwrap());
    let auth = RequestAuthenticator::new(transport, session.clone());
    (session, ApiClient::new(Arc::new(auth)))
}

#[tokio::test]
async fn test_login_inbox_and_rotation_over_http() {
    let base = spawn_server().await;
    let (session, api) = client(&base);

    let err = session.login("alice", "wrong").await.unwrap_err();
    assert_eq!(
        err,
        ClientError::Server {
            status: 403,
            message: "Invalid credentials".into()
        }
    );

    session.login("alice", "pw").await.unwrap();
    assert_eq!(session.token().as_deref(), Some("abc"));

    let inbox = api.inbox().await.unwrap();
    assert_eq!(inbox.docs, vec!["d1"]);
    assert_eq!(session.token().as_deref(), Some("def"));
    assert_eq!(session.username().as_deref(), Some("alice"));

    // The rotated token is accepted on the next call.
    api.inbox().await.unwrap();

    let bytes = api.document("d1").await.unwrap();
    assert_eq!(bytes, b"%PDF d1");
}

#[tokio::test]
async fn test_unauthorized_over_http_logs_out() {
    let base = spawn_server().await;
    let (session, api) = client(&base);
    session.login("alice", "pw").await.unwrap();
    session.update("stale").await.unwrap();

    let err = api.inbox().await.unwrap_err();
    assert!(err.is_auth_rejected());
    assert_eq!(err.message(), "token expired");
    assert!(!session.authenticated());
}

#[tokio::test]
async fn test_upload_over_http() {
    let base = spawn_server().await;
    let (session, api) = client(&base);
    session.login("alice", "pw").await.unwrap();

    let uploaded = api.upload(b"%PDF-1.7".to_vec()).await.unwrap();
    assert_eq!(uploaded.id, "doc-8");
}

#[tokio::test(flavor = "current_thread")]
async fn test_file_store_session_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let base = spawn_server().await;

    let (session, api) = client_with_store(&base, Arc::new(FileStore::new(&path)));
    session.login("alice", "pw").await.unwrap();
    api.inbox().await.unwrap();
    assert_eq!(session.token().as_deref(), Some("def"));
    drop((session, api));

    let store = FileStore::new(&path);
    assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("def"));
    assert_eq!(store.get(USERNAME_KEY).unwrap().as_deref(), Some("alice"));

    let (session, api) = client_with_store(&base, Arc::new(store));
    assert_eq!(session.username().as_deref(), Some("alice"));
    api.inbox().await.unwrap();

    session.logout().await.unwrap();
    assert_eq!(FileStore::new(&path).get(TOKEN_KEY).unwrap(), None);
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (_session, api) = client(&format!("http://{addr}/api"));
    let err = api.inbox().await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
}
