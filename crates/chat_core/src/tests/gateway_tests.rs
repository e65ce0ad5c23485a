use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Multipart, Path as UrlPath, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chat_shared::domain::{MessageId, UserId};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::Mutex, time::sleep};

use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Recorded {
    route: &'static str,
    authorization: Option<String>,
    detail: String,
}

#[derive(Clone, Default)]
struct ServerState {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl ServerState {
    async fn record(&self, route: &'static str, headers: &HeaderMap, detail: String) {
        let authorization = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.requests.lock().await.push(Recorded {
            route,
            authorization,
            detail,
        });
    }
}

async fn handle_login(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record("login", &headers, body.to_string()).await;
    if body["password"] == "wrong" {
        return (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response();
    }
    Json(json!({"token": "tok-123", "user": {"id": 1, "username": body["username"]}}))
        .into_response()
}

async fn handle_register(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    state.record("register", &headers, String::new()).await;
    (StatusCode::CREATED, Json(json!({"message": "User registered"}))).into_response()
}

async fn handle_search(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let q = query.get("q").cloned().unwrap_or_default();
    state.record("search", &headers, q).await;
    Json(json!([{"id": 7, "username": "bob"}])).into_response()
}

async fn handle_history(
    State(state): State<ServerState>,
    headers: HeaderMap,
    UrlPath(conversation_id): UrlPath<i64>,
) -> Response {
    state
        .record("history", &headers, conversation_id.to_string())
        .await;
    match conversation_id {
        99 => (StatusCode::OK, "<html>maintenance</html>").into_response(),
        403 => (StatusCode::FORBIDDEN, "Not a participant").into_response(),
        408 => {
            sleep(Duration::from_secs(2)).await;
            Json(json!([])).into_response()
        }
        _ => Json(json!([{
            "id": 1,
            "conversation_id": conversation_id,
            "sender_id": 7,
            "content_type": "text",
            "content": "hello",
            "created_at": "2024-01-01T09:30:00Z",
            "sender_username": "bob"
        }]))
        .into_response(),
    }
}

async fn handle_upload(
    State(state): State<ServerState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut detail = String::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await.unwrap_or_default();
        detail = format!(
            "{name}|{file_name}|{content_type}|{}",
            String::from_utf8_lossy(&bytes)
        );
    }
    state.record("upload", &headers, detail).await;
    Json(json!({
        "message": "File uploaded successfully",
        "fileUrl": "/uploads/123-notes.txt",
        "fileName": "notes.txt",
        "fileType": "text/plain"
    }))
    .into_response()
}

async fn spawn_api_server() -> (String, ServerState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/auth/login", post(handle_login))
        .route("/api/auth/register", post(handle_register))
        .route("/api/users/search", get(handle_search))
        .route("/api/chat/:conversation_id/messages", get(handle_history))
        .route("/api/upload", post(handle_upload))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

fn gateway(base_url: &str) -> HttpGateway {
    HttpGateway::new(base_url, Duration::from_secs(10)).expect("gateway")
}

#[tokio::test]
async fn login_posts_credentials_without_auth_header() {
    let (base_url, state) = spawn_api_server().await;
    let gateway = gateway(&base_url);
    gateway.set_token(Some("stale".to_string()));

    let response = gateway.login("alice", "pw").await.expect("login");

    assert_eq!(response.token, "tok-123");
    assert_eq!(response.user.id, UserId(1));
    assert_eq!(response.user.username, "alice");
    let requests = state.requests.lock().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].authorization, None);
    let body: Value = serde_json::from_str(&requests[0].detail).expect("json body");
    assert_eq!(body, json!({"username": "alice", "password": "pw"}));
}

#[tokio::test]
async fn rejected_login_surfaces_status_and_body() {
    let (base_url, _state) = spawn_api_server().await;
    let err = gateway(&base_url)
        .login("alice", "wrong")
        .await
        .expect_err("unauthorized");

    assert_eq!(err.status(), Some(401));
    assert_eq!(err.to_string(), "401: Invalid credentials");
}

#[tokio::test]
async fn register_accepts_free_form_success_body() {
    let (base_url, state) = spawn_api_server().await;
    let response = gateway(&base_url)
        .register("carol", "pw")
        .await
        .expect("register");

    assert_eq!(response.message.as_deref(), Some("User registered"));
    assert_eq!(response.user, None);
    assert_eq!(state.requests.lock().await[0].authorization, None);
}

#[tokio::test]
async fn search_sends_bearer_token_and_encoded_query() {
    let (base_url, state) = spawn_api_server().await;
    let gateway = gateway(&base_url);
    gateway.set_token(Some("tok-123".to_string()));

    let users = gateway.search_users("bob & co").await.expect("search");

    assert_eq!(
        users,
        vec![UserSummary {
            id: UserId(7),
            username: "bob".to_string(),
            is_online: false,
        }]
    );
    let requests = state.requests.lock().await;
    assert_eq!(
        requests[0],
        Recorded {
            route: "search",
            authorization: Some("Bearer tok-123".to_string()),
            detail: "bob & co".to_string(),
        }
    );
}

#[tokio::test]
async fn history_targets_conversation_path() {
    let (base_url, state) = spawn_api_server().await;
    let gateway = gateway(&base_url);
    gateway.set_token(Some("tok-123".to_string()));

    let messages = gateway
        .get_history(ConversationId(42))
        .await
        .expect("history");

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, MessageId(1));
    assert_eq!(messages[0].conversation_id, ConversationId(42));
    assert_eq!(state.requests.lock().await[0].detail, "42");
}

#[tokio::test]
async fn undecodable_success_body_is_a_decode_error() {
    let (base_url, _state) = spawn_api_server().await;
    let err = gateway(&base_url)
        .get_history(ConversationId(99))
        .await
        .expect_err("decode");

    assert!(err.is_decode());
    assert_eq!(err.status(), None);
    assert!(err.to_string().starts_with("Failed to decode server response"));
}

#[tokio::test]
async fn non_success_history_is_a_status_error() {
    let (base_url, _state) = spawn_api_server().await;
    let err = gateway(&base_url)
        .get_history(ConversationId(403))
        .await
        .expect_err("forbidden");

    assert_eq!(
        err,
        ClientError::Status {
            status: 403,
            body: "Not a participant".to_string(),
        }
    );
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = gateway(&format!("http://{addr}"))
        .search_users("bob")
        .await
        .expect_err("network");

    assert!(matches!(err, ClientError::Network(_)));
}

#[tokio::test]
async fn slow_server_hits_the_request_timeout() {
    let (base_url, state) = spawn_api_server().await;
    let gateway = HttpGateway::new(&base_url, Duration::from_millis(200)).expect("gateway");

    let err = gateway
        .get_history(ConversationId(408))
        .await
        .expect_err("timeout");

    assert!(matches!(err, ClientError::Network(_)), "got {err:?}");
    assert_eq!(err.status(), None);
    assert!(!err.is_decode());
    assert_eq!(state.requests.lock().await.len(), 1);
}

#[tokio::test]
async fn upload_sends_file_part_with_guessed_type() {
    let (base_url, state) = spawn_api_server().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "meeting at noon").expect("write file");

    let upload = FileUpload::from_path(&path).expect("read file");
    assert_eq!(upload.file_name, "notes.txt");
    assert_eq!(upload.mime_type, "text/plain");

    let gateway = gateway(&base_url);
    gateway.set_token(Some("tok-123".to_string()));
    let response = gateway.upload_file(upload).await.expect("upload");

    assert_eq!(response.file_url, "/uploads/123-notes.txt");
    assert_eq!(response.file_type, "text/plain");
    let requests = state.requests.lock().await;
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer tok-123"));
    assert_eq!(
        requests[0].detail,
        "file|notes.txt|text/plain|meeting at noon"
    );
}

#[test]
fn unknown_extension_defaults_to_octet_stream() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("blob.unknownext");
    std::fs::write(&path, [0_u8, 1, 2]).expect("write file");

    let upload = FileUpload::from_path(&path).expect("read file");
    assert_eq!(upload.mime_type, "application/octet-stream");
    assert_eq!(upload.bytes, vec![0, 1, 2]);
}

#[test]
fn missing_file_is_a_file_access_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = FileUpload::from_path(dir.path().join("gone.png")).expect_err("missing");
    assert!(matches!(err, ClientError::FileAccess(_)));
    assert!(err.to_string().starts_with("Failed to open file"));
}

#[test]
fn base_url_must_be_http() {
    assert!(matches!(
        HttpGateway::new("ftp://example.org", Duration::from_secs(1)),
        Err(ClientError::InvalidEndpoint(_))
    ));
    let gateway = HttpGateway::new("http://localhost:3000/", Duration::from_secs(1))
        .expect("gateway");
    assert_eq!(gateway.base_url(), "http://localhost:3000");
}
