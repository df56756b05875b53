use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use shared::error::ErrorCode;
use tokio::{net::TcpListener, sync::Mutex};

use super::*;

#[derive(Debug, Clone)]
struct Recorded {
    path: String,
    authorization: Option<String>,
    query: HashMap<String, String>,
    body: Value,
}

#[derive(Clone, Default)]
struct ServerState {
    recorded: Arc<Mutex<Vec<Recorded>>>,
}

impl ServerState {
    async fn record(&self, path: &str, headers: &HeaderMap, query: HashMap<String, String>, body: Value) {
        self.recorded.lock().await.push(Recorded {
            path: path.to_string(),
            authorization: headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            query,
            body,
        });
    }
}

fn question_json(id: &str, title: &str) -> Value {
    json!({
        "_id": id,
        "title": title,
        "question": "<p>body</p>",
        "solution": "<p>solution</p>",
        "category": "Trees",
        "difficulty": "Easy",
        "author": "ada",
        "publishedDate": "2024-02-01",
        "private": false,
        "folderId": null
    })
}

async fn list_questions(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state
        .record("/api/questions", &headers, query, Value::Null)
        .await;
    Json(json!({
        "questions": [question_json("q-1", "Invert a binary tree")],
        "totalPages": 4,
        "currentPage": 2
    }))
}

async fn list_public_questions(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state
        .record("/api/noauth/questions", &headers, query, Value::Null)
        .await;
    Json(json!({ "questions": [] }))
}

async fn move_question(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state
        .record(&format!("/api/questions/{id}/move"), &headers, HashMap::new(), body.clone())
        .await;
    let mut question = question_json(&id, "Moved");
    question["folderId"] = body["folderId"].clone();
    Json(question)
}

async fn delete_folder(State(state): State<ServerState>, headers: HeaderMap, Path(id): Path<String>) -> StatusCode {
    state
        .record(&format!("/api/folders/{id}"), &headers, HashMap::new(), Value::Null)
        .await;
    StatusCode::NO_CONTENT
}

async fn expired_folders() -> (StatusCode, Json<Value>) {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Invalid token" })))
}

async fn forbidden_profile() -> (StatusCode, Json<Value>) {
    (StatusCode::FORBIDDEN, Json(json!({ "error": "No token provided" })))
}

async fn rejected_login() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Invalid email or password" })),
    )
}

async fn missing_question() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "message": "Question not found" })))
}

async fn spawn_api_server() -> (String, ServerState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/questions", get(list_questions))
        .route("/api/noauth/questions", get(list_public_questions))
        .route("/api/noauth/questions/:id", get(missing_question))
        .route("/api/questions/:id/move", patch(move_question))
        .route("/api/folders", get(expired_folders))
        .route("/api/folders/:id", delete(delete_folder))
        .route("/api/profile", get(forbidden_profile))
        .route("/api/auth/login", post(rejected_login))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/"), state)
}

async fn gateway_for(server_url: &str) -> (HttpGateway, Session) {
    let session = Session::in_memory();
    session.sign_in("tok-123").await.expect("sign in");
    let gateway = HttpGateway::new(Url::parse(server_url).expect("url"), session.clone())
        .expect("gateway");
    (gateway, session)
}

fn page_query(page: u32, query: &str) -> QuestionListQuery {
    QuestionListQuery {
        page,
        limit: 12,
        query: query.to_string(),
    }
}

#[tokio::test]
async fn owner_listing_attaches_bearer_token_and_paging_params() {
    let (server_url, state) = spawn_api_server().await;
    let (gateway, _session) = gateway_for(&server_url).await;

    let page = gateway
        .list_questions(&page_query(2, "binary tree"), Access::Owner)
        .await
        .expect("list");
    assert_eq!(page.total_pages, 4);
    assert_eq!(page.current_page, Some(2));
    assert_eq!(page.questions[0].title, "Invert a binary tree");

    let recorded = state.recorded.lock().await;
    assert_eq!(recorded[0].authorization.as_deref(), Some("Bearer tok-123"));
    assert_eq!(recorded[0].query.get("page").map(String::as_str), Some("2"));
    assert_eq!(recorded[0].query.get("limit").map(String::as_str), Some("12"));
    assert_eq!(
        recorded[0].query.get("query").map(String::as_str),
        Some("binary tree")
    );
}

#[tokio::test]
async fn public_listing_never_sends_the_credential() {
    let (server_url, state) = spawn_api_server().await;
    let (gateway, _session) = gateway_for(&server_url).await;

    let page = gateway
        .list_questions(&page_query(1, ""), Access::Public)
        .await
        .expect("list");
    assert!(page.questions.is_empty());
    assert_eq!(page.total_pages, 1);

    let recorded = state.recorded.lock().await;
    assert_eq!(recorded[0].path, "/api/noauth/questions");
    assert!(recorded[0].authorization.is_none());
}

#[tokio::test]
async fn credential_is_read_again_for_every_call() {
    let (server_url, state) = spawn_api_server().await;
    let (gateway, session) = gateway_for(&server_url).await;

    gateway
        .list_questions(&page_query(1, ""), Access::Owner)
        .await
        .expect("first");
    session.sign_out().await.expect("sign out");
    gateway
        .list_questions(&page_query(1, ""), Access::Owner)
        .await
        .expect("second");

    let recorded = state.recorded.lock().await;
    assert!(recorded[0].authorization.is_some());
    assert!(recorded[1].authorization.is_none());
}

#[tokio::test]
async fn unauthorized_owner_calls_map_to_auth_errors() {
    let (server_url, _state) = spawn_api_server().await;
    let (gateway, _session) = gateway_for(&server_url).await;

    let err = gateway
        .list_folders(Access::Owner)
        .await
        .expect_err("expired");
    assert!(err.is_auth());
    assert_eq!(err.reason(), Some("Invalid token"));

    let err = gateway.profile().await.expect_err("no token");
    assert!(err.is_auth(), "403 with an invalid-token body is an auth failure");
}

#[tokio::test]
async fn rejected_login_is_not_a_session_failure() {
    let (server_url, _state) = spawn_api_server().await;
    let (gateway, _session) = gateway_for(&server_url).await;

    let err = gateway
        .login(&LoginRequest {
            email: "ada@example.com".into(),
            password: "wrong".into(),
        })
        .await
        .expect_err("bad credentials");
    match err {
        GatewayError::Api { code, reason, .. } => {
            assert_eq!(code, ErrorCode::Unauthorized);
            assert_eq!(reason.as_deref(), Some("Invalid email or password"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn api_errors_carry_the_server_reason() {
    let (server_url, _state) = spawn_api_server().await;
    let (gateway, _session) = gateway_for(&server_url).await;

    let err = gateway
        .get_public_question(&QuestionId::new("missing"))
        .await
        .expect_err("not found");
    assert_eq!(err.reason(), Some("Question not found"));
    assert_eq!(err.display_message(), "Question not found");
}

#[tokio::test]
async fn move_sends_only_the_folder_reference() {
    let (server_url, state) = spawn_api_server().await;
    let (gateway, _session) = gateway_for(&server_url).await;

    let moved = gateway
        .move_question(&QuestionId::new("q-7"), None)
        .await
        .expect("move");
    assert!(moved.is_unfiled());

    let moved = gateway
        .move_question(&QuestionId::new("q-7"), Some(&FolderId::new("f-2")))
        .await
        .expect("move");
    assert_eq!(moved.folder_id, Some(FolderId::new("f-2")));

    let recorded = state.recorded.lock().await;
    assert_eq!(recorded[0].path, "/api/questions/q-7/move");
    assert_eq!(recorded[0].body, json!({ "folderId": null }));
    assert_eq!(recorded[1].body, json!({ "folderId": "f-2" }));
}

#[tokio::test]
async fn delete_folder_tolerates_an_empty_body() {
    let (server_url, state) = spawn_api_server().await;
    let (gateway, _session) = gateway_for(&server_url).await;

    let response = gateway
        .delete_folder(&FolderId::new("f-1"))
        .await
        .expect("delete");
    assert!(response.message.is_none());
    assert_eq!(state.recorded.lock().await[0].path, "/api/folders/f-1");
}

#[tokio::test]
async fn base_url_path_prefix_is_preserved() {
    let session = Session::in_memory();
    let gateway = HttpGateway::new(
        Url::parse("https://example.com/prefix/").expect("url"),
        session,
    )
    .expect("gateway");
    let url = gateway
        .url_for(&["api", "questions", "id with space"])
        .expect("url");
    assert_eq!(
        url.as_str(),
        "https://example.com/prefix/api/questions/id%20with%20space"
    );

    let err = HttpGateway::new(Url::parse("mailto:ada@example.com").expect("url"), Session::in_memory())
        .err()
        .expect("cannot be a base");
    assert!(matches!(err, GatewayError::InvalidBaseUrl(_)));
}
