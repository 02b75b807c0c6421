use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::error;

use super::db::DbHandle;
use super::models::*;
use super::ws::{WsMessage, broadcast_message};
use crate::errors::BoardError;

/// Header carrying the authenticated user id, set by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the user's role (`admin` or `member`).
pub const USER_ROLE_HEADER: &str = "x-user-role";

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub ws_tx: broadcast::Sender<String>,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateRequestPayload {
    #[serde(flatten)]
    pub fields: ItemFields,
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateItemRequest {
    #[serde(flatten)]
    pub fields: ItemFields,
    pub column: Option<String>,
    pub position: Option<i32>,
    #[serde(default)]
    pub is_discovery: bool,
}

#[derive(Deserialize)]
pub struct MoveItemRequest {
    pub column: String,
    pub position: i32,
}

#[derive(Deserialize)]
pub struct PromoteRequest {
    pub column: String,
    pub position: i32,
}

#[derive(Deserialize)]
pub struct MergeRequest {
    pub target_id: i64,
    #[serde(flatten)]
    pub options: MergeOptions,
}

#[derive(Deserialize)]
pub struct VoteRequest {
    pub vote_type: String,
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub body: String,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl From<BoardError> for ApiError {
    fn from(e: BoardError) -> Self {
        match e {
            BoardError::Validation(msg) => ApiError::BadRequest(msg),
            BoardError::Forbidden(msg) => ApiError::Forbidden(msg),
            BoardError::Conflict(msg) => ApiError::Conflict(msg),
            BoardError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            BoardError::Busy(_) => ApiError::Unavailable(e.to_string()),
            other => {
                error!(error = %other, "request failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

fn parse_column(s: &str) -> Result<BoardColumn, ApiError> {
    BoardColumn::from_str(s).map_err(ApiError::BadRequest)
}

// ── Identity ──────────────────────────────────────────────────────────

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());
        let user_id = header(USER_ID_HEADER)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .ok_or_else(|| ApiError::Forbidden(format!("Missing or malformed {} header", USER_ID_HEADER)))?;
        let role = header(USER_ROLE_HEADER)
            .ok_or_else(|| ApiError::Forbidden(format!("Missing {} header", USER_ROLE_HEADER)))?
            .trim()
            .parse::<Role>()
            .map_err(ApiError::Forbidden)?;
        Ok(Actor { user_id, role })
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/{id}", get(get_project))
        .route("/api/projects/{id}/board", get(get_board))
        .route("/api/projects/{id}/items", post(create_item))
        .route("/api/projects/{id}/requests", post(create_request))
        .route("/api/items/{id}", get(get_item).delete(delete_item))
        .route("/api/items/{id}/move", patch(move_item))
        .route("/api/requests/{id}", get(get_request).delete(delete_request))
        .route("/api/requests/{id}/promote", post(promote_request))
        .route("/api/requests/{id}/merge", post(merge_requests))
        .route("/api/requests/{id}/votes", post(cast_vote))
        .route("/api/requests/{id}/comments", get(list_comments).post(add_comment))
        .route("/api/requests/{id}/activity", get(list_activity))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_projects(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let projects = state.db.call(|db| db.list_projects()).await?;
    Ok(Json(projects))
}

async fn create_project(
    State(state): State<SharedState>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name;
    let project = state
        .db
        .call_with_retry("create_project", move |db| db.create_project(&name))
        .await?;
    broadcast_message(&state.ws_tx, &WsMessage::ProjectCreated { project: project.clone() });
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state.db.call(move |db| db.get_project(id)).await?;
    match project {
        Some(project) => Ok(Json(project)),
        None => Err(BoardError::not_found("Project", id).into()),
    }
}

async fn get_board(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    _actor: Actor,
) -> Result<impl IntoResponse, ApiError> {
    let board = state.db.call_with_retry("get_board", move |db| db.get_board(id)).await?;
    Ok(Json(board))
}

async fn create_item(
    State(state): State<SharedState>,
    Path(project_id): Path<i64>,
    actor: Actor,
    Json(req): Json<CreateItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new = NewItem {
        fields: req.fields,
        column: req.column.as_deref().map(parse_column).transpose()?,
        position: req.position,
        is_discovery: req.is_discovery,
    };
    let item = state
        .db
        .call_with_retry("create_item", move |db| db.create_item(project_id, &new, &actor))
        .await?;
    broadcast_message(&state.ws_tx, &WsMessage::ItemCreated { item: item.clone() });
    Ok((StatusCode::CREATED, Json(item)))
}

async fn get_item(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state.db.call(move |db| db.get_item(id)).await?;
    match item {
        Some(item) => Ok(Json(item)),
        None => Err(BoardError::not_found("Roadmap item", id).into()),
    }
}

async fn move_item(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    actor: Actor,
    Json(req): Json<MoveItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let column = parse_column(&req.column)?;
    let position = req.position;
    let (moved, request_status) = state
        .db
        .call_with_retry("move_item", move |db| {
            let moved = db.move_item(id, column, position, &actor)?;
            let status = match moved.item.request_id {
                Some(request_id) => db.get_request(request_id)?.map(|r| r.status),
                None => None,
            };
            Ok((moved, status))
        })
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::ItemMoved {
            item_id: id,
            from_column: moved.from_column,
            to_column: moved.item.column,
            position: moved.item.position,
            request_status,
        },
    );
    Ok(Json(moved.item))
}

async fn delete_item(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    actor: Actor,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .db
        .call_with_retry("delete_item", move |db| db.delete_item(id, &actor))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::ItemDeleted {
            item_id: id,
            project_id: item.project_id,
        },
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn create_request(
    State(state): State<SharedState>,
    Path(project_id): Path<i64>,
    Json(req): Json<CreateRequestPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let status = req
        .status
        .as_deref()
        .map(RequestStatus::from_str)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let fields = req.fields;
    let request = state
        .db
        .call_with_retry("create_request", move |db| {
            db.create_request(project_id, &fields, status)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn get_request(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state.db.call(move |db| db.get_request(id)).await?;
    match request {
        Some(request) => Ok(Json(request)),
        None => Err(BoardError::not_found("Request", id).into()),
    }
}

async fn delete_request(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    actor: Actor,
) -> Result<impl IntoResponse, ApiError> {
    let project_id = state
        .db
        .call_with_retry("delete_request", move |db| {
            let request = db
                .get_request(id)?
                .ok_or_else(|| BoardError::not_found("Request", id))?;
            db.delete_request(id, &actor)?;
            Ok(request.project_id)
        })
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::RequestDeleted {
            request_id: id,
            project_id,
        },
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn promote_request(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    actor: Actor,
    Json(req): Json<PromoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let column = parse_column(&req.column)?;
    let position = req.position;
    let item = state
        .db
        .call_with_retry("promote_request", move |db| {
            db.promote_request(id, column, position, &actor)
        })
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::RequestPromoted {
            request_id: id,
            item: item.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(item)))
}

async fn merge_requests(
    State(state): State<SharedState>,
    Path(source_id): Path<i64>,
    actor: Actor,
    Json(req): Json<MergeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let target_id = req.target_id;
    let options = req.options;
    let result = state
        .db
        .call_with_retry("merge_requests", move |db| {
            db.merge_requests(source_id, target_id, options, &actor)
        })
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::RequestsMerged {
            source_id,
            target_id,
            votes_moved: result.votes_moved,
            comments_moved: result.comments_moved,
        },
    );
    Ok(Json(result))
}

async fn cast_vote(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    actor: Actor,
    Json(req): Json<VoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let vote_type = VoteType::from_str(&req.vote_type).map_err(ApiError::BadRequest)?;
    let vote = state
        .db
        .call_with_retry("cast_vote", move |db| db.cast_vote(id, actor.user_id, vote_type))
        .await?;
    Ok((StatusCode::CREATED, Json(vote)))
}

async fn list_comments(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let comments = state.db.call(move |db| db.list_comments(id)).await?;
    Ok(Json(comments))
}

async fn add_comment(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    actor: Actor,
    Json(req): Json<CommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let body = req.body;
    let comment = state
        .db
        .call_with_retry("add_comment", move |db| db.add_comment(id, actor.user_id, &body))
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn list_activity(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state.db.call(move |db| db.list_activity(id)).await?;
    Ok(Json(entries))
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::db::BoardDb;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state() -> (SharedState, broadcast::Sender<String>) {
        let db = BoardDb::new_in_memory().unwrap();
        let (ws_tx, _) = broadcast::channel(16);
        let state = Arc::new(AppState {
            db: DbHandle::new(db),
            ws_tx: ws_tx.clone(),
        });
        (state, ws_tx)
    }

    fn test_app() -> Router {
        api_router().with_state(test_state().0)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn send(method: &str, uri: &str, role: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(role) = role {
            builder = builder.header(USER_ID_HEADER, "1").header(USER_ROLE_HEADER, role);
        }
        let body = if body.is_null() {
            Body::empty()
        } else {
            Body::from(body.to_string())
        };
        builder.body(body).unwrap()
    }

    fn admin(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        send(method, uri, Some("admin"), body)
    }

    async fn seed_project(app: &Router) {
        let resp = app
            .clone()
            .oneshot(send("POST", "/api/projects", None, serde_json::json!({"name": "acme"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    async fn seed_items(app: &Router, column: &str, titles: &[&str]) {
        for title in titles {
            let resp = app
                .clone()
                .oneshot(admin(
                    "POST",
                    "/api/projects/1/items",
                    serde_json::json!({"title": title, "column": column}),
                ))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::CREATED);
        }
    }

    async fn board(app: &Router) -> serde_json::Value {
        let resp = app
            .clone()
            .oneshot(send("GET", "/api/projects/1/board", Some("member"), serde_json::Value::Null))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        body_json(resp.into_body()).await
    }

    fn titles(board: &serde_json::Value, column: usize) -> Vec<String> {
        board["columns"][column]["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| match e["kind"].as_str().unwrap() {
                "explicit" => e["item"]["title"].as_str().unwrap().to_string(),
                _ => format!("~{}", e["request"]["title"].as_str().unwrap()),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_health_check() {
        let resp = test_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_create_and_list_projects() {
        let app = test_app();
        seed_project(&app).await;
        let resp = app
            .oneshot(send("GET", "/api/projects", None, serde_json::Value::Null))
            .await
            .unwrap();
        let projects: Vec<serde_json::Value> = body_json(resp.into_body()).await;
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0]["name"], "acme");
    }

    #[tokio::test]
    async fn test_board_has_three_columns() {
        let app = test_app();
        seed_project(&app).await;
        let board = board(&app).await;
        let names: Vec<&str> = board["columns"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["backlog", "in_progress", "released"]);
    }

    #[tokio::test]
    async fn test_board_unknown_project_is_404() {
        let resp = test_app()
            .oneshot(send("GET", "/api/projects/9/board", Some("member"), serde_json::Value::Null))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(body["error"], "Project 9 not found");
    }

    #[tokio::test]
    async fn test_board_requires_identity() {
        let app = test_app();
        seed_project(&app).await;
        let resp = app
            .oneshot(send("GET", "/api/projects/1/board", None, serde_json::Value::Null))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_member_cannot_create_item() {
        let app = test_app();
        seed_project(&app).await;
        let resp = app
            .clone()
            .oneshot(send(
                "POST",
                "/api/projects/1/items",
                Some("member"),
                serde_json::json!({"title": "nope"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app
            .oneshot(send(
                "POST",
                "/api/projects/1/items",
                Some("superuser"),
                serde_json::json!({"title": "nope"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_create_item_rejects_unknown_column() {
        let app = test_app();
        seed_project(&app).await;
        let resp = app
            .oneshot(admin(
                "POST",
                "/api/projects/1/items",
                serde_json::json!({"title": "X", "column": "discovery"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(body["error"], "Invalid column: discovery");
    }

    #[tokio::test]
    async fn test_move_item_reorders_column() {
        let app = test_app();
        seed_project(&app).await;
        seed_items(&app, "backlog", &["A", "B", "C"]).await;

        let resp = app
            .clone()
            .oneshot(admin(
                "PATCH",
                "/api/items/3/move",
                serde_json::json!({"column": "backlog", "position": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let item: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(item["position"], 0);

        assert_eq!(titles(&board(&app).await, 0), vec!["C", "A", "B"]);
    }

    #[tokio::test]
    async fn test_move_item_out_of_range_is_400() {
        let app = test_app();
        seed_project(&app).await;
        seed_items(&app, "backlog", &["A", "B"]).await;
        let resp = app
            .clone()
            .oneshot(admin(
                "PATCH",
                "/api/items/1/move",
                serde_json::json!({"column": "in_progress", "position": 3}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(titles(&board(&app).await, 0), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_promote_and_conflict() {
        let app = test_app();
        seed_project(&app).await;
        let resp = app
            .clone()
            .oneshot(send(
                "POST",
                "/api/projects/1/requests",
                None,
                serde_json::json!({"title": "SSO", "status": "completed"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(titles(&board(&app).await, 2), vec!["~SSO"]);

        let promote = serde_json::json!({"column": "in_progress", "position": 0});
        let resp = app
            .clone()
            .oneshot(admin("POST", "/api/requests/1/promote", promote.clone()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let board = board(&app).await;
        assert!(titles(&board, 2).is_empty());
        assert_eq!(titles(&board, 1), vec!["SSO"]);

        let resp = app
            .oneshot(admin("POST", "/api/requests/1/promote", promote))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_merge_and_remerge() {
        let app = test_app();
        seed_project(&app).await;
        for title in ["Dup", "Canon", "Other"] {
            app.clone()
                .oneshot(send(
                    "POST",
                    "/api/projects/1/requests",
                    None,
                    serde_json::json!({"title": title}),
                ))
                .await
                .unwrap();
        }
        let resp = app
            .clone()
            .oneshot(admin("POST", "/api/requests/1/votes", serde_json::json!({"vote_type": "upvote"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = app
            .clone()
            .oneshot(admin(
                "POST",
                "/api/requests/1/merge",
                serde_json::json!({"target_id": 2, "merge_votes": true}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let result: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(result["votes_moved"], 1);
        assert_eq!(result["source"]["status"], "duplicate");
        assert_eq!(result["source"]["merged_into_id"], 2);

        let resp = app
            .clone()
            .oneshot(admin("POST", "/api/requests/1/merge", serde_json::json!({"target_id": 3})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .oneshot(send("GET", "/api/requests/2/activity", None, serde_json::Value::Null))
            .await
            .unwrap();
        let log: Vec<serde_json::Value> = body_json(resp.into_body()).await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0]["action"], "merge_received");
    }

    #[tokio::test]
    async fn test_delete_item_then_404() {
        let app = test_app();
        seed_project(&app).await;
        seed_items(&app, "released", &["A", "B"]).await;

        let resp = app
            .clone()
            .oneshot(admin("DELETE", "/api/items/1", serde_json::Value::Null))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(titles(&board(&app).await, 2), vec!["B"]);

        let resp = app
            .clone()
            .oneshot(admin("DELETE", "/api/items/1", serde_json::Value::Null))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app
            .oneshot(send("GET", "/api/items/2", None, serde_json::Value::Null))
            .await
            .unwrap();
        let item: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(item["position"], 0);
    }

    #[tokio::test]
    async fn test_create_item_broadcasts_ws() {
        let (state, ws_tx) = test_state();
        let app = api_router().with_state(state);
        let mut rx = ws_tx.subscribe();

        seed_project(&app).await;
        let _ = rx.recv().await.unwrap();

        seed_items(&app, "backlog", &["WS item"]).await;
        let msg = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["type"], "ItemCreated");
        assert_eq!(parsed["data"]["item"]["title"], "WS item");
    }

    #[tokio::test]
    async fn test_failed_move_broadcasts_nothing() {
        let (state, ws_tx) = test_state();
        let app = api_router().with_state(state);
        seed_project(&app).await;
        seed_items(&app, "backlog", &["A"]).await;
        let mut rx = ws_tx.subscribe();

        let resp = app
            .oneshot(admin(
                "PATCH",
                "/api/items/1/move",
                serde_json::json!({"column": "backlog", "position": 5}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_busy_maps_to_503() {
        let busy: BoardError = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        )
        .into();
        let resp = ApiError::from(busy).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = ApiError::from(BoardError::Conflict("taken".into())).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
