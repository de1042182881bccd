use axum::{
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post, put},
    Router,
};
use planboard_core::BoardError;
use serde::Serialize;

mod board;
mod events;
mod task;

use crate::state::AppState;

/// Axum REST API routes.
///
///   GET    /boards?projectId=                       -> list boards (optionally of one project)
///   POST   /boards                                  -> create board (default columns)
///   GET    /boards/:boardId                         -> board with resolved tasks (+ ETag)
///   PUT    /boards/:boardId                         -> rename board
///   DELETE /boards/:boardId                         -> delete board and its tasks
///   POST   /boards/:boardId/columns                 -> add column
///   PUT    /boards/:boardId/columns/reorder         -> reorder columns
///   PUT    /boards/:boardId/columns/:columnId       -> rename column
///   DELETE /boards/:boardId/columns/:columnId       -> delete column (cascades tasks)
///   POST   /boards/:boardId/tasks                   -> create task in a column
///   POST   /boards/:boardId/tasks/:taskId/detach    -> take task off the board
///   GET    /boards/:boardId/events                  -> SSE stream of change records
///   GET    /tasks/:taskId                           -> task record
///   PUT    /tasks/:taskId/move                      -> move task
///   DELETE /tasks/:taskId                           -> delete task
///   GET    /status                                  -> health check
///   GET    /logs, /logs/stream                      -> recent log entries, live log SSE
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/boards", get(board::list_boards).post(board::create_board))
        .route(
            "/boards/{board_id}",
            get(board::get_board)
                .put(board::rename_board)
                .delete(board::delete_board),
        )
        .route("/boards/{board_id}/columns", post(board::add_column))
        .route(
            "/boards/{board_id}/columns/reorder",
            put(board::reorder_columns),
        )
        .route(
            "/boards/{board_id}/columns/{column_id}",
            put(board::update_column).delete(board::delete_column),
        )
        .route("/boards/{board_id}/tasks", post(task::create_task))
        .route(
            "/boards/{board_id}/tasks/{task_id}/detach",
            post(task::detach_task),
        )
        .route("/boards/{board_id}/events", get(events::sse_events))
        .route(
            "/tasks/{task_id}",
            get(task::get_task).delete(task::delete_task),
        )
        .route("/tasks/{task_id}/move", put(task::move_task))
        .route("/status", get(events::status))
        .route("/logs", get(events::list_logs))
        .route("/logs/stream", get(events::stream_logs))
}

// ── Shared types and helpers used across sub-modules ────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn status_for(err: &BoardError) -> StatusCode {
    match err {
        BoardError::NotFound { .. } => StatusCode::NOT_FOUND,
        BoardError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        BoardError::Conflict { .. } => StatusCode::CONFLICT,
        BoardError::Corrupted { .. } | BoardError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Log and convert an engine error into a response.
fn api_error(target: &'static str, err: BoardError) -> ApiError {
    let status = status_for(&err);
    let error = err.to_string();
    log_api_issue(status, target, &error);
    (status, Json(ErrorResponse { error }))
}

fn bad_request(target: &'static str, error: impl Into<String>) -> ApiError {
    let status = StatusCode::BAD_REQUEST;
    let error = error.into();
    log_api_issue(status, target, &error);
    (status, Json(ErrorResponse { error }))
}

/// Reject blank names before they reach the engine.
fn require_text(target: &'static str, field: &str, value: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(bad_request(target, format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// Who performed a mutation, from the `x-actor` header.
fn actor(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-actor")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn insert_header_safe(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match value.parse() {
        Ok(parsed) => {
            headers.insert(name, parsed);
        }
        Err(e) => {
            log::warn!(target: "planboard.api", "Failed to set header {}={} ({})", name, value, e);
        }
    }
}

fn log_api_issue(status: StatusCode, target: &'static str, message: impl AsRef<str>) {
    let message = message.as_ref();
    if status.is_server_error() {
        log::error!(target: target, "{}", message);
    } else {
        log::warn!(target: target, "{}", message);
    }
}
