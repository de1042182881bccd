use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use planboard_core::NewTask;
use serde::Deserialize;

use super::{actor, api_error, require_text, ApiError};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskBody {
    column_id: String,
    /// Insert position within the column; appended when absent.
    #[serde(default)]
    position: Option<usize>,
    #[serde(flatten)]
    task: NewTask,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveTaskBody {
    to_column_id: String,
    index: usize,
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let task = state
        .engine
        .get_task(&task_id)
        .map_err(|e| api_error("planboard.api.get_task", e))?;
    Ok(Json(serde_json::json!({ "task": task })))
}

pub async fn create_task(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<CreateTaskBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    const TARGET: &str = "planboard.api.create_task";
    let mut new_task = body.task;
    new_task.title = require_text(TARGET, "title", &new_task.title)?;

    let (task, board) = state
        .engine
        .create_task(
            &board_id,
            &body.column_id,
            body.position,
            new_task,
            actor(&headers).as_deref(),
        )
        .await
        .map_err(|e| api_error(TARGET, e))?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "task": task, "board": board })),
    ))
}

/// PUT /tasks/:taskId/move. The board is the one the task record points at.
pub async fn move_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<MoveTaskBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    const TARGET: &str = "planboard.api.move_task";
    let board_id = state
        .engine
        .board_of_task(&task_id)
        .map_err(|e| api_error(TARGET, e))?;
    let result = state
        .engine
        .move_task(
            &board_id,
            &task_id,
            &body.to_column_id,
            body.index,
            actor(&headers).as_deref(),
        )
        .await
        .map_err(|e| api_error(TARGET, e))?;
    Ok(Json(serde_json::json!({
        "task": result.task,
        "board": result.board,
        "moved": result.outcome.is_some(),
    })))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let board = state
        .engine
        .delete_task(&task_id, actor(&headers).as_deref())
        .await
        .map_err(|e| api_error("planboard.api.delete_task", e))?;
    Ok(Json(serde_json::json!({ "success": true, "board": board })))
}

pub async fn detach_task(
    State(state): State<AppState>,
    Path((board_id, task_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (task, board) = state
        .engine
        .detach_task(&board_id, &task_id, actor(&headers).as_deref())
        .await
        .map_err(|e| api_error("planboard.api.detach_task", e))?;
    Ok(Json(serde_json::json!({ "task": task, "board": board })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_body_flattens_task_fields() {
        let body: CreateTaskBody = serde_json::from_str(
            r#"{ "columnId": "c1", "title": "Write docs", "priority": "High", "assignees": ["ann"] }"#,
        )
        .unwrap();
        assert_eq!(body.column_id, "c1");
        assert_eq!(body.position, None);
        assert_eq!(body.task.title, "Write docs");
        assert!(body.task.assignees.contains("ann"));
    }

    #[test]
    fn test_move_body_requires_index() {
        assert!(serde_json::from_str::<MoveTaskBody>(r#"{ "toColumnId": "c2" }"#).is_err());
        let body: MoveTaskBody =
            serde_json::from_str(r#"{ "toColumnId": "c2", "index": 4 }"#).unwrap();
        assert_eq!(body.index, 4);
    }
}
