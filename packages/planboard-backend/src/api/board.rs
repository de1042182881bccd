use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use planboard_core::{board_topic, Board};
use serde::Deserialize;

use super::{actor, api_error, insert_header_safe, require_text, ApiError};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBoardBody {
    name: String,
    #[serde(default)]
    project_id: Option<String>,
    /// Explicit column titles; the four default columns when absent.
    #[serde(default)]
    columns: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBoardsQuery {
    #[serde(default)]
    project_id: Option<String>,
}

#[derive(Deserialize)]
pub struct RenameBoardBody {
    name: String,
}

#[derive(Deserialize)]
pub struct ColumnBody {
    title: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderBody {
    column_ids: Vec<String>,
}

fn board_summary(board: &Board) -> serde_json::Value {
    serde_json::json!({
        "id": board.id,
        "name": board.name,
        "projectId": board.project_id,
        "version": board.version,
        "columnCount": board.columns.len(),
        "taskCount": board.task_ids().count(),
    })
}

pub async fn list_boards(
    State(state): State<AppState>,
    Query(params): Query<ListBoardsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let project_id = params.project_id.as_deref().filter(|p| !p.trim().is_empty());
    let boards = state
        .engine
        .list_boards(project_id)
        .map_err(|e| api_error("planboard.api.list_boards", e))?;
    let summaries: Vec<serde_json::Value> = boards.iter().map(board_summary).collect();
    Ok(Json(serde_json::json!({ "boards": summaries })))
}

pub async fn create_board(
    State(state): State<AppState>,
    Json(body): Json<CreateBoardBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    const TARGET: &str = "planboard.api.create_board";
    let name = require_text(TARGET, "name", &body.name)?;
    let columns = match body.columns {
        Some(titles) => {
            let mut cleaned = Vec::with_capacity(titles.len());
            for title in &titles {
                cleaned.push(require_text(TARGET, "column title", title)?);
            }
            Some(cleaned)
        }
        None => None,
    };

    let board = state
        .engine
        .create_board(&name, body.project_id, columns.as_deref())
        .map_err(|e| api_error(TARGET, e))?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "board": board }))))
}

pub async fn get_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    headers: HeaderMap,
) -> Result<(StatusCode, HeaderMap, Json<serde_json::Value>), ApiError> {
    const TARGET: &str = "planboard.api.get_board";
    let board = state
        .engine
        .get_board(&board_id)
        .map_err(|e| api_error(TARGET, e))?;
    let etag = format!("\"{}\"", board.version);

    let mut resp_headers = HeaderMap::new();
    insert_header_safe(&mut resp_headers, "etag", &etag);

    // Check If-None-Match for conditional response
    if let Some(value) = headers.get("if-none-match").and_then(|v| v.to_str().ok()) {
        if value == etag {
            return Ok((
                StatusCode::NOT_MODIFIED,
                resp_headers,
                Json(serde_json::json!({})),
            ));
        }
    }

    let view = state.engine.view_of(&board).map_err(|e| api_error(TARGET, e))?;
    Ok((
        StatusCode::OK,
        resp_headers,
        Json(serde_json::json!({
            "boardId": board.id,
            "name": board.name,
            "version": board.version,
            "columns": view.columns,
            "board": board,
        })),
    ))
}

pub async fn rename_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RenameBoardBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    const TARGET: &str = "planboard.api.rename_board";
    let name = require_text(TARGET, "name", &body.name)?;
    let board = state
        .engine
        .rename_board(&board_id, &name, actor(&headers).as_deref())
        .await
        .map_err(|e| api_error(TARGET, e))?;
    Ok(Json(serde_json::json!({ "board": board })))
}

pub async fn delete_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .engine
        .delete_board(&board_id)
        .await
        .map_err(|e| api_error("planboard.api.delete_board", e))?;
    let closed = state.hub.close_topic(&board_topic(&board_id));
    log::info!(
        target: "planboard.api.delete_board",
        "Board {} deleted, closed {} subscriptions",
        board_id,
        closed
    );
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn add_column(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ColumnBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    const TARGET: &str = "planboard.api.add_column";
    let title = require_text(TARGET, "title", &body.title)?;
    let (column, board) = state
        .engine
        .add_column(&board_id, &title, actor(&headers).as_deref())
        .await
        .map_err(|e| api_error(TARGET, e))?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "column": column, "board": board })),
    ))
}

pub async fn update_column(
    State(state): State<AppState>,
    Path((board_id, column_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<ColumnBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    const TARGET: &str = "planboard.api.update_column";
    let title = require_text(TARGET, "title", &body.title)?;
    let (column, board) = state
        .engine
        .update_column_title(&board_id, &column_id, &title, actor(&headers).as_deref())
        .await
        .map_err(|e| api_error(TARGET, e))?;
    Ok(Json(serde_json::json!({ "column": column, "board": board })))
}

pub async fn delete_column(
    State(state): State<AppState>,
    Path((board_id, column_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let board = state
        .engine
        .delete_column(&board_id, &column_id, actor(&headers).as_deref())
        .await
        .map_err(|e| api_error("planboard.api.delete_column", e))?;
    Ok(Json(serde_json::json!({ "board": board })))
}

pub async fn reorder_columns(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ReorderBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let board = state
        .engine
        .reorder_columns(&board_id, &body.column_ids, actor(&headers).as_deref())
        .await
        .map_err(|e| api_error("planboard.api.reorder_columns", e))?;
    Ok(Json(serde_json::json!({ "board": board })))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn state() -> AppState {
        crate::build_state(&crate::config::ServerConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_boards_filters_by_project() {
        let state = state().await;
        let web = state.engine.create_board("Web", Some("p1".into()), None).unwrap();
        state.engine.create_board("Ops", Some("p2".into()), None).unwrap();

        let Json(all) = list_boards(
            State(state.clone()),
            Query(ListBoardsQuery { project_id: None }),
        )
        .await
        .unwrap();
        assert_eq!(all["boards"].as_array().unwrap().len(), 2);

        let Json(p1) = list_boards(
            State(state.clone()),
            Query(ListBoardsQuery {
                project_id: Some("p1".into()),
            }),
        )
        .await
        .unwrap();
        let boards = p1["boards"].as_array().unwrap();
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0]["id"], web.id.as_str());
        assert_eq!(boards[0]["projectId"], "p1");
    }

    #[tokio::test]
    async fn test_rename_board_handler() {
        let state = state().await;
        let board = state.engine.create_board("Old", None, None).unwrap();

        let Json(body) = rename_board(
            State(state.clone()),
            Path(board.id.clone()),
            HeaderMap::new(),
            Json(RenameBoardBody {
                name: "  New  ".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(body["board"]["name"], "New");
        assert_eq!(state.engine.get_board(&board.id).unwrap().name, "New");

        let err = rename_board(
            State(state.clone()),
            Path(board.id.clone()),
            HeaderMap::new(),
            Json(RenameBoardBody { name: " ".into() }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let err = rename_board(
            State(state),
            Path("ghost".into()),
            HeaderMap::new(),
            Json(RenameBoardBody { name: "X".into() }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }
}
