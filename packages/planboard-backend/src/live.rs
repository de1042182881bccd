/// WebSocket live board channel.
///
/// Protocol:
///   Server sends Hello { connectionId, board } on connect.
///   Every committed change on the board arrives as Change { record }.
///   Client may send MoveTask { requestId, taskId, toColumnId, index };
///   the server answers MoveResult { requestId, ... } on the same socket.
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use planboard_core::{board_topic, Board, ChangeRecord, Task};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::api::status_for;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    MoveTask {
        request_id: String,
        task_id: String,
        to_column_id: String,
        index: usize,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Hello {
        connection_id: u64,
        board: Board,
    },
    Change {
        record: ChangeRecord,
    },
    MoveResult {
        request_id: String,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        task: Option<Task>,
        #[serde(skip_serializing_if = "Option::is_none")]
        board: Option<Board>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Error {
        message: String,
    },
}

pub fn live_router() -> Router<AppState> {
    Router::new().route("/boards/{board_id}/live", get(ws_handler))
}

#[derive(Deserialize)]
struct LiveQuery {
    actor: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(board_id): Path<String>,
    Query(params): Query<LiveQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let actor = params.actor.filter(|a| !a.trim().is_empty());
    ws.on_upgrade(move |socket| handle_live_session(socket, board_id, actor, state))
}

fn encode(msg: &ServerMessage) -> String {
    serde_json::to_string(msg).unwrap_or_default()
}

async fn handle_move(
    state: &AppState,
    board_id: &str,
    actor: Option<&str>,
    request: ClientMessage,
) -> ServerMessage {
    let ClientMessage::MoveTask {
        request_id,
        task_id,
        to_column_id,
        index,
    } = request;
    match state
        .engine
        .move_task(board_id, &task_id, &to_column_id, index, actor)
        .await
    {
        Ok(result) => ServerMessage::MoveResult {
            request_id,
            ok: true,
            task: Some(result.task),
            board: Some(result.board),
            status: None,
            error: None,
        },
        Err(e) => {
            log::warn!(
                target: "planboard.live",
                "Move of task {} on board {} failed: {}",
                task_id,
                board_id,
                e
            );
            ServerMessage::MoveResult {
                request_id,
                ok: false,
                task: None,
                board: None,
                status: Some(status_for(&e).as_u16()),
                error: Some(e.to_string()),
            }
        }
    }
}

async fn handle_live_session(
    socket: WebSocket,
    board_id: String,
    actor: Option<String>,
    state: AppState,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let topic = board_topic(&board_id);

    // 1. Register before the snapshot so no change slips between them
    let subscription = match state.hub.subscribe(&topic) {
        Ok(sub) => sub,
        Err(e) => {
            let err = encode(&ServerMessage::Error {
                message: e.to_string(),
            });
            let _ = ws_tx.send(Message::Text(err.into())).await;
            return;
        }
    };
    let connection_id = subscription.connection_id;
    let mut changes = subscription.receiver;

    // 2. Hello with the current board
    let board = match state.engine.get_board(&board_id) {
        Ok(board) => board,
        Err(e) => {
            state.hub.unregister(&topic, connection_id);
            let err = encode(&ServerMessage::Error {
                message: e.to_string(),
            });
            let _ = ws_tx.send(Message::Text(err.into())).await;
            return;
        }
    };
    let hello_version = board.version;
    let hello = encode(&ServerMessage::Hello {
        connection_id,
        board,
    });
    if ws_tx.send(Message::Text(hello.into())).await.is_err() {
        state.hub.unregister(&topic, connection_id);
        return;
    }

    log::info!(
        target: "planboard.live",
        "Connection {} joined board {} (actor={})",
        connection_id,
        board_id,
        actor.as_deref().unwrap_or("-")
    );

    // 3. Write task: change records and move replies share the socket
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let write_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                change = changes.recv() => match change {
                    Some(record) if record.version <= hello_version => continue,
                    Some(record) => ServerMessage::Change {
                        record: (*record).clone(),
                    },
                    // topic closed (board deleted)
                    None => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(reply) => reply,
                    None => break,
                },
            };
            if ws_tx.send(Message::Text(encode(&msg).into())).await.is_err() {
                break;
            }
        }
    });

    // 4. Read task: in-band move requests
    let board_id_read = board_id.clone();
    let state_read = state.clone();
    let read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            let text = match msg {
                Message::Text(t) => t,
                Message::Close(_) => break,
                _ => continue,
            };
            let reply = match serde_json::from_str::<ClientMessage>(&text) {
                Ok(request) => {
                    handle_move(&state_read, &board_id_read, actor.as_deref(), request).await
                }
                Err(e) => ServerMessage::Error {
                    message: format!("Unrecognized message: {}", e),
                },
            };
            if reply_tx.send(reply).is_err() {
                break;
            }
        }
    });

    // Wait for either task to finish, abort the other to prevent leaks
    let mut write_task = write_task;
    let mut read_task = read_task;
    tokio::select! {
        _ = &mut write_task => { read_task.abort(); }
        _ = &mut read_task => { write_task.abort(); }
    }

    // 5. Cleanup
    state.hub.unregister(&topic, connection_id);
    log::info!(
        target: "planboard.live",
        "Connection {} left board {}",
        connection_id,
        board_id
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_move_message() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{ "type": "moveTask", "requestId": "r1", "taskId": "t1", "toColumnId": "c2", "index": 0 }"#,
        )
        .unwrap();
        let ClientMessage::MoveTask {
            request_id, index, ..
        } = msg;
        assert_eq!(request_id, "r1");
        assert_eq!(index, 0);
    }

    #[test]
    fn test_failed_move_reply_shape() {
        let reply = ServerMessage::MoveResult {
            request_id: "r1".into(),
            ok: false,
            task: None,
            board: None,
            status: Some(404),
            error: Some("Task not found: t1".into()),
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "moveResult");
        assert_eq!(json["requestId"], "r1");
        assert_eq!(json["status"], 404);
        assert!(json.get("board").is_none());
    }

    #[tokio::test]
    async fn test_move_request_runs_engine() {
        let config = crate::config::ServerConfig::default();
        let state = crate::build_state(&config).await.unwrap();
        let board = state.engine.create_board("Live", None, None).unwrap();
        let (task, _) = state
            .engine
            .create_task(
                &board.id,
                &board.columns[0].id,
                None,
                planboard_core::NewTask {
                    title: "Ship".into(),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        let request = ClientMessage::MoveTask {
            request_id: "r7".into(),
            task_id: task.id.clone(),
            to_column_id: board.columns[3].id.clone(),
            index: 0,
        };
        match handle_move(&state, &board.id, Some("ann"), request).await {
            ServerMessage::MoveResult { ok, task, .. } => {
                assert!(ok);
                assert_eq!(task.unwrap().status, planboard_core::TaskStatus::Done);
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }
}
