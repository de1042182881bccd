/// Change records published after every committed board mutation.
use serde::{Deserialize, Serialize};

use crate::types::{Board, Column, TaskStatus};

/// Topic name observers subscribe to for a board.
pub fn board_topic(board_id: &str) -> String {
    format!("board:{}", board_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BoardEvent {
    BoardUpdated {
        name: String,
    },
    ColumnAdded {
        column: Column,
    },
    ColumnUpdated {
        column_id: String,
        title: String,
    },
    ColumnDeleted {
        column_id: String,
        deleted_tasks: Vec<String>,
    },
    ColumnsReordered {
        column_ids: Vec<String>,
    },
    TaskMoved {
        task_id: String,
        from_column_id: String,
        to_column_id: String,
        index: usize,
        status: TaskStatus,
    },
    TaskCreated {
        task_id: String,
        column_id: String,
        index: usize,
    },
    TaskDeleted {
        task_id: String,
        column_id: String,
    },
    TaskDetached {
        task_id: String,
        column_id: String,
    },
}

impl BoardEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BoardUpdated { .. } => "boardUpdated",
            Self::ColumnAdded { .. } => "columnAdded",
            Self::ColumnUpdated { .. } => "columnUpdated",
            Self::ColumnDeleted { .. } => "columnDeleted",
            Self::ColumnsReordered { .. } => "columnsReordered",
            Self::TaskMoved { .. } => "taskMoved",
            Self::TaskCreated { .. } => "taskCreated",
            Self::TaskDeleted { .. } => "taskDeleted",
            Self::TaskDetached { .. } => "taskDetached",
        }
    }
}

/// One committed mutation. `board` is the full snapshot at `version`, so an
/// observer can converge by replacing its copy wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub board_id: String,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub timestamp_ms: i64,
    pub event: BoardEvent,
    pub board: Board,
}

impl ChangeRecord {
    pub fn new(board: &Board, actor: Option<&str>, event: BoardEvent) -> Self {
        Self {
            board_id: board.id.clone(),
            version: board.version,
            actor: actor.map(str::to_string),
            timestamp_ms: board.updated_at_ms,
            event,
            board: board.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_name() {
        assert_eq!(board_topic("abc"), "board:abc");
    }

    #[test]
    fn test_event_wire_format() {
        let event = BoardEvent::TaskMoved {
            task_id: "t1".into(),
            from_column_id: "c1".into(),
            to_column_id: "c2".into(),
            index: 3,
            status: TaskStatus::Review,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "taskMoved");
        assert_eq!(json["toColumnId"], "c2");
        assert_eq!(json["status"], "Review");
        assert_eq!(event.kind(), "taskMoved");
    }

    #[test]
    fn test_record_carries_board_version() {
        let mut board = Board::new("Main", None, None);
        board.version = 9;
        let record = ChangeRecord::new(
            &board,
            Some("alice"),
            BoardEvent::ColumnsReordered { column_ids: vec![] },
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["version"], 9);
        assert_eq!(json["actor"], "alice");
        assert_eq!(json["event"]["type"], "columnsReordered");
        let back: ChangeRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
