use std::fmt;

use crate::storage::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Board,
    Column,
    Task,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Board => f.write_str("Board"),
            Self::Column => f.write_str("Column"),
            Self::Task => f.write_str("Task"),
        }
    }
}

/// Errors surfaced by board operations.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Conflict on board {board_id}: {reason}")]
    Conflict { board_id: String, reason: String },

    /// Stored state breaks a board invariant. Never retried.
    #[error("Board {board_id} is corrupted: {reason}")]
    Corrupted { board_id: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl BoardError {
    pub fn board_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: EntityKind::Board,
            id: id.to_string(),
        }
    }

    pub fn column_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: EntityKind::Column,
            id: id.to_string(),
        }
    }

    pub fn task_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: EntityKind::Task,
            id: id.to_string(),
        }
    }

    pub fn corrupted(board_id: &str, reason: impl ToString) -> Self {
        Self::Corrupted {
            board_id: board_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<StorageError> for BoardError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::BoardNotFound(id) => Self::board_not_found(&id),
            StorageError::TaskNotFound(id) => Self::task_not_found(&id),
            StorageError::VersionConflict {
                board_id,
                expected,
                actual,
            } => Self::Conflict {
                board_id,
                reason: format!("expected version {}, found {}", expected, actual),
            },
            other => Self::Storage(other),
        }
    }
}

pub type BoardResult<T> = Result<T, BoardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_conflict_maps_to_conflict() {
        let err: BoardError = StorageError::VersionConflict {
            board_id: "b1".into(),
            expected: 3,
            actual: 4,
        }
        .into();
        assert!(err.is_conflict());
        assert_eq!(
            err.to_string(),
            "Conflict on board b1: expected version 3, found 4"
        );
    }

    #[test]
    fn test_missing_records_map_to_not_found() {
        let err: BoardError = StorageError::TaskNotFound("t9".into()).into();
        assert!(matches!(
            err,
            BoardError::NotFound {
                kind: EntityKind::Task,
                ..
            }
        ));
        assert_eq!(err.to_string(), "Task not found: t9");
    }

    #[test]
    fn test_corruption_is_not_a_conflict() {
        let err = BoardError::corrupted("b1", "task a appears in columns c1 and c2");
        assert!(!err.is_conflict());
        assert_eq!(
            err.to_string(),
            "Board b1 is corrupted: task a appears in columns c1 and c2"
        );
    }
}
