pub mod local;
pub mod memory;

use crate::types::{Board, Task, TaskStatus};

/// Persistence collaborator for board aggregates.
/// Implementations: MemoryStore (tests, ephemeral servers), LocalStorage (JSON files).
pub trait BoardRepository: Send + Sync {
    fn load_board(&self, board_id: &str) -> Result<Board, StorageError>;

    /// Every stored board, in no particular order.
    fn list_boards(&self) -> Result<Vec<Board>, StorageError>;

    /// Store a brand-new board. Fails with `VersionConflict` if the id is taken.
    fn create_board(&self, board: &Board) -> Result<(), StorageError>;

    /// Replace the whole aggregate, compare-and-swap on the version.
    /// The stored board must still carry `expected_version`, otherwise nothing
    /// is written and `VersionConflict` is returned.
    fn save_board(&self, board: &Board, expected_version: u64) -> Result<(), StorageError>;

    fn delete_board(&self, board_id: &str) -> Result<(), StorageError>;

    /// Destroy task records (column cascade). Unknown ids are ignored.
    fn delete_tasks(&self, task_ids: &[String]) -> Result<(), StorageError>;
}

/// Task store collaborator. Owns task lifetime; boards only reference ids.
pub trait TaskStore: Send + Sync {
    fn get_task(&self, task_id: &str) -> Result<Task, StorageError>;

    fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StorageError>;

    /// Insert or replace a task record.
    fn put_task(&self, task: Task) -> Result<(), StorageError>;

    /// Remove a record, returning it.
    fn remove_task(&self, task_id: &str) -> Result<Task, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Board not found: {0}")]
    BoardNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Version conflict on board {board_id}: expected {expected}, found {actual}")]
    VersionConflict {
        board_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
