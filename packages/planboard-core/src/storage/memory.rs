/// In-memory storage backend. Boards and tasks live in two lock-guarded maps.
use std::collections::HashMap;
use std::sync::RwLock;

use super::{BoardRepository, StorageError, TaskStore};
use crate::types::{Board, Task, TaskStatus};

#[derive(Default)]
pub struct MemoryStore {
    boards: RwLock<HashMap<String, Board>>,
    tasks: RwLock<HashMap<String, Task>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn board_count(&self) -> usize {
        self.boards.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.read().map(|t| t.len()).unwrap_or(0)
    }
}

impl BoardRepository for MemoryStore {
    fn load_board(&self, board_id: &str) -> Result<Board, StorageError> {
        let boards = self.boards.read().map_err(|_| StorageError::LockPoisoned)?;
        boards
            .get(board_id)
            .cloned()
            .ok_or_else(|| StorageError::BoardNotFound(board_id.to_string()))
    }

    fn list_boards(&self) -> Result<Vec<Board>, StorageError> {
        let boards = self.boards.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(boards.values().cloned().collect())
    }

    fn create_board(&self, board: &Board) -> Result<(), StorageError> {
        let mut boards = self.boards.write().map_err(|_| StorageError::LockPoisoned)?;
        if let Some(existing) = boards.get(&board.id) {
            return Err(StorageError::VersionConflict {
                board_id: board.id.clone(),
                expected: 0,
                actual: existing.version,
            });
        }
        boards.insert(board.id.clone(), board.clone());
        Ok(())
    }

    fn save_board(&self, board: &Board, expected_version: u64) -> Result<(), StorageError> {
        let mut boards = self.boards.write().map_err(|_| StorageError::LockPoisoned)?;
        let stored = boards
            .get_mut(&board.id)
            .ok_or_else(|| StorageError::BoardNotFound(board.id.clone()))?;
        if stored.version != expected_version {
            return Err(StorageError::VersionConflict {
                board_id: board.id.clone(),
                expected: expected_version,
                actual: stored.version,
            });
        }
        *stored = board.clone();
        Ok(())
    }

    fn delete_board(&self, board_id: &str) -> Result<(), StorageError> {
        let mut boards = self.boards.write().map_err(|_| StorageError::LockPoisoned)?;
        boards
            .remove(board_id)
            .map(|_| ())
            .ok_or_else(|| StorageError::BoardNotFound(board_id.to_string()))
    }

    fn delete_tasks(&self, task_ids: &[String]) -> Result<(), StorageError> {
        let mut tasks = self.tasks.write().map_err(|_| StorageError::LockPoisoned)?;
        for id in task_ids {
            tasks.remove(id);
        }
        Ok(())
    }
}

impl TaskStore for MemoryStore {
    fn get_task(&self, task_id: &str) -> Result<Task, StorageError> {
        let tasks = self.tasks.read().map_err(|_| StorageError::LockPoisoned)?;
        tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| StorageError::TaskNotFound(task_id.to_string()))
    }

    fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StorageError> {
        let mut tasks = self.tasks.write().map_err(|_| StorageError::LockPoisoned)?;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| StorageError::TaskNotFound(task_id.to_string()))?;
        task.status = status;
        Ok(())
    }

    fn put_task(&self, task: Task) -> Result<(), StorageError> {
        let mut tasks = self.tasks.write().map_err(|_| StorageError::LockPoisoned)?;
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    fn remove_task(&self, task_id: &str) -> Result<Task, StorageError> {
        let mut tasks = self.tasks.write().map_err(|_| StorageError::LockPoisoned)?;
        tasks
            .remove(task_id)
            .ok_or_else(|| StorageError::TaskNotFound(task_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_requires_matching_version() {
        let store = MemoryStore::new();
        let mut board = Board::new("Main", None, None);
        store.create_board(&board).unwrap();

        board.version = 1;
        store.save_board(&board, 0).unwrap();

        board.version = 2;
        let err = store.save_board(&board, 0).unwrap_err();
        assert!(matches!(
            err,
            StorageError::VersionConflict {
                expected: 0,
                actual: 1,
                ..
            }
        ));
        assert_eq!(store.load_board(&board.id).unwrap().version, 1);
    }

    #[test]
    fn test_create_twice_conflicts() {
        let store = MemoryStore::new();
        let board = Board::new("Main", None, None);
        store.create_board(&board).unwrap();
        assert!(store.create_board(&board).is_err());
        assert_eq!(store.board_count(), 1);
    }

    #[test]
    fn test_delete_tasks_ignores_unknown_ids() {
        let store = MemoryStore::new();
        store
            .put_task(Task {
                id: "t1".into(),
                project_id: None,
                board_id: None,
                title: "One".into(),
                description: String::new(),
                status: TaskStatus::Todo,
                priority: Default::default(),
                due_date: None,
                assignees: Default::default(),
            })
            .unwrap();
        store
            .delete_tasks(&["t1".to_string(), "ghost".to_string()])
            .unwrap();
        assert_eq!(store.task_count(), 0);
        assert!(matches!(
            store.get_task("t1"),
            Err(StorageError::TaskNotFound(_))
        ));
    }
}
