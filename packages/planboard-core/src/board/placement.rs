/// Task placement index.
///
/// A derived lookup from task id to the column and position holding it. It is
/// always rebuilt from a board snapshot and never written back, so the columns'
/// `tasks` lists stay the only source of truth.
use std::collections::HashMap;

use crate::error::{BoardError, BoardResult};
use crate::types::Board;

use super::InvariantViolation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub column_id: String,
    /// Index of the column within `Board::columns`.
    pub column_index: usize,
    pub position: usize,
}

#[derive(Debug, Default)]
pub struct PlacementIndex {
    entries: HashMap<String, Placement>,
}

impl PlacementIndex {
    /// Index every task on the board. Fails if a task id appears twice.
    pub fn build(board: &Board) -> Result<Self, InvariantViolation> {
        let mut entries: HashMap<String, Placement> = HashMap::new();
        for (column_index, column) in board.columns.iter().enumerate() {
            for (position, task_id) in column.tasks.iter().enumerate() {
                if let Some(existing) = entries.get(task_id) {
                    return Err(InvariantViolation::DuplicateTask {
                        task_id: task_id.clone(),
                        first_column: existing.column_id.clone(),
                        second_column: column.id.clone(),
                    });
                }
                entries.insert(
                    task_id.clone(),
                    Placement {
                        column_id: column.id.clone(),
                        column_index,
                        position,
                    },
                );
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, task_id: &str) -> Option<&Placement> {
        self.entries.get(task_id)
    }

    /// Resolve a task's placement, failing with `NotFound` if it is not on the board.
    pub fn locate(&self, task_id: &str) -> BoardResult<&Placement> {
        self.entries
            .get(task_id)
            .ok_or_else(|| BoardError::task_not_found(task_id))
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.entries.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Column;

    fn board_with(columns: Vec<(&str, Vec<&str>)>) -> Board {
        let mut board = Board::new("Test", None, Some(&[]));
        for (order, (title, tasks)) in columns.into_iter().enumerate() {
            let mut col = Column::new(title, order as u32);
            col.tasks = tasks.into_iter().map(String::from).collect();
            board.columns.push(col);
        }
        board
    }

    #[test]
    fn test_locate_resolves_column_and_position() {
        let board = board_with(vec![("To Do", vec!["a", "b"]), ("Done", vec!["c"])]);
        let index = PlacementIndex::build(&board).unwrap();
        assert_eq!(index.len(), 3);

        let b = index.locate("b").unwrap();
        assert_eq!(b.column_id, board.columns[0].id);
        assert_eq!(b.position, 1);

        let c = index.locate("c").unwrap();
        assert_eq!(c.column_index, 1);
        assert_eq!(c.position, 0);
    }

    #[test]
    fn test_locate_unknown_task_is_not_found() {
        let board = board_with(vec![("To Do", vec!["a"])]);
        let index = PlacementIndex::build(&board).unwrap();
        assert!(matches!(
            index.locate("zzz"),
            Err(BoardError::NotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let board = board_with(vec![("To Do", vec!["a"]), ("Done", vec!["a"])]);
        let err = PlacementIndex::build(&board).unwrap_err();
        assert!(matches!(err, InvariantViolation::DuplicateTask { ref task_id, .. } if task_id == "a"));
    }

    #[test]
    fn test_empty_board() {
        let board = board_with(vec![("To Do", vec![])]);
        let index = PlacementIndex::build(&board).unwrap();
        assert!(index.is_empty());
        assert!(!index.contains("a"));
    }
}
