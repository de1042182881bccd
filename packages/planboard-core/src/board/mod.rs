//! Board ordering: column store operations, the placement index and the move algorithm.
//!
//! Everything in here is a pure transformation of a `Board` value. Locking,
//! persistence and broadcasting live in `engine`.

pub mod moves;
pub mod placement;
pub mod store;

use std::collections::HashSet;

use crate::types::Board;

pub use moves::{apply_move, MoveOutcome};
pub use placement::{Placement, PlacementIndex};

/// A broken structural invariant on a board snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("column orders are not contiguous: expected {expected}, found {found} at index {index}")]
    NonContiguousOrder {
        index: usize,
        expected: u32,
        found: u32,
    },

    #[error("task {task_id} appears in columns {first_column} and {second_column}")]
    DuplicateTask {
        task_id: String,
        first_column: String,
        second_column: String,
    },

    #[error("column id {0} is used more than once")]
    DuplicateColumn(String),
}

/// Verify the board's structural invariants:
/// column `order` values equal their index (a contiguous zero-based permutation,
/// with `columns` sorted by order), column ids are unique, and every task id
/// appears in at most one column.
pub fn check_invariants(board: &Board) -> Result<(), InvariantViolation> {
    let mut seen_columns = HashSet::new();
    for (index, column) in board.columns.iter().enumerate() {
        if column.order as usize != index {
            return Err(InvariantViolation::NonContiguousOrder {
                index,
                expected: index as u32,
                found: column.order,
            });
        }
        if !seen_columns.insert(column.id.as_str()) {
            return Err(InvariantViolation::DuplicateColumn(column.id.clone()));
        }
    }
    PlacementIndex::build(board).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Column;

    #[test]
    fn test_default_board_is_valid() {
        let board = Board::new("Main", None, None);
        assert!(check_invariants(&board).is_ok());
    }

    #[test]
    fn test_gap_in_orders_detected() {
        let mut board = Board::new("Main", None, None);
        board.columns[2].order = 5;
        assert!(matches!(
            check_invariants(&board),
            Err(InvariantViolation::NonContiguousOrder { index: 2, found: 5, .. })
        ));
    }

    #[test]
    fn test_duplicate_column_id_detected() {
        let mut board = Board::new("Main", None, None);
        let dup = Column {
            order: 4,
            ..board.columns[0].clone()
        };
        board.columns.push(dup);
        assert!(matches!(
            check_invariants(&board),
            Err(InvariantViolation::DuplicateColumn(_))
        ));
    }
}
