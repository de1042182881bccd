/// The relocate-task algorithm, shared by the server engine and the client reconciler.
use serde::{Deserialize, Serialize};

use crate::error::{BoardError, BoardResult};
use crate::types::{Board, TaskStatus};

use super::PlacementIndex;

/// What a committed move did to the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    pub task_id: String,
    pub from_column_id: String,
    pub from_position: usize,
    pub to_column_id: String,
    pub to_position: usize,
    /// Status dictated by the destination column title, if it is a reserved one.
    pub derived_status: Option<TaskStatus>,
}

/// Move `task_id` into `destination_column_id` at `target_index`.
///
/// The target index is clamped to the destination length after the task has
/// left its source, so an oversized index appends. Returns `Ok(None)` when the
/// task would land where it already is; the board is then left untouched.
pub fn apply_move(
    board: &mut Board,
    task_id: &str,
    destination_column_id: &str,
    target_index: usize,
) -> BoardResult<Option<MoveOutcome>> {
    let index = PlacementIndex::build(board).map_err(|e| BoardError::corrupted(&board.id, e))?;
    let source = index.locate(task_id)?.clone();
    let dest_index = board
        .column_index(destination_column_id)
        .ok_or_else(|| BoardError::column_not_found(destination_column_id))?;

    let same_column = source.column_index == dest_index;
    let dest_len_after_removal = if same_column {
        board.columns[dest_index].tasks.len() - 1
    } else {
        board.columns[dest_index].tasks.len()
    };
    let to_position = target_index.min(dest_len_after_removal);

    if same_column && to_position == source.position {
        return Ok(None);
    }

    let removed = board.columns[source.column_index].tasks.remove(source.position);
    let destination = &mut board.columns[dest_index];
    destination.tasks.insert(to_position, removed);

    Ok(Some(MoveOutcome {
        task_id: task_id.to_string(),
        from_column_id: source.column_id,
        from_position: source.position,
        to_column_id: destination.id.clone(),
        to_position,
        derived_status: TaskStatus::for_column_title(&destination.title),
    }))
}
