/// Column store: ordered columns of a single board.
///
/// These functions mutate a board snapshot in place and keep `columns` sorted
/// with `order == index`. They never touch the board version; the engine does
/// that once per committed operation.
use std::collections::HashSet;

use crate::error::{BoardError, BoardResult};
use crate::types::{Board, Column};

use super::PlacementIndex;

/// Append a column at the end: `order = max(order) + 1`, or 0 on an empty board.
pub fn add_column(board: &mut Board, title: &str) -> Column {
    let order = board
        .columns
        .iter()
        .map(|c| c.order)
        .max()
        .map_or(0, |max| max + 1);
    let column = Column::new(title, order);
    board.columns.push(column.clone());
    column
}

pub fn update_column_title(board: &mut Board, column_id: &str, title: &str) -> BoardResult<Column> {
    let column = board
        .column_mut(column_id)
        .ok_or_else(|| BoardError::column_not_found(column_id))?;
    column.title = title.to_string();
    Ok(column.clone())
}

/// Remove a column and renumber the remaining ones. Returns the removed column,
/// whose `tasks` the caller must cascade-delete.
pub fn delete_column(board: &mut Board, column_id: &str) -> BoardResult<Column> {
    let index = board
        .column_index(column_id)
        .ok_or_else(|| BoardError::column_not_found(column_id))?;
    let removed = board.columns.remove(index);
    renumber(board);
    Ok(removed)
}

/// Reorder columns to match `ordered_ids`, which must be an exact permutation
/// of the board's current column ids. The board is untouched on error.
pub fn reorder_columns(board: &mut Board, ordered_ids: &[String]) -> BoardResult<()> {
    if ordered_ids.len() != board.columns.len() {
        return Err(BoardError::InvalidArgument(format!(
            "expected {} column ids, got {}",
            board.columns.len(),
            ordered_ids.len()
        )));
    }
    let mut seen = HashSet::with_capacity(ordered_ids.len());
    for id in ordered_ids {
        if !seen.insert(id.as_str()) {
            return Err(BoardError::InvalidArgument(format!(
                "duplicate column id {}",
                id
            )));
        }
        if board.column(id).is_none() {
            return Err(BoardError::InvalidArgument(format!(
                "column {} does not belong to board {}",
                id, board.id
            )));
        }
    }

    let mut remaining = std::mem::take(&mut board.columns);
    for id in ordered_ids {
        if let Some(pos) = remaining.iter().position(|c| &c.id == id) {
            board.columns.push(remaining.swap_remove(pos));
        }
    }
    renumber(board);
    Ok(())
}

/// Insert a task id into a column. `position` is clamped to the column length;
/// `None` appends. Returns the resulting index.
pub fn place_task(
    board: &mut Board,
    column_id: &str,
    task_id: &str,
    position: Option<usize>,
) -> BoardResult<usize> {
    let index = PlacementIndex::build(board).map_err(|e| BoardError::corrupted(&board.id, e))?;
    if let Some(existing) = index.get(task_id) {
        return Err(BoardError::InvalidArgument(format!(
            "task {} is already placed in column {}",
            task_id, existing.column_id
        )));
    }
    let column = board
        .column_mut(column_id)
        .ok_or_else(|| BoardError::column_not_found(column_id))?;
    let at = position.map_or(column.tasks.len(), |p| p.min(column.tasks.len()));
    column.tasks.insert(at, task_id.to_string());
    Ok(at)
}

/// Remove a task id from whichever column holds it.
/// Returns the column id and the index it was removed from.
pub fn remove_task(board: &mut Board, task_id: &str) -> Option<(String, usize)> {
    for column in &mut board.columns {
        if let Some(pos) = column.position_of(task_id) {
            column.tasks.remove(pos);
            return Some((column.id.clone(), pos));
        }
    }
    None
}

fn renumber(board: &mut Board) {
    for (index, column) in board.columns.iter_mut().enumerate() {
        column.order = index as u32;
    }
}
