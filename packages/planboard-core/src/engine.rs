/// Board engine: serialized, atomic board mutations with ordered change publication.
///
/// Every mutating operation on a board runs under that board's async mutex, so
/// read-modify-write cycles on one board never interleave while different
/// boards proceed independently. Inside the lock an attempt is fully
/// synchronous: load, transform, touch the task store, compare-and-swap the
/// board, enqueue the change record. A dropped future can only be dropped while
/// waiting for the lock, before anything was written.
///
/// Task-store writes happen before the board commit and are undone if the
/// commit fails, so a failed operation leaves neither side changed. A version
/// conflict on commit re-runs the whole attempt against a fresh snapshot, up to
/// `EngineConfig::max_conflict_retries` times.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::board::{self, moves, store, MoveOutcome};
use crate::broadcast::{Outbox, Publisher};
use crate::error::{BoardError, BoardResult, EntityKind};
use crate::events::{BoardEvent, ChangeRecord};
use crate::storage::{BoardRepository, StorageError, TaskStore};
use crate::types::{Board, BoardView, Column, ColumnView, NewTask, Task, TaskStatus};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Extra attempts after a version conflict before it reaches the caller.
    pub max_conflict_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
        }
    }
}

/// Result of `move_task`: the task as it now stands and the committed board.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveResult {
    pub task: Task,
    pub board: Board,
    /// `None` when the move was a no-op and nothing was committed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<MoveOutcome>,
}

pub struct BoardEngine {
    boards: Arc<dyn BoardRepository>,
    tasks: Arc<dyn TaskStore>,
    outbox: Outbox,
    /// Per-board mutation lock
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    config: EngineConfig,
}

impl BoardEngine {
    pub fn new(
        boards: Arc<dyn BoardRepository>,
        tasks: Arc<dyn TaskStore>,
        publisher: Arc<dyn Publisher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            boards,
            tasks,
            outbox: Outbox::new(publisher),
            locks: Mutex::new(HashMap::new()),
            config,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn get_board(&self, board_id: &str) -> BoardResult<Board> {
        Ok(self.boards.load_board(board_id)?)
    }

    /// All boards, or only those of `project_id`, sorted by name.
    pub fn list_boards(&self, project_id: Option<&str>) -> BoardResult<Vec<Board>> {
        let mut boards = self.boards.list_boards()?;
        if let Some(project_id) = project_id {
            boards.retain(|b| b.project_id.as_deref() == Some(project_id));
        }
        boards.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(boards)
    }

    pub fn get_task(&self, task_id: &str) -> BoardResult<Task> {
        Ok(self.tasks.get_task(task_id)?)
    }

    /// The board with each column's ids resolved to task records.
    /// Ids whose record is gone are skipped.
    pub fn board_view(&self, board_id: &str) -> BoardResult<BoardView> {
        let board = self.boards.load_board(board_id)?;
        self.view_of(&board)
    }

    /// Resolve a board snapshot into a view.
    pub fn view_of(&self, board: &Board) -> BoardResult<BoardView> {
        let mut columns = Vec::with_capacity(board.columns.len());
        for column in &board.columns {
            let mut tasks = Vec::with_capacity(column.tasks.len());
            for task_id in &column.tasks {
                match self.tasks.get_task(task_id) {
                    Ok(task) => tasks.push(task),
                    Err(StorageError::TaskNotFound(_)) => log::debug!(
                        target: "planboard.engine",
                        "Board {} references missing task {}",
                        board.id,
                        task_id
                    ),
                    Err(e) => return Err(e.into()),
                }
            }
            columns.push(ColumnView {
                id: column.id.clone(),
                title: column.title.clone(),
                order: column.order,
                tasks,
            });
        }
        Ok(BoardView {
            id: board.id.clone(),
            name: board.name.clone(),
            version: board.version,
            columns,
        })
    }

    /// Board currently holding a task.
    pub fn board_of_task(&self, task_id: &str) -> BoardResult<String> {
        self.tasks
            .get_task(task_id)?
            .board_id
            .ok_or_else(|| BoardError::task_not_found(task_id))
    }

    // ── Boards ───────────────────────────────────────────────────────────────

    /// Create a board with the given column titles, or the four default columns.
    pub fn create_board(
        &self,
        name: &str,
        project_id: Option<String>,
        column_titles: Option<&[String]>,
    ) -> BoardResult<Board> {
        let board = Board::new(name, project_id, column_titles);
        self.boards.create_board(&board)?;
        log::info!(
            target: "planboard.engine",
            "Created board {} ({}) with {} columns",
            board.id,
            board.name,
            board.columns.len()
        );
        Ok(board)
    }

    pub async fn rename_board(
        &self,
        board_id: &str,
        name: &str,
        actor: Option<&str>,
    ) -> BoardResult<Board> {
        self.serialized(board_id, "rename_board", || {
            let mut board = self.boards.load_board(board_id)?;
            let expected = board.version;
            board.name = name.to_string();
            let event = BoardEvent::BoardUpdated {
                name: board.name.clone(),
            };
            self.commit(&mut board, expected, actor, event)?;
            Ok(board)
        })
        .await
    }

    /// Delete a board and every task it holds.
    pub async fn delete_board(&self, board_id: &str) -> BoardResult<()> {
        self.serialized(board_id, "delete_board", || {
            let board = self.boards.load_board(board_id)?;
            let task_ids: Vec<String> = board.task_ids().cloned().collect();
            let records = self.snapshot_tasks(&task_ids);
            self.boards.delete_tasks(&task_ids)?;
            if let Err(e) = self.boards.delete_board(board_id) {
                self.restore_tasks(records);
                return Err(e.into());
            }
            log::info!(
                target: "planboard.engine",
                "Deleted board {} and {} tasks",
                board_id,
                task_ids.len()
            );
            Ok(())
        })
        .await?;
        self.outbox.close(board_id);
        if let Ok(mut locks) = self.locks.lock() {
            locks.remove(board_id);
        }
        Ok(())
    }

    // ── Column store ─────────────────────────────────────────────────────────

    pub async fn add_column(
        &self,
        board_id: &str,
        title: &str,
        actor: Option<&str>,
    ) -> BoardResult<(Column, Board)> {
        self.serialized(board_id, "add_column", || {
            let mut board = self.boards.load_board(board_id)?;
            let expected = board.version;
            let column = store::add_column(&mut board, title);
            self.commit(
                &mut board,
                expected,
                actor,
                BoardEvent::ColumnAdded {
                    column: column.clone(),
                },
            )?;
            Ok((column, board))
        })
        .await
    }

    pub async fn update_column_title(
        &self,
        board_id: &str,
        column_id: &str,
        title: &str,
        actor: Option<&str>,
    ) -> BoardResult<(Column, Board)> {
        self.serialized(board_id, "update_column_title", || {
            let mut board = self.boards.load_board(board_id)?;
            let expected = board.version;
            let column = store::update_column_title(&mut board, column_id, title)?;
            self.commit(
                &mut board,
                expected,
                actor,
                BoardEvent::ColumnUpdated {
                    column_id: column.id.clone(),
                    title: column.title.clone(),
                },
            )?;
            Ok((column, board))
        })
        .await
    }

    /// Delete a column, cascade-delete its tasks and renumber the rest.
    pub async fn delete_column(
        &self,
        board_id: &str,
        column_id: &str,
        actor: Option<&str>,
    ) -> BoardResult<Board> {
        self.serialized(board_id, "delete_column", || {
            let mut board = self.boards.load_board(board_id)?;
            let expected = board.version;
            let removed = store::delete_column(&mut board, column_id)?;

            let records = self.snapshot_tasks(&removed.tasks);
            self.boards.delete_tasks(&removed.tasks)?;
            let event = BoardEvent::ColumnDeleted {
                column_id: removed.id.clone(),
                deleted_tasks: removed.tasks.clone(),
            };
            if let Err(e) = self.commit(&mut board, expected, actor, event) {
                self.restore_tasks(records);
                return Err(e);
            }
            Ok(board)
        })
        .await
    }

    pub async fn reorder_columns(
        &self,
        board_id: &str,
        ordered_ids: &[String],
        actor: Option<&str>,
    ) -> BoardResult<Board> {
        self.serialized(board_id, "reorder_columns", || {
            let mut board = self.boards.load_board(board_id)?;
            let expected = board.version;
            store::reorder_columns(&mut board, ordered_ids)?;
            self.commit(
                &mut board,
                expected,
                actor,
                BoardEvent::ColumnsReordered {
                    column_ids: ordered_ids.to_vec(),
                },
            )?;
            Ok(board)
        })
        .await
    }

    // ── Tasks ────────────────────────────────────────────────────────────────

    /// Relocate a task to `destination_column_id` at `target_index` (clamped).
    /// Sets the task status when the destination title dictates a different one.
    pub async fn move_task(
        &self,
        board_id: &str,
        task_id: &str,
        destination_column_id: &str,
        target_index: usize,
        actor: Option<&str>,
    ) -> BoardResult<MoveResult> {
        self.serialized(board_id, "move_task", || {
            let mut board = self.boards.load_board(board_id)?;
            let expected = board.version;
            let outcome =
                moves::apply_move(&mut board, task_id, destination_column_id, target_index)?;
            let mut task = self.tasks.get_task(task_id)?;

            let Some(outcome) = outcome else {
                log::debug!(
                    target: "planboard.engine",
                    "Move of task {} on board {} is a no-op",
                    task_id,
                    board_id
                );
                return Ok(MoveResult {
                    task,
                    board,
                    outcome: None,
                });
            };

            let previous = task.status;
            let status_change = outcome.derived_status.filter(|s| *s != previous);
            if let Some(status) = status_change {
                self.tasks.set_status(task_id, status)?;
                task.status = status;
            }

            let event = BoardEvent::TaskMoved {
                task_id: task_id.to_string(),
                from_column_id: outcome.from_column_id.clone(),
                to_column_id: outcome.to_column_id.clone(),
                index: outcome.to_position,
                status: task.status,
            };
            if let Err(e) = self.commit(&mut board, expected, actor, event) {
                if status_change.is_some() {
                    self.undo(self.tasks.set_status(task_id, previous), "restore status", task_id);
                }
                return Err(e);
            }

            log::info!(
                target: "planboard.engine",
                "Moved task {} on board {} to column {} at {} (v{})",
                task_id,
                board_id,
                outcome.to_column_id,
                outcome.to_position,
                board.version
            );
            Ok(MoveResult {
                task,
                board,
                outcome: Some(outcome),
            })
        })
        .await
    }

    /// Create a task directly into a column. `position` is clamped; `None` appends.
    pub async fn create_task(
        &self,
        board_id: &str,
        column_id: &str,
        position: Option<usize>,
        new_task: NewTask,
        actor: Option<&str>,
    ) -> BoardResult<(Task, Board)> {
        self.serialized(board_id, "create_task", || {
            let mut board = self.boards.load_board(board_id)?;
            let expected = board.version;
            let task_id = uuid::Uuid::new_v4().to_string();
            let index = store::place_task(&mut board, column_id, &task_id, position)?;
            let column_title = board
                .column(column_id)
                .map(|c| c.title.as_str())
                .unwrap_or_default();
            let status = TaskStatus::for_column_title(column_title)
                .or(new_task.status)
                .unwrap_or_default();

            let task = Task {
                id: task_id.clone(),
                project_id: new_task.project_id.clone().or_else(|| board.project_id.clone()),
                board_id: Some(board.id.clone()),
                title: new_task.title.clone(),
                description: new_task.description.clone(),
                status,
                priority: new_task.priority,
                due_date: new_task.due_date,
                assignees: new_task.assignees.clone(),
            };
            self.tasks.put_task(task.clone())?;

            let event = BoardEvent::TaskCreated {
                task_id: task_id.clone(),
                column_id: column_id.to_string(),
                index,
            };
            if let Err(e) = self.commit(&mut board, expected, actor, event) {
                self.undo(self.tasks.remove_task(&task_id).map(|_| ()), "drop created task", &task_id);
                return Err(e);
            }
            Ok((task, board))
        })
        .await
    }

    /// Destroy a task and evict it from its column.
    pub async fn delete_task(&self, task_id: &str, actor: Option<&str>) -> BoardResult<Option<Board>> {
        let Some(board_id) = self.tasks.get_task(task_id)?.board_id else {
            self.tasks.remove_task(task_id)?;
            return Ok(None);
        };

        self.serialized(&board_id, "delete_task", || {
            let mut board = self.boards.load_board(&board_id)?;
            let expected = board.version;
            let removed = store::remove_task(&mut board, task_id);
            let record = self.tasks.remove_task(task_id)?;

            let Some((column_id, _)) = removed else {
                return Ok(Some(board));
            };
            let event = BoardEvent::TaskDeleted {
                task_id: task_id.to_string(),
                column_id,
            };
            if let Err(e) = self.commit(&mut board, expected, actor, event) {
                self.undo(self.tasks.put_task(record), "restore deleted task", task_id);
                return Err(e);
            }
            Ok(Some(board))
        })
        .await
    }

    /// Take a task off the board without destroying its record.
    pub async fn detach_task(
        &self,
        board_id: &str,
        task_id: &str,
        actor: Option<&str>,
    ) -> BoardResult<(Task, Board)> {
        self.serialized(board_id, "detach_task", || {
            let mut board = self.boards.load_board(board_id)?;
            let expected = board.version;
            let (column_id, _) = store::remove_task(&mut board, task_id)
                .ok_or_else(|| BoardError::task_not_found(task_id))?;

            let original = self.tasks.get_task(task_id)?;
            let mut task = original.clone();
            task.board_id = None;
            self.tasks.put_task(task.clone())?;

            let event = BoardEvent::TaskDetached {
                task_id: task_id.to_string(),
                column_id,
            };
            if let Err(e) = self.commit(&mut board, expected, actor, event) {
                self.undo(self.tasks.put_task(original), "reattach task", task_id);
                return Err(e);
            }
            Ok((task, board))
        })
        .await
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn board_lock(&self, board_id: &str) -> BoardResult<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| BoardError::Storage(StorageError::LockPoisoned))?;
        Ok(locks
            .entry(board_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }

    /// Drop the lock entry of a board that turned out not to exist, unless
    /// another caller is holding or waiting on it.
    fn release_lock(&self, board_id: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        if let Ok(mut locks) = self.locks.lock() {
            // one reference in the map, one held by the caller
            if Arc::strong_count(lock) == 2 {
                locks.remove(board_id);
            }
        }
    }

    /// Run `attempt` under the board lock, re-running it on version conflicts.
    async fn serialized<T>(
        &self,
        board_id: &str,
        operation: &'static str,
        attempt: impl FnMut() -> BoardResult<T>,
    ) -> BoardResult<T> {
        let lock = self.board_lock(board_id)?;
        let guard = lock.lock().await;

        // attempts do blocking storage I/O; keep it off the async workers when possible
        let on_multi_thread = Handle::try_current()
            .map(|h| h.runtime_flavor() == RuntimeFlavor::MultiThread)
            .unwrap_or(false);
        let result = if on_multi_thread {
            tokio::task::block_in_place(|| self.run_attempts(board_id, operation, attempt))
        } else {
            self.run_attempts(board_id, operation, attempt)
        };
        drop(guard);

        if let Err(BoardError::NotFound {
            kind: EntityKind::Board,
            ..
        }) = &result
        {
            self.release_lock(board_id, &lock);
        }
        result
    }

    fn run_attempts<T>(
        &self,
        board_id: &str,
        operation: &'static str,
        mut attempt: impl FnMut() -> BoardResult<T>,
    ) -> BoardResult<T> {
        let mut retries = 0;
        loop {
            match attempt() {
                Err(e) if e.is_conflict() && retries < self.config.max_conflict_retries => {
                    retries += 1;
                    log::warn!(
                        target: "planboard.engine",
                        "{} on board {} hit a conflict ({}), retry {}/{}",
                        operation,
                        board_id,
                        e,
                        retries,
                        self.config.max_conflict_retries
                    );
                }
                Err(e) => {
                    log::debug!(
                        target: "planboard.engine",
                        "{} on board {} failed: {}",
                        operation,
                        board_id,
                        e
                    );
                    return Err(e);
                }
                Ok(value) => return Ok(value),
            }
        }
    }

    /// Bump the version, compare-and-swap the board, then queue its change record.
    fn commit(
        &self,
        board: &mut Board,
        expected_version: u64,
        actor: Option<&str>,
        event: BoardEvent,
    ) -> BoardResult<()> {
        board.touch();
        debug_assert!(board::check_invariants(board).is_ok());
        self.boards.save_board(board, expected_version)?;
        self.outbox.enqueue(ChangeRecord::new(board, actor, event));
        Ok(())
    }

    fn snapshot_tasks(&self, task_ids: &[String]) -> Vec<Task> {
        task_ids
            .iter()
            .filter_map(|id| self.tasks.get_task(id).ok())
            .collect()
    }

    fn restore_tasks(&self, records: Vec<Task>) {
        for task in records {
            let id = task.id.clone();
            self.undo(self.tasks.put_task(task), "restore cascaded task", &id);
        }
    }

    fn undo(&self, result: Result<(), StorageError>, what: &str, task_id: &str) {
        if let Err(e) = result {
            log::error!(
                target: "planboard.engine",
                "Failed to {} for task {}: {}",
                what,
                task_id,
                e
            );
        }
    }
}
