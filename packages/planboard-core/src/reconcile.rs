/// Client-side optimistic move handling.
///
/// A client applies a move to its own copy of the board as soon as the user
/// drops a card, using the same `apply_move` the server runs. The server's
/// answer then either confirms the speculation, replaces it wholesale, or
/// (on failure) the local copy is rolled back. Server state always wins.
use std::collections::HashMap;

use crate::board::{apply_move, MoveOutcome};
use crate::error::BoardResult;
use crate::events::{BoardEvent, ChangeRecord};
use crate::types::{Board, Task, TaskStatus};

/// A speculative move awaiting the server's verdict.
#[derive(Debug, Clone)]
pub struct PendingMove {
    pub task_id: String,
    pub outcome: MoveOutcome,
    /// Version of the last authoritative board when the move was applied.
    pub base_version: u64,
    snapshot: Board,
    previous_status: Option<TaskStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The server agreed with the local speculation.
    Unchanged,
    /// Local state was replaced with the server's.
    Replaced,
    /// The response was older than state already applied.
    Stale,
}

pub struct OptimisticReconciler {
    board: Board,
    /// Last board the server vouched for.
    authoritative: Board,
    statuses: HashMap<String, TaskStatus>,
}

impl OptimisticReconciler {
    pub fn new(board: Board) -> Self {
        Self {
            authoritative: board.clone(),
            board,
            statuses: HashMap::new(),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn authoritative_version(&self) -> u64 {
        self.authoritative.version
    }

    pub fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        self.statuses.get(task_id).copied()
    }

    pub fn track_status(&mut self, task_id: &str, status: TaskStatus) {
        self.statuses.insert(task_id.to_string(), status);
    }

    /// Apply a move locally. Returns `None` when the move is a no-op and
    /// there is nothing to send.
    pub fn apply_local_move(
        &mut self,
        task_id: &str,
        destination_column_id: &str,
        target_index: usize,
    ) -> BoardResult<Option<PendingMove>> {
        let snapshot = self.board.clone();
        let Some(outcome) = apply_move(&mut self.board, task_id, destination_column_id, target_index)?
        else {
            return Ok(None);
        };

        let previous_status = self.status_of(task_id);
        if let Some(status) = outcome.derived_status {
            self.track_status(task_id, status);
        }
        Ok(Some(PendingMove {
            task_id: task_id.to_string(),
            outcome,
            base_version: self.authoritative.version,
            snapshot,
            previous_status,
        }))
    }

    /// Settle a pending move with the server's response.
    pub fn confirm(&mut self, pending: PendingMove, authoritative: &Board, task: &Task) -> Reconciled {
        if authoritative.version < self.authoritative.version {
            return Reconciled::Stale;
        }
        self.authoritative = authoritative.clone();
        self.track_status(&pending.task_id, task.status);

        if self.board.columns == authoritative.columns {
            self.board.version = authoritative.version;
            self.board.updated_at_ms = authoritative.updated_at_ms;
            Reconciled::Unchanged
        } else {
            log::debug!(
                target: "planboard.reconcile",
                "Local board {} diverged from server v{}, replacing",
                authoritative.id,
                authoritative.version
            );
            self.board = authoritative.clone();
            Reconciled::Replaced
        }
    }

    /// Undo a move the server refused. If newer server state has arrived since
    /// the move was applied, fall back to that instead of the old snapshot.
    pub fn reject(&mut self, pending: PendingMove) {
        if self.authoritative.version > pending.base_version {
            self.board = self.authoritative.clone();
        } else {
            self.board = pending.snapshot;
        }
        match pending.previous_status {
            Some(status) => self.track_status(&pending.task_id, status),
            None => {
                self.statuses.remove(&pending.task_id);
            }
        }
        log::debug!(
            target: "planboard.reconcile",
            "Rolled back move of task {}",
            pending.task_id
        );
    }

    /// Converge on a broadcast change record. Records at or below the current
    /// authoritative version are ignored.
    pub fn apply_remote(&mut self, record: &ChangeRecord) -> bool {
        if record.version <= self.authoritative.version {
            return false;
        }
        self.authoritative = record.board.clone();
        self.board = record.board.clone();
        match &record.event {
            BoardEvent::TaskMoved {
                task_id, status, ..
            } => self.track_status(task_id, *status),
            BoardEvent::ColumnDeleted { deleted_tasks, .. } => {
                for id in deleted_tasks {
                    self.statuses.remove(id);
                }
            }
            BoardEvent::TaskDeleted { task_id, .. } | BoardEvent::TaskDetached { task_id, .. } => {
                self.statuses.remove(task_id);
            }
            _ => {}
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, status: TaskStatus) -> Task {
        Task {
            id: id.to_string(),
            project_id: None,
            board_id: None,
            title: id.to_string(),
            description: String::new(),
            status,
            priority: Default::default(),
            due_date: None,
            assignees: Default::default(),
        }
    }

    /// `[To Do(a, b), Done()]` at version 3.
    fn board() -> Board {
        let titles = vec!["To Do".to_string(), "Done".to_string()];
        let mut board = Board::new("Client", None, Some(titles.as_slice()));
        board.columns[0].tasks = vec!["a".into(), "b".into()];
        board.version = 3;
        board
    }

    fn server_apply(board: &Board, task_id: &str, column_id: &str, index: usize) -> Board {
        let mut next = board.clone();
        apply_move(&mut next, task_id, column_id, index).unwrap();
        next.version += 1;
        next
    }

    #[test]
    fn test_confirm_matching_response_is_noop() {
        let initial = board();
        let done = initial.columns[1].id.clone();
        let mut client = OptimisticReconciler::new(initial.clone());

        let pending = client.apply_local_move("a", &done, 0).unwrap().unwrap();
        assert_eq!(client.board().columns[1].tasks, vec!["a".to_string()]);
        assert_eq!(client.status_of("a"), Some(TaskStatus::Done));

        let server = server_apply(&initial, "a", &done, 0);
        let result = client.confirm(pending, &server, &task("a", TaskStatus::Done));
        assert_eq!(result, Reconciled::Unchanged);
        assert_eq!(client.board(), &server);
    }

    #[test]
    fn test_confirm_divergent_response_replaces() {
        let initial = board();
        let done = initial.columns[1].id.clone();
        let mut client = OptimisticReconciler::new(initial.clone());
        let pending = client.apply_local_move("a", &done, 0).unwrap().unwrap();

        // someone else moved b first
        let other = server_apply(&initial, "b", &done, 0);
        let server = server_apply(&other, "a", &done, 0);
        let result = client.confirm(pending, &server, &task("a", TaskStatus::Done));
        assert_eq!(result, Reconciled::Replaced);
        assert_eq!(client.board(), &server);
        assert_eq!(client.authoritative_version(), 5);
    }

    #[test]
    fn test_reject_restores_snapshot() {
        let initial = board();
        let done = initial.columns[1].id.clone();
        let mut client = OptimisticReconciler::new(initial.clone());
        client.track_status("a", TaskStatus::Todo);

        let pending = client.apply_local_move("a", &done, 0).unwrap().unwrap();
        client.reject(pending);
        assert_eq!(client.board(), &initial);
        assert_eq!(client.status_of("a"), Some(TaskStatus::Todo));
    }

    #[test]
    fn test_reject_after_remote_update_keeps_server_state() {
        let initial = board();
        let done = initial.columns[1].id.clone();
        let mut client = OptimisticReconciler::new(initial.clone());
        let pending = client.apply_local_move("a", &done, 0).unwrap().unwrap();

        let remote = server_apply(&initial, "b", &done, 0);
        let record = ChangeRecord::new(
            &remote,
            None,
            BoardEvent::TaskMoved {
                task_id: "b".into(),
                from_column_id: initial.columns[0].id.clone(),
                to_column_id: done.clone(),
                index: 0,
                status: TaskStatus::Done,
            },
        );
        assert!(client.apply_remote(&record));
        client.reject(pending);
        assert_eq!(client.board(), &remote);
    }

    #[test]
    fn test_stale_records_are_ignored() {
        let initial = board();
        let mut client = OptimisticReconciler::new(initial.clone());
        let mut old = initial.clone();
        old.version = 2;
        let record = ChangeRecord::new(
            &old,
            None,
            BoardEvent::ColumnsReordered { column_ids: vec![] },
        );
        assert!(!client.apply_remote(&record));
        assert_eq!(client.board(), &initial);
    }

    #[test]
    fn test_noop_local_move_yields_nothing() {
        let initial = board();
        let todo = initial.columns[0].id.clone();
        let mut client = OptimisticReconciler::new(initial.clone());
        assert!(client.apply_local_move("a", &todo, 0).unwrap().is_none());
        assert!(client.apply_local_move("ghost", &todo, 0).is_err());
        assert_eq!(client.board(), &initial);
    }
}
