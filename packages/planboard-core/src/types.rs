use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Column titles that seed a new board, in display order.
pub const DEFAULT_COLUMN_TITLES: &[&str] = &["To Do", "In Progress", "Review", "Done"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    /// Map a column title onto the status it drives.
    /// Only the four reserved titles carry a status; custom columns return `None`
    /// and leave a moved task's status untouched.
    pub fn for_column_title(title: &str) -> Option<Self> {
        match title {
            "To Do" => Some(Self::Todo),
            "In Progress" => Some(Self::InProgress),
            "Review" => Some(Self::Review),
            "Done" => Some(Self::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

/// A task record. Owned by the task store; a board column only references it by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Board currently holding the task, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub assignees: BTreeSet<String>,
}

/// Caller-supplied fields for a task created directly into a column.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub assignees: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: String,
    pub title: String,
    pub order: u32,
    /// Task ids in display order. The sequence is the position; tasks carry no index.
    pub tasks: Vec<String>,
}

impl Column {
    pub fn new(title: impl Into<String>, order: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            order,
            tasks: Vec::new(),
        }
    }

    pub fn position_of(&self, task_id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t == task_id)
    }
}

/// The board aggregate. Columns are embedded and kept sorted by `order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub columns: Vec<Column>,
    /// Monotonic commit counter, bumped once per committed mutation.
    pub version: u64,
    pub updated_at_ms: i64,
}

impl Board {
    /// Create a board with the given column titles, or the four default columns.
    pub fn new(name: impl Into<String>, project_id: Option<String>, titles: Option<&[String]>) -> Self {
        let columns = match titles {
            Some(titles) => titles
                .iter()
                .enumerate()
                .map(|(i, t)| Column::new(t.clone(), i as u32))
                .collect(),
            None => DEFAULT_COLUMN_TITLES
                .iter()
                .enumerate()
                .map(|(i, t)| Column::new(*t, i as u32))
                .collect(),
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            project_id,
            columns,
            version: 0,
            updated_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    pub fn column_mut(&mut self, column_id: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.id == column_id)
    }

    pub fn column_index(&self, column_id: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.id == column_id)
    }

    /// Every task id on the board, column by column.
    pub fn task_ids(&self) -> impl Iterator<Item = &String> {
        self.columns.iter().flat_map(|c| c.tasks.iter())
    }

    /// Record a committed mutation.
    pub(crate) fn touch(&mut self) {
        self.version += 1;
        self.updated_at_ms = chrono::Utc::now().timestamp_millis();
    }
}

/// A board with each column's task ids resolved to task records.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    pub id: String,
    pub name: String,
    pub version: u64,
    pub columns: Vec<ColumnView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnView {
    pub id: String,
    pub title: String,
    pub order: u32,
    pub tasks: Vec<Task>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_for_reserved_titles() {
        assert_eq!(TaskStatus::for_column_title("To Do"), Some(TaskStatus::Todo));
        assert_eq!(TaskStatus::for_column_title("In Progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::for_column_title("Review"), Some(TaskStatus::Review));
        assert_eq!(TaskStatus::for_column_title("Done"), Some(TaskStatus::Done));
        assert_eq!(TaskStatus::for_column_title("Blocked"), None);
        assert_eq!(TaskStatus::for_column_title("done"), None);
    }

    #[test]
    fn test_new_board_seeds_default_columns() {
        let board = Board::new("Main", None, None);
        let titles: Vec<_> = board.columns.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, DEFAULT_COLUMN_TITLES);
        let orders: Vec<_> = board.columns.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
        assert_eq!(board.version, 0);
    }

    #[test]
    fn test_new_board_with_custom_columns() {
        let titles = vec!["Backlog".to_string(), "Shipped".to_string()];
        let board = Board::new("Ops", Some("p1".into()), Some(titles.as_slice()));
        assert_eq!(board.columns.len(), 2);
        assert_eq!(board.columns[1].title, "Shipped");
        assert_eq!(board.columns[1].order, 1);
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"InProgress\"");
    }
}
