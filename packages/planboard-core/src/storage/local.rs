/// Local filesystem storage backend.
///
/// Keeps every board and task in memory and mirrors them as JSON files:
/// - `<root>/boards/<board_id>.json`, `<root>/tasks/<task_id>.json`
/// - Atomic writes (write to .tmp, rename)
/// - SHA-256 content hashes to skip rewriting unchanged files
/// - Compare-and-swap on board versions under the map's write lock
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::{BoardRepository, StorageError, TaskStore};
use crate::types::{Board, Task, TaskStatus};

pub struct LocalStorage {
    root: PathBuf,
    boards: RwLock<HashMap<String, Board>>,
    tasks: RwLock<HashMap<String, Task>>,
    /// path -> SHA-256 of the last content written there
    written: Mutex<HashMap<PathBuf, String>>,
}

impl LocalStorage {
    /// Open (or initialize) a storage directory and load everything in it.
    pub fn open(root: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(root.join("boards"))?;
        fs::create_dir_all(root.join("tasks"))?;

        let boards: HashMap<String, Board> = Self::load_dir(&root.join("boards"))?
            .into_iter()
            .map(|b: Board| (b.id.clone(), b))
            .collect();
        let tasks: HashMap<String, Task> = Self::load_dir(&root.join("tasks"))?
            .into_iter()
            .map(|t: Task| (t.id.clone(), t))
            .collect();

        log::info!(
            target: "planboard.storage",
            "Opened {} with {} boards and {} tasks",
            root.display(),
            boards.len(),
            tasks.len()
        );

        Ok(Self {
            root: root.to_path_buf(),
            boards: RwLock::new(boards),
            tasks: RwLock::new(tasks),
            written: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StorageError> {
        let mut items = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            match serde_json::from_str(&content) {
                Ok(item) => items.push(item),
                Err(e) => log::warn!(
                    target: "planboard.storage",
                    "Skipping unreadable record {}: {}",
                    path.display(),
                    e
                ),
            }
        }
        Ok(items)
    }

    fn board_path(&self, board_id: &str) -> PathBuf {
        self.root.join("boards").join(format!("{}.json", board_id))
    }

    fn task_path(&self, task_id: &str) -> PathBuf {
        self.root.join("tasks").join(format!("{}.json", task_id))
    }

    fn content_hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Atomic write: serialize, write to `.tmp`, rename over the target.
    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(value)?;
        let hash = Self::content_hash(&content);
        {
            let written = self.written.lock().map_err(|_| StorageError::LockPoisoned)?;
            if written.get(path) == Some(&hash) && path.exists() {
                return Ok(());
            }
        }

        let tmp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;

        self.written
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(path.to_path_buf(), hash);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<(), StorageError> {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Ok(mut written) = self.written.lock() {
            written.remove(path);
        }
        Ok(())
    }
}

impl BoardRepository for LocalStorage {
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
        self.write_json(&self.board_path(&board.id), board)?;
        boards.insert(board.id.clone(), board.clone());
        Ok(())
    }

    fn save_board(&self, board: &Board, expected_version: u64) -> Result<(), StorageError> {
        let mut boards = self.boards.write().map_err(|_| StorageError::LockPoisoned)?;
        let actual = boards
            .get(&board.id)
            .map(|b| b.version)
            .ok_or_else(|| StorageError::BoardNotFound(board.id.clone()))?;
        if actual != expected_version {
            return Err(StorageError::VersionConflict {
                board_id: board.id.clone(),
                expected: expected_version,
                actual,
            });
        }
        // Disk first: the in-memory copy only changes once the file is in place.
        self.write_json(&self.board_path(&board.id), board)?;
        boards.insert(board.id.clone(), board.clone());
        Ok(())
    }

    fn delete_board(&self, board_id: &str) -> Result<(), StorageError> {
        let mut boards = self.boards.write().map_err(|_| StorageError::LockPoisoned)?;
        if !boards.contains_key(board_id) {
            return Err(StorageError::BoardNotFound(board_id.to_string()));
        }
        self.remove_file(&self.board_path(board_id))?;
        boards.remove(board_id);
        Ok(())
    }

    fn delete_tasks(&self, task_ids: &[String]) -> Result<(), StorageError> {
        let mut tasks = self.tasks.write().map_err(|_| StorageError::LockPoisoned)?;
        for id in task_ids {
            self.remove_file(&self.task_path(id))?;
            tasks.remove(id);
        }
        Ok(())
    }
}

impl TaskStore for LocalStorage {
    fn get_task(&self, task_id: &str) -> Result<Task, StorageError> {
        let tasks = self.tasks.read().map_err(|_| StorageError::LockPoisoned)?;
        tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| StorageError::TaskNotFound(task_id.to_string()))
    }

    fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StorageError> {
        let mut tasks = self.tasks.write().map_err(|_| StorageError::LockPoisoned)?;
        let mut task = tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| StorageError::TaskNotFound(task_id.to_string()))?;
        task.status = status;
        self.write_json(&self.task_path(task_id), &task)?;
        tasks.insert(task_id.to_string(), task);
        Ok(())
    }

    fn put_task(&self, task: Task) -> Result<(), StorageError> {
        let mut tasks = self.tasks.write().map_err(|_| StorageError::LockPoisoned)?;
        self.write_json(&self.task_path(&task.id), &task)?;
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    fn remove_task(&self, task_id: &str) -> Result<Task, StorageError> {
        let mut tasks = self.tasks.write().map_err(|_| StorageError::LockPoisoned)?;
        if !tasks.contains_key(task_id) {
            return Err(StorageError::TaskNotFound(task_id.to_string()));
        }
        self.remove_file(&self.task_path(task_id))?;
        tasks
            .remove(task_id)
            .ok_or_else(|| StorageError::TaskNotFound(task_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            project_id: None,
            board_id: None,
            title: format!("Task {}", id),
            description: String::new(),
            status: TaskStatus::Todo,
            priority: Default::default(),
            due_date: None,
            assignees: Default::default(),
        }
    }

    #[test]
    fn test_board_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let mut board = Board::new("Main", None, None);
        board.columns[0].tasks.push("t1".into());
        {
            let storage = LocalStorage::open(dir.path()).unwrap();
            storage.create_board(&board).unwrap();
            storage.put_task(sample_task("t1")).unwrap();
            storage.set_status("t1", TaskStatus::Review).unwrap();
        }

        let storage = LocalStorage::open(dir.path()).unwrap();
        assert_eq!(storage.load_board(&board.id).unwrap(), board);
        assert_eq!(storage.get_task("t1").unwrap().status, TaskStatus::Review);
    }

    #[test]
    fn test_stale_save_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        let mut board = Board::new("Main", None, None);
        storage.create_board(&board).unwrap();

        board.name = "Renamed".into();
        board.version = 1;
        let err = storage.save_board(&board, 7).unwrap_err();
        assert!(matches!(err, StorageError::VersionConflict { actual: 0, .. }));

        let on_disk = fs::read_to_string(storage.board_path(&board.id)).unwrap();
        assert!(on_disk.contains("\"Main\""));
        assert!(!on_disk.contains("Renamed"));
    }

    #[test]
    fn test_no_tmp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        storage.put_task(sample_task("t1")).unwrap();
        storage.put_task(sample_task("t1")).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path().join("tasks"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["t1.json".to_string()]);
    }

    #[test]
    fn test_delete_tasks_removes_files() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        storage.put_task(sample_task("t1")).unwrap();
        storage.put_task(sample_task("t2")).unwrap();
        storage.delete_tasks(&["t1".to_string()]).unwrap();

        assert!(!storage.task_path("t1").exists());
        assert!(storage.task_path("t2").exists());
        assert!(storage.get_task("t1").is_err());
    }
}
