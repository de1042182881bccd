/// Configuration for the Planboard server.
/// Reads server.json from ~/.config/planboard/server.json (or platform equivalent),
/// or from the path in PLANBOARD_CONFIG.
use planboard_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "PLANBOARD_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Persist boards and tasks as JSON under this directory. In-memory when unset.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_move_retry_limit")]
    pub move_retry_limit: u32,
    #[serde(default)]
    pub seed_demo_board: bool,
}

fn default_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_move_retry_limit() -> u32 {
    EngineConfig::default().max_conflict_retries
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            data_dir: None,
            move_retry_limit: default_move_retry_limit(),
            seed_demo_board: false,
        }
    }
}

impl ServerConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_conflict_retries: self.move_retry_limit,
        }
    }
}

/// Config path: $PLANBOARD_CONFIG, else ~/.config/planboard/server.json
pub fn default_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("planboard")
        .join("server.json")
}

/// Load config from path. Returns defaults if the file is missing or malformed.
pub fn load_config(path: &Path) -> ServerConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!(target: "planboard.config", "Failed to parse config {}: {}", path.display(), e);
            ServerConfig::default()
        }),
        Err(_) => {
            log::info!(target: "planboard.config", "No config at {}, using defaults", path.display());
            ServerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.json"));
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.port, 8080);
        assert_eq!(config.move_retry_limit, 3);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.json");
        fs::write(&path, r#"{ "port": 9000, "data_dir": "/var/lib/planboard" }"#).unwrap();

        let config = load_config(&path);
        assert_eq!(config.port, 9000);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/planboard")));
        assert!(!config.seed_demo_board);
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.json");
        fs::write(&path, "{ port: ").unwrap();
        assert_eq!(load_config(&path), ServerConfig::default());
    }

    #[test]
    fn test_retry_limit_reaches_engine() {
        let config = ServerConfig {
            move_retry_limit: 7,
            ..Default::default()
        };
        assert_eq!(config.engine_config().max_conflict_retries, 7);
    }
}
