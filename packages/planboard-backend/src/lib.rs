/// Planboard backend: config loading, storage init, HTTP and live endpoints.
pub mod api;
pub mod config;
pub mod live;
mod log_bridge;
mod server;
pub mod state;

use crate::config::ServerConfig;
use crate::state::AppState;
use planboard_core::storage::local::LocalStorage;
use planboard_core::storage::memory::MemoryStore;
use planboard_core::storage::{BoardRepository, StorageError, TaskStore};
use planboard_core::{BoardEngine, BoardError, BroadcastHub, NewTask};
use std::sync::Arc;

pub use server::build_router;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Failed to open storage: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to seed demo board: {0}")]
    Seed(#[from] BoardError),

    #[error("Failed to start HTTP server: {0}")]
    Server(#[from] std::io::Error),
}

/// Wire storage, hub and engine together according to `config`.
pub async fn build_state(config: &ServerConfig) -> Result<AppState, StartupError> {
    let (boards, tasks): (Arc<dyn BoardRepository>, Arc<dyn TaskStore>) = match &config.data_dir {
        Some(dir) => {
            let storage = Arc::new(LocalStorage::open(dir)?);
            (storage.clone(), storage)
        }
        None => {
            log::info!(target: "planboard.startup", "No data_dir configured, boards are kept in memory");
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store)
        }
    };

    let hub = Arc::new(BroadcastHub::new());
    let engine = Arc::new(BoardEngine::new(
        boards,
        tasks,
        hub.clone(),
        config.engine_config(),
    ));

    if config.seed_demo_board {
        seed_demo_board(&engine).await?;
    }

    Ok(AppState {
        engine,
        hub,
        port: config.port,
        bind_address: config.bind_address.clone(),
    })
}

async fn seed_demo_board(engine: &BoardEngine) -> Result<(), BoardError> {
    let board = engine.create_board("Demo", None, None)?;
    let samples = [
        (0, "Sketch the column layout"),
        (0, "Write onboarding notes"),
        (1, "Wire up live updates"),
        (3, "Create the demo board"),
    ];
    for (column, title) in samples {
        let Some(column) = board.columns.get(column) else {
            continue;
        };
        let new_task = NewTask {
            title: title.to_string(),
            ..Default::default()
        };
        engine
            .create_task(&board.id, &column.id, None, new_task, Some("seed"))
            .await?;
    }
    log::info!(target: "planboard.startup", "Seeded demo board {}", board.id);
    Ok(())
}

/// Start logging, load config, serve until ctrl-c.
pub async fn run() -> Result<(), StartupError> {
    if let Err(e) = log_bridge::init() {
        eprintln!("failed to initialize logger: {}", e);
    }

    let config_path = config::default_config_path();
    let config = config::load_config(&config_path);
    let state = build_state(&config).await?;
    let port = server::spawn_server(state).await?;
    log::info!(target: "planboard.startup", "Planboard ready on port {}", port);

    tokio::signal::ctrl_c().await?;
    log::info!(target: "planboard.startup", "Shutting down");
    Ok(())
}
