/// HTTP server: spawns axum on a background tokio task.
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::api::api_router;
use crate::live::live_router;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    api_router()
        .merge(live_router())
        .layer(cors)
        .with_state(state)
}

pub async fn spawn_server(state: AppState) -> Result<u16, std::io::Error> {
    let bind_addr = format!("{}:{}", state.bind_address, state.port);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let actual = listener.local_addr()?;

    log::info!(target: "planboard.server", "HTTP server listening on http://{}", actual);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            log::error!(target: "planboard.server", "HTTP server exited with error: {}", e);
        }
    });

    Ok(actual.port())
}
