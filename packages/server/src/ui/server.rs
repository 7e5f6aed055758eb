//! Server execution logic.

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::gateway::{Gateway, spawn_cleanup};

use super::{
    handler::http::{get_online_users, get_user_presence, health_check},
    handler::websocket::websocket_handler,
    signal::shutdown_signal,
    state::AppState,
};

/// Build the gateway router on top of shared state.
///
/// Exposed separately from [`Server::run`] so tests can serve it on an
/// ephemeral listener.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/health", get(health_check))
        .route("/api/presence", get(get_online_users))
        .route("/api/presence/{user_id}", get(get_user_presence))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The realtime gateway server
pub struct Server {
    gateway: Arc<Gateway>,
}

impl Server {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// Run the gateway server until a shutdown signal arrives.
    ///
    /// # Arguments
    ///
    /// * `host` - The host address to bind to (e.g., "127.0.0.1")
    /// * `port` - The port number to bind to (e.g., 8080)
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let cleanup = spawn_cleanup(self.gateway.clone());

        let state = Arc::new(AppState {
            gateway: self.gateway,
        });
        let app = router(state);

        let bind_addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

        tracing::info!(
            "Realtime gateway listening on {}",
            listener.local_addr()?
        );
        tracing::info!("Connect to: ws://{}/ws?token=<bearer>", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        // Stop the cleanup timer before reporting shutdown so tests and
        // process teardown never race a live tick.
        cleanup.shutdown().await;
        tracing::info!("Server shutdown complete");

        Ok(())
    }
}
