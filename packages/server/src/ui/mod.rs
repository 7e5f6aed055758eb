//! Transport layer: axum WebSocket endpoint, read-only HTTP endpoints,
//! router wiring and graceful shutdown.

pub mod handler;
mod server;
mod signal;
mod state;

pub use server::{Server, router};
pub use state::AppState;
