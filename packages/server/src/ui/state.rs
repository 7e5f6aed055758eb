//! Server state shared by the HTTP and WebSocket handlers.

use std::sync::Arc;

use crate::gateway::Gateway;

/// Shared application state
pub struct AppState {
    /// The realtime gateway facade
    pub gateway: Arc<Gateway>,
}
