//! Gateway configuration knobs.

/// Tunable limits and throttle windows for the gateway.
///
/// All windows are expressed in milliseconds and compared against wall-clock
/// deltas from the injected [`Clock`](roka_shared::time::Clock).
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Maximum concurrent connections a single user may hold.
    pub max_connections_per_user: usize,
    /// Minimum interval between two presence (online/offline) broadcasts for
    /// the same user.
    pub presence_window_ms: i64,
    /// Minimum interval between two forwarded `typing_start` events from the
    /// same user.
    pub typing_window_ms: i64,
    /// Minimum interval between two join/leave broadcasts for the same
    /// user + conversation pair.
    pub join_leave_window_ms: i64,
    /// Window within which a reused client message id is rejected as a
    /// duplicate.
    pub dedupe_window_ms: i64,
    /// Tick interval of the background cleanup task.
    pub cleanup_interval_ms: u64,
    /// Throttle entries older than this are reclaimed by cleanup.
    pub stale_max_age_ms: i64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_connections_per_user: 5,
            presence_window_ms: 10_000,
            typing_window_ms: 2_000,
            join_leave_window_ms: 2_000,
            dedupe_window_ms: 5_000,
            cleanup_interval_ms: 60_000,
            stale_max_age_ms: 300_000,
        }
    }
}
