//! Connection registry: user ↔ live connection bookkeeping.
//!
//! The registry is the single holder of the per-connection push channels and
//! the per-user live connection counts presence is derived from.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

use crate::domain::{ConnectionId, UserId};

/// Rejection of a connection attempt over the configured per-user maximum.
///
/// The only fatal rejection in the subsystem besides authentication failure:
/// the gateway reports it to the client and then closes the transport.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("user '{user_id}' already has {limit} live connections")]
pub struct ConnectionLimitExceeded {
    pub user_id: UserId,
    pub limit: usize,
}

/// Result of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registered {
    /// True when this is the user's first live connection (the user just
    /// came online).
    pub first_connection: bool,
}

/// Result of an unregistration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unregistered {
    pub user_id: UserId,
    /// True when the user has no live connections left (the user just went
    /// offline).
    pub last_connection: bool,
}

struct ConnectionEntry {
    user_id: UserId,
    sender: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    live_counts: HashMap<UserId, usize>,
}

/// Internally synchronized connection registry.
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
    max_connections_per_user: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections_per_user: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            max_connections_per_user,
        }
    }

    /// Register a live connection for `user_id`.
    ///
    /// Rejects with [`ConnectionLimitExceeded`] when the user's live count
    /// has reached the configured maximum; the attempt leaves no trace in
    /// that case.
    pub async fn register(
        &self,
        user_id: &UserId,
        conn_id: ConnectionId,
        sender: mpsc::UnboundedSender<String>,
    ) -> Result<Registered, ConnectionLimitExceeded> {
        let mut inner = self.inner.lock().await;

        let count = inner.live_counts.get(user_id).copied().unwrap_or(0);
        if count >= self.max_connections_per_user {
            return Err(ConnectionLimitExceeded {
                user_id: user_id.clone(),
                limit: self.max_connections_per_user,
            });
        }

        inner.connections.insert(
            conn_id,
            ConnectionEntry {
                user_id: user_id.clone(),
                sender,
            },
        );
        inner.live_counts.insert(user_id.clone(), count + 1);

        Ok(Registered {
            first_connection: count == 0,
        })
    }

    /// Remove a live connection. Returns `None` when the connection was not
    /// on record (double disconnect).
    pub async fn unregister(&self, conn_id: ConnectionId) -> Option<Unregistered> {
        let mut inner = self.inner.lock().await;

        let entry = inner.connections.remove(&conn_id)?;
        let user_id = entry.user_id;

        let remaining = match inner.live_counts.get(&user_id).copied() {
            Some(count) if count > 1 => {
                inner.live_counts.insert(user_id.clone(), count - 1);
                count - 1
            }
            _ => {
                inner.live_counts.remove(&user_id);
                0
            }
        };

        Some(Unregistered {
            user_id,
            last_connection: remaining == 0,
        })
    }

    /// Point-in-time presence read: online iff the live count is > 0.
    pub async fn is_online(&self, user_id: &UserId) -> bool {
        let inner = self.inner.lock().await;
        inner.live_counts.get(user_id).copied().unwrap_or(0) > 0
    }

    /// Snapshot of every user with at least one live connection.
    pub async fn online_users(&self) -> Vec<UserId> {
        let inner = self.inner.lock().await;
        inner
            .live_counts
            .iter()
            .filter(|&(_, &count)| count > 0)
            .map(|(user_id, _)| user_id.clone())
            .collect()
    }

    pub async fn live_connection_count(&self, user_id: &UserId) -> usize {
        let inner = self.inner.lock().await;
        inner.live_counts.get(user_id).copied().unwrap_or(0)
    }

    /// Push channel of a single connection, if still registered.
    pub async fn sender(&self, conn_id: ConnectionId) -> Option<mpsc::UnboundedSender<String>> {
        let inner = self.inner.lock().await;
        inner
            .connections
            .get(&conn_id)
            .map(|entry| entry.sender.clone())
    }

    /// Push channels of the given connections, skipping ones already gone.
    pub async fn senders(
        &self,
        conn_ids: &[ConnectionId],
    ) -> Vec<(ConnectionId, mpsc::UnboundedSender<String>)> {
        let inner = self.inner.lock().await;
        conn_ids
            .iter()
            .filter_map(|conn_id| {
                inner
                    .connections
                    .get(conn_id)
                    .map(|entry| (*conn_id, entry.sender.clone()))
            })
            .collect()
    }

    /// Push channels of every live connection.
    pub async fn all_senders(&self) -> Vec<(ConnectionId, mpsc::UnboundedSender<String>)> {
        let inner = self.inner.lock().await;
        inner
            .connections
            .iter()
            .map(|(conn_id, entry)| (*conn_id, entry.sender.clone()))
            .collect()
    }

    /// Reap count bookkeeping for users with zero live connections.
    ///
    /// `unregister` already removes exhausted entries; this sweep exists so
    /// the cleanup task keeps the map bounded even if a count was left at
    /// zero by an interrupted teardown.
    pub async fn sweep_idle_counts(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let before = inner.live_counts.len();
        inner.live_counts.retain(|_, &mut count| count > 0);
        before - inner.live_counts.len()
    }
}
