//! Background cleanup of transient gateway state.
//!
//! A single recurring task sweeps stale throttle entries and idle presence
//! bookkeeping so memory stays bounded under churn. It is owned by the
//! process: started alongside the gateway, stopped through its handle on
//! shutdown, so tests never leak a timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::dispatcher::Gateway;

/// Handle to the running cleanup task.
pub struct CleanupHandle {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl CleanupHandle {
    /// Stop the task and wait for it to finish its current tick.
    pub async fn shutdown(self) {
        // The task may already be gone; either way await its join handle.
        let _ = self.stop_tx.send(());
        let _ = self.handle.await;
    }
}

/// Spawn the recurring cleanup task for a [`Gateway`].
///
/// Tick interval and stale max-age come from the gateway's config. Each tick
/// evicts throttle entries older than the max-age and reaps zero-count
/// presence entries; on empty state a tick is a no-op.
pub fn spawn_cleanup(gateway: Arc<Gateway>) -> CleanupHandle {
    let interval = Duration::from_millis(gateway.config().cleanup_interval_ms);
    let (stop_tx, mut stop_rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval() fires immediately once; that first sweep is harmless.
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let swept = gateway.sweep_stale().await;
                    if swept > 0 {
                        tracing::debug!("Cleanup tick reclaimed {} stale entries", swept);
                    }
                }
                _ = &mut stop_rx => {
                    tracing::debug!("Cleanup task stopping");
                    break;
                }
            }
        }
    });

    CleanupHandle { stop_tx, handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use roka_shared::time::ManualClock;

    use crate::domain::{
        AuthenticatedUser, ConnectionId, ConversationId, MockChatStore, MockTeamMembershipStore,
        MockTokenVerifier, MockUserLookup, UserId,
    };
    use crate::gateway::{ClientEvent, ConnectionContext, GatewayConfig};

    fn gateway_with(clock: Arc<ManualClock>, cleanup_interval_ms: u64) -> Arc<Gateway> {
        let mut chat_store = MockChatStore::new();
        chat_store
            .expect_create_message()
            .returning(|_| Err(crate::domain::StoreError::Backend("unused".to_string())));
        let mut users = MockUserLookup::new();
        users.expect_find_by_id().returning(|_| Ok(None));
        Arc::new(Gateway::new(
            GatewayConfig {
                cleanup_interval_ms,
                ..GatewayConfig::default()
            },
            Arc::new(MockTokenVerifier::new()),
            Arc::new(chat_store),
            Arc::new(MockTeamMembershipStore::new()),
            Arc::new(users),
            clock,
        ))
    }

    fn ctx() -> ConnectionContext {
        ConnectionContext {
            conn_id: ConnectionId::generate(),
            user: AuthenticatedUser {
                user_id: UserId::new("alice"),
                role: "client".to_string(),
            },
        }
    }

    /// Create one dedupe gate entry through the public event path.
    async fn seed_stale_entry(gateway: &Gateway) {
        gateway
            .handle_event(
                &ctx(),
                ClientEvent::SendMessage {
                    conversation_id: ConversationId::new("c1"),
                    content: "hi".to_string(),
                    attachments: Vec::new(),
                    client_message_id: "m1".to_string(),
                    timestamp: None,
                },
            )
            .await;
    }

    #[tokio::test]
    async fn test_cleanup_task_sweeps_stale_entries_on_its_own() {
        // given: a stale dedupe entry and a fast-ticking cleanup task
        let clock = Arc::new(ManualClock::new(1_000_000));
        let gateway = gateway_with(clock.clone(), 10);
        seed_stale_entry(&gateway).await;
        clock.advance(gateway.config().stale_max_age_ms + 1);

        // when:
        let handle = spawn_cleanup(gateway.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;

        // then: the task already reclaimed the entry, a manual pass finds nothing
        assert_eq!(gateway.sweep_stale().await, 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_timer() {
        // given: a running cleanup task, stopped again
        let clock = Arc::new(ManualClock::new(1_000_000));
        let gateway = gateway_with(clock.clone(), 10);
        let handle = spawn_cleanup(gateway.clone());
        handle.shutdown().await;

        // when: an entry goes stale after the shutdown
        seed_stale_entry(&gateway).await;
        clock.advance(gateway.config().stale_max_age_ms + 1);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // then: nothing swept it in the background
        assert_eq!(gateway.sweep_stale().await, 1);
    }
}
