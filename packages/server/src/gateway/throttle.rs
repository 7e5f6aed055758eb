//! "At most once per window" gate.
//!
//! One gate instance serves one concern (presence churn, typing, join/leave
//! spam, message dedupe); instances never share key spaces.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use roka_shared::time::Clock;

/// Outcome of a [`ThrottleGate::try_accept`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Accepted,
    Throttled,
}

impl ThrottleDecision {
    pub fn is_accepted(self) -> bool {
        matches!(self, ThrottleDecision::Accepted)
    }
}

/// Key → last-accepted-timestamp map with a single exclusive lock.
///
/// Contention is low and windows are short, so one mutex over the whole map
/// beats per-entry locking here.
pub struct ThrottleGate {
    entries: Mutex<HashMap<String, i64>>,
    clock: Arc<dyn Clock>,
}

impl ThrottleGate {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Accept the action keyed by `key` if no accepted action is on record,
    /// or if the last one is older than `window_ms`. A delta exactly equal to
    /// the window is still throttled.
    ///
    /// On acceptance the entry timestamp is refreshed; a throttled call never
    /// mutates state.
    pub async fn try_accept(&self, key: &str, window_ms: i64) -> ThrottleDecision {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            Some(&last) if now - last <= window_ms => ThrottleDecision::Throttled,
            _ => {
                entries.insert(key.to_string(), now);
                ThrottleDecision::Accepted
            }
        }
    }

    /// Drop every entry whose last-accepted timestamp is older than
    /// `max_age_ms`. Called by the cleanup task to bound memory.
    pub async fn evict_older_than(&self, max_age_ms: i64) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, &mut last| now - last <= max_age_ms);
        before - entries.len()
    }

    /// Number of tracked keys (for cleanup logging and tests).
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roka_shared::time::ManualClock;

    fn gate_with_clock() -> (ThrottleGate, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let gate = ThrottleGate::new(clock.clone());
        (gate, clock)
    }

    #[tokio::test]
    async fn test_first_action_for_a_key_is_accepted() {
        // given:
        let (gate, _clock) = gate_with_clock();

        // when:
        let decision = gate.try_accept("alice", 5_000).await;

        // then:
        assert_eq!(decision, ThrottleDecision::Accepted);
    }

    #[tokio::test]
    async fn test_second_action_inside_window_is_throttled() {
        // given:
        let (gate, clock) = gate_with_clock();
        gate.try_accept("alice", 5_000).await;

        // when:
        clock.advance(4_999);
        let decision = gate.try_accept("alice", 5_000).await;

        // then:
        assert_eq!(decision, ThrottleDecision::Throttled);
    }

    #[tokio::test]
    async fn test_delta_exactly_at_window_boundary_is_throttled() {
        // given:
        let (gate, clock) = gate_with_clock();
        gate.try_accept("alice", 5_000).await;

        // when:
        clock.advance(5_000);
        let decision = gate.try_accept("alice", 5_000).await;

        // then:
        assert_eq!(decision, ThrottleDecision::Throttled);
    }

    #[tokio::test]
    async fn test_action_after_window_elapsed_is_accepted() {
        // given:
        let (gate, clock) = gate_with_clock();
        gate.try_accept("alice", 5_000).await;

        // when:
        clock.advance(5_001);
        let decision = gate.try_accept("alice", 5_000).await;

        // then:
        assert_eq!(decision, ThrottleDecision::Accepted);
    }

    #[tokio::test]
    async fn test_throttled_call_does_not_refresh_the_window() {
        // given: an accepted action at t0, then a throttled retry at t0+3s
        let (gate, clock) = gate_with_clock();
        gate.try_accept("alice", 5_000).await;
        clock.advance(3_000);
        gate.try_accept("alice", 5_000).await;

        // when: the original window (from t0) elapses
        clock.advance(2_001);
        let decision = gate.try_accept("alice", 5_000).await;

        // then: accepted, because the throttled retry did not reset the clock
        assert_eq!(decision, ThrottleDecision::Accepted);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        // given:
        let (gate, _clock) = gate_with_clock();
        gate.try_accept("alice", 5_000).await;

        // when:
        let decision = gate.try_accept("bob", 5_000).await;

        // then:
        assert_eq!(decision, ThrottleDecision::Accepted);
    }

    #[tokio::test]
    async fn test_evict_older_than_reclaims_only_stale_entries() {
        // given:
        let (gate, clock) = gate_with_clock();
        gate.try_accept("stale", 1_000).await;
        clock.advance(10_000);
        gate.try_accept("fresh", 1_000).await;

        // when:
        let evicted = gate.evict_older_than(5_000).await;

        // then:
        assert_eq!(evicted, 1);
        assert_eq!(gate.len().await, 1);
        // the fresh key is still on record, so an immediate retry is throttled
        assert_eq!(
            gate.try_accept("fresh", 1_000).await,
            ThrottleDecision::Throttled
        );
    }

    #[tokio::test]
    async fn test_evict_on_empty_gate_is_a_noop() {
        // given:
        let (gate, _clock) = gate_with_clock();

        // when:
        let evicted = gate.evict_older_than(5_000).await;

        // then:
        assert_eq!(evicted, 0);
        assert!(gate.is_empty().await);
    }
}
