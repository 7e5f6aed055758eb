//! Room manager: broadcast-group membership.
//!
//! Two room kinds exist: one personal room per user (joined unconditionally
//! on connect, used for direct server pushes) and one room per conversation
//! (joined only after authorization, which is the dispatcher's job). The
//! manager itself performs no authorization.

use std::collections::{HashMap, HashSet};

use tokio::sync::Mutex;

use crate::domain::{ConnectionId, ConversationId, UserId};

/// Identity of a broadcast group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomId {
    Personal(UserId),
    Conversation(ConversationId),
}

impl RoomId {
    pub fn personal(user_id: &UserId) -> Self {
        RoomId::Personal(user_id.clone())
    }

    pub fn conversation(conversation_id: &ConversationId) -> Self {
        RoomId::Conversation(conversation_id.clone())
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomId::Personal(user_id) => write!(f, "user:{user_id}"),
            RoomId::Conversation(conversation_id) => write!(f, "conversation:{conversation_id}"),
        }
    }
}

/// Internally synchronized room membership map.
///
/// Rooms are created lazily on first join; conversation rooms that become
/// empty are dropped so deleted or abandoned conversations leave no entry
/// behind.
pub struct RoomManager {
    rooms: Mutex<HashMap<RoomId, HashSet<ConnectionId>>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Structural insert. Idempotent: re-joining is a no-op.
    pub async fn join(&self, room: RoomId, conn_id: ConnectionId) {
        let mut rooms = self.rooms.lock().await;
        rooms.entry(room).or_default().insert(conn_id);
    }

    /// Structural removal. Unknown rooms and non-members are a no-op.
    pub async fn leave(&self, room: &RoomId, conn_id: ConnectionId) {
        let mut rooms = self.rooms.lock().await;
        if let Some(members) = rooms.get_mut(room) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    /// Snapshot of the room's member connections.
    pub async fn members(&self, room: &RoomId) -> Vec<ConnectionId> {
        let rooms = self.rooms.lock().await;
        rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn contains(&self, room: &RoomId, conn_id: ConnectionId) -> bool {
        let rooms = self.rooms.lock().await;
        rooms
            .get(room)
            .is_some_and(|members| members.contains(&conn_id))
    }

    /// Purge a connection from every room it had joined, without emitting
    /// any leave broadcasts. Called on disconnect.
    pub async fn remove_connection(&self, conn_id: ConnectionId) {
        let mut rooms = self.rooms.lock().await;
        rooms.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });
    }

    /// Evict all members of a room at once (conversation deletion). Returns
    /// the evicted connections.
    pub async fn drop_room(&self, room: &RoomId) -> Vec<ConnectionId> {
        let mut rooms = self.rooms.lock().await;
        rooms
            .remove(room)
            .map(|members| members.into_iter().collect())
            .unwrap_or_default()
    }

    /// Number of live rooms (for cleanup logging and tests).
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation_room(id: &str) -> RoomId {
        RoomId::conversation(&ConversationId::new(id))
    }

    #[tokio::test]
    async fn test_join_creates_the_room_lazily() {
        // given:
        let rooms = RoomManager::new();
        let conn = ConnectionId::generate();

        // when:
        rooms.join(conversation_room("c1"), conn).await;

        // then:
        assert_eq!(rooms.members(&conversation_room("c1")).await, vec![conn]);
        assert_eq!(rooms.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        // given:
        let rooms = RoomManager::new();
        let conn = ConnectionId::generate();
        rooms.join(conversation_room("c1"), conn).await;

        // when:
        rooms.join(conversation_room("c1"), conn).await;

        // then:
        assert_eq!(rooms.members(&conversation_room("c1")).await.len(), 1);
    }

    #[tokio::test]
    async fn test_leaving_the_last_member_drops_the_room() {
        // given:
        let rooms = RoomManager::new();
        let conn = ConnectionId::generate();
        rooms.join(conversation_room("c1"), conn).await;

        // when:
        rooms.leave(&conversation_room("c1"), conn).await;

        // then:
        assert_eq!(rooms.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_leave_on_unknown_room_is_a_noop() {
        // given:
        let rooms = RoomManager::new();

        // when:
        rooms
            .leave(&conversation_room("ghost"), ConnectionId::generate())
            .await;

        // then:
        assert_eq!(rooms.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_connection_purges_every_membership() {
        // given: a connection in its personal room and two conversations
        let rooms = RoomManager::new();
        let conn = ConnectionId::generate();
        let other = ConnectionId::generate();
        rooms
            .join(RoomId::personal(&UserId::new("alice")), conn)
            .await;
        rooms.join(conversation_room("c1"), conn).await;
        rooms.join(conversation_room("c2"), conn).await;
        rooms.join(conversation_room("c2"), other).await;

        // when:
        rooms.remove_connection(conn).await;

        // then: only the room with a remaining member survives
        assert_eq!(rooms.room_count().await, 1);
        assert_eq!(rooms.members(&conversation_room("c2")).await, vec![other]);
    }

    #[tokio::test]
    async fn test_drop_room_returns_the_evicted_members() {
        // given:
        let rooms = RoomManager::new();
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();
        rooms.join(conversation_room("c1"), a).await;
        rooms.join(conversation_room("c1"), b).await;

        // when:
        let mut evicted = rooms.drop_room(&conversation_room("c1")).await;

        // then:
        evicted.sort_by_key(|c| c.to_string());
        let mut expected = vec![a, b];
        expected.sort_by_key(|c| c.to_string());
        assert_eq!(evicted, expected);
        assert_eq!(rooms.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_personal_and_conversation_rooms_do_not_collide() {
        // given: a user id equal to a conversation id
        let rooms = RoomManager::new();
        let conn = ConnectionId::generate();
        rooms
            .join(RoomId::personal(&UserId::new("42")), conn)
            .await;

        // when / then:
        assert!(rooms.members(&conversation_room("42")).await.is_empty());
    }
}
