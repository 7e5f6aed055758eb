//! Typed wire events and the fan-out plan.
//!
//! Inbound frames deserialize into [`ClientEvent`]; handlers answer with a
//! list of [`Emit`] entries which a separate delivery step resolves to live
//! senders. Field names are camelCase on the wire for the web frontend.

use serde::{Deserialize, Serialize};

use crate::domain::{
    Attachment, ConnectionId, ConversationId, Message, MessageId, UserId, UserProfile,
};

use super::room::RoomId;

/// Events received from a connected client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinUserRoom { user_id: UserId },
    #[serde(rename_all = "camelCase")]
    JoinConversation { conversation_id: ConversationId },
    #[serde(rename_all = "camelCase")]
    LeaveConversation { conversation_id: ConversationId },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        conversation_id: ConversationId,
        content: String,
        #[serde(default)]
        attachments: Vec<Attachment>,
        client_message_id: String,
        /// Client-side send time; accepted for wire compatibility, the
        /// durable timestamp is stamped by the chat store.
        #[serde(default)]
        timestamp: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    TypingStart { conversation_id: ConversationId },
    #[serde(rename_all = "camelCase")]
    TypingStop { conversation_id: ConversationId },
    #[serde(rename_all = "camelCase")]
    MarkMessageRead {
        message_id: MessageId,
        conversation_id: ConversationId,
    },
    #[serde(rename_all = "camelCase")]
    UpdateConversation {
        conversation_id: ConversationId,
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    DeleteConversation { conversation_id: ConversationId },
}

/// Error kinds carried by `message_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageErrorKind {
    DuplicateMessage,
    MessageSendFailed,
}

/// Error kinds carried by `connection_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionErrorKind {
    ConnectionLimitExceeded,
}

/// A persisted message enriched with sender display data, as broadcast to a
/// conversation room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBroadcast {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: UserProfile,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    pub client_message_id: String,
    pub sent_at: i64,
}

impl MessageBroadcast {
    pub fn enrich(message: Message, sender: UserProfile) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender,
            content: message.content,
            attachments: message.attachments,
            client_message_id: message.client_message_id,
            sent_at: message.sent_at,
        }
    }
}

/// Events pushed to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    UserReady { user_id: UserId },
    #[serde(rename_all = "camelCase")]
    UserOnline { user_id: UserId },
    #[serde(rename_all = "camelCase")]
    UserOffline { user_id: UserId },
    #[serde(rename_all = "camelCase")]
    UserJoinedConversation {
        conversation_id: ConversationId,
        user_id: UserId,
    },
    #[serde(rename_all = "camelCase")]
    JoinConversationError {
        conversation_id: ConversationId,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    NewMessage { message: MessageBroadcast },
    #[serde(rename_all = "camelCase")]
    MessageSent {
        message_id: MessageId,
        client_message_id: String,
        conversation_id: ConversationId,
    },
    #[serde(rename_all = "camelCase")]
    MessageError {
        /// Echoes the client-supplied message id of the failed send.
        message_id: String,
        error: MessageErrorKind,
    },
    #[serde(rename_all = "camelCase")]
    UserTyping {
        conversation_id: ConversationId,
        user_id: UserId,
        is_typing: bool,
    },
    #[serde(rename_all = "camelCase")]
    MessageRead {
        message_id: MessageId,
        conversation_id: ConversationId,
        user_id: UserId,
    },
    #[serde(rename_all = "camelCase")]
    ConversationUpdated {
        conversation_id: ConversationId,
        name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ConversationDeleted { conversation_id: ConversationId },
    #[serde(rename_all = "camelCase")]
    ConversationError {
        conversation_id: ConversationId,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    ConnectionError {
        error: ConnectionErrorKind,
        message: String,
    },
}

/// Where an outbound event should be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A single connection.
    Connection(ConnectionId),
    /// Every current member of a room.
    Room(RoomId),
    /// Every member of a room except one connection (typically the sender).
    RoomExcept(RoomId, ConnectionId),
    /// Every live connection on this gateway.
    Everyone,
}

/// One planned emission: an event and its delivery target.
#[derive(Debug, Clone)]
pub struct Emit {
    pub target: Target,
    pub event: ServerEvent,
}

impl Emit {
    pub fn to_connection(conn_id: ConnectionId, event: ServerEvent) -> Self {
        Self {
            target: Target::Connection(conn_id),
            event,
        }
    }

    pub fn to_room(room: RoomId, event: ServerEvent) -> Self {
        Self {
            target: Target::Room(room),
            event,
        }
    }

    pub fn to_room_except(room: RoomId, except: ConnectionId, event: ServerEvent) -> Self {
        Self {
            target: Target::RoomExcept(room, except),
            event,
        }
    }

    pub fn to_everyone(event: ServerEvent) -> Self {
        Self {
            target: Target::Everyone,
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_deserializes_send_message() {
        // given:
        let frame = r#"{
            "event": "send_message",
            "conversationId": "c1",
            "content": "hi",
            "clientMessageId": "m1",
            "timestamp": 1700000000000
        }"#;

        // when:
        let event: ClientEvent = serde_json::from_str(frame).unwrap();

        // then:
        match event {
            ClientEvent::SendMessage {
                conversation_id,
                content,
                attachments,
                client_message_id,
                timestamp,
            } => {
                assert_eq!(conversation_id.as_str(), "c1");
                assert_eq!(content, "hi");
                assert!(attachments.is_empty());
                assert_eq!(client_message_id, "m1");
                assert_eq!(timestamp, Some(1700000000000));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_client_event_rejects_unknown_tag() {
        // given:
        let frame = r#"{"event": "shutdown_server"}"#;

        // when:
        let result = serde_json::from_str::<ClientEvent>(frame);

        // then:
        assert!(result.is_err());
    }

    #[test]
    fn test_server_event_serializes_with_snake_case_tag() {
        // given:
        let event = ServerEvent::MessageError {
            message_id: "m1".to_string(),
            error: MessageErrorKind::DuplicateMessage,
        };

        // when:
        let json = serde_json::to_value(&event).unwrap();

        // then:
        assert_eq!(json["event"], "message_error");
        assert_eq!(json["messageId"], "m1");
        assert_eq!(json["error"], "DuplicateMessage");
    }

    #[test]
    fn test_user_typing_serializes_camel_case_fields() {
        // given:
        let event = ServerEvent::UserTyping {
            conversation_id: ConversationId::new("c9"),
            user_id: UserId::new("alice"),
            is_typing: true,
        };

        // when:
        let json = serde_json::to_value(&event).unwrap();

        // then:
        assert_eq!(json["event"], "user_typing");
        assert_eq!(json["conversationId"], "c9");
        assert_eq!(json["isTyping"], true);
    }
}
