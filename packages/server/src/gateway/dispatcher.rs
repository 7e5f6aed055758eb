//! Event dispatcher: the gateway facade.
//!
//! Wires the connection registry, room manager and throttle gates to the
//! collaborator traits. Handlers are pure with respect to the transport: each
//! returns the list of emissions it wants performed and [`Gateway::deliver`]
//! does the actual fan-out, so the per-connection state machine is testable
//! without a socket.

use std::sync::Arc;

use tokio::sync::mpsc;

use roka_shared::time::Clock;

use crate::domain::{
    AuthError, AuthenticatedUser, ChatStore, ConnectionId, ConversationId, ConversationPatch,
    NewMessage, TeamMembershipStore, TokenVerifier, UserId, UserLookup, UserProfile,
};

use super::config::GatewayConfig;
use super::event::{ClientEvent, Emit, MessageBroadcast, MessageErrorKind, ServerEvent, Target};
use super::registry::{ConnectionLimitExceeded, ConnectionRegistry};
use super::room::{RoomId, RoomManager};
use super::throttle::ThrottleGate;

/// Identity of one live, authenticated connection.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub conn_id: ConnectionId,
    pub user: AuthenticatedUser,
}

/// The realtime gateway.
///
/// One instance per process; every shared structure lives inside and is
/// internally synchronized. Constructed once at startup with its collaborator
/// implementations and handed to the transport layer behind an `Arc`.
pub struct Gateway {
    config: GatewayConfig,
    registry: ConnectionRegistry,
    rooms: RoomManager,
    presence_gate: ThrottleGate,
    typing_gate: ThrottleGate,
    join_leave_gate: ThrottleGate,
    dedupe_gate: ThrottleGate,
    verifier: Arc<dyn TokenVerifier>,
    chat_store: Arc<dyn ChatStore>,
    teams: Arc<dyn TeamMembershipStore>,
    users: Arc<dyn UserLookup>,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        verifier: Arc<dyn TokenVerifier>,
        chat_store: Arc<dyn ChatStore>,
        teams: Arc<dyn TeamMembershipStore>,
        users: Arc<dyn UserLookup>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry: ConnectionRegistry::new(config.max_connections_per_user),
            rooms: RoomManager::new(),
            presence_gate: ThrottleGate::new(clock.clone()),
            typing_gate: ThrottleGate::new(clock.clone()),
            join_leave_gate: ThrottleGate::new(clock.clone()),
            dedupe_gate: ThrottleGate::new(clock),
            config,
            verifier,
            chat_store,
            teams,
            users,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Verify the bearer credential presented at handshake time.
    pub async fn authenticate(&self, credential: &str) -> Result<AuthenticatedUser, AuthError> {
        self.verifier.verify(credential).await
    }

    /// Point-in-time presence read.
    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.registry.is_online(user_id).await
    }

    /// Snapshot of all currently online users.
    pub async fn online_users(&self) -> Vec<UserId> {
        self.registry.online_users().await
    }

    /// Register an authenticated connection.
    ///
    /// On success the connection is placed in its personal room and receives
    /// `user_ready`; the user's first connection additionally triggers a
    /// presence-throttled global `user_online`. A [`ConnectionLimitExceeded`]
    /// rejection leaves no state behind; the transport layer reports it and
    /// closes the socket.
    pub async fn connect(
        &self,
        ctx: &ConnectionContext,
        sender: mpsc::UnboundedSender<String>,
    ) -> Result<Vec<Emit>, ConnectionLimitExceeded> {
        let user_id = &ctx.user.user_id;
        let registered = self.registry.register(user_id, ctx.conn_id, sender).await?;

        self.rooms
            .join(RoomId::personal(user_id), ctx.conn_id)
            .await;
        tracing::info!(
            "Connection '{}' registered for user '{}' (role '{}')",
            ctx.conn_id,
            user_id,
            ctx.user.role
        );

        let mut emits = vec![Emit::to_connection(
            ctx.conn_id,
            ServerEvent::UserReady {
                user_id: user_id.clone(),
            },
        )];

        if registered.first_connection
            && self
                .presence_gate
                .try_accept(user_id.as_str(), self.config.presence_window_ms)
                .await
                .is_accepted()
        {
            emits.push(Emit::to_everyone(ServerEvent::UserOnline {
                user_id: user_id.clone(),
            }));
        }

        Ok(emits)
    }

    /// Tear down a closed connection: registry unregistration first, then
    /// room purge, then a presence-throttled `user_offline` when no
    /// connections remain.
    pub async fn disconnect(&self, conn_id: ConnectionId) -> Vec<Emit> {
        let Some(unregistered) = self.registry.unregister(conn_id).await else {
            return Vec::new();
        };
        self.rooms.remove_connection(conn_id).await;
        tracing::info!(
            "Connection '{}' for user '{}' disconnected",
            conn_id,
            unregistered.user_id
        );

        if unregistered.last_connection
            && self
                .presence_gate
                .try_accept(
                    unregistered.user_id.as_str(),
                    self.config.presence_window_ms,
                )
                .await
                .is_accepted()
        {
            return vec![Emit::to_everyone(ServerEvent::UserOffline {
                user_id: unregistered.user_id,
            })];
        }
        Vec::new()
    }

    /// Handle one inbound event for one connection.
    ///
    /// Events from a single connection are handled strictly in the order
    /// received; the transport loop awaits each call before reading the next
    /// frame.
    pub async fn handle_event(&self, ctx: &ConnectionContext, event: ClientEvent) -> Vec<Emit> {
        match event {
            ClientEvent::JoinUserRoom { user_id } => self.handle_join_user_room(ctx, user_id).await,
            ClientEvent::JoinConversation { conversation_id } => {
                self.handle_join_conversation(ctx, conversation_id).await
            }
            ClientEvent::LeaveConversation { conversation_id } => {
                self.handle_leave_conversation(ctx, conversation_id).await
            }
            ClientEvent::SendMessage {
                conversation_id,
                content,
                attachments,
                client_message_id,
                timestamp: _,
            } => {
                self.handle_send_message(ctx, conversation_id, content, attachments, client_message_id)
                    .await
            }
            ClientEvent::TypingStart { conversation_id } => {
                self.handle_typing(ctx, conversation_id, true).await
            }
            ClientEvent::TypingStop { conversation_id } => {
                self.handle_typing(ctx, conversation_id, false).await
            }
            ClientEvent::MarkMessageRead {
                message_id,
                conversation_id,
            } => {
                let room = RoomId::conversation(&conversation_id);
                vec![Emit::to_room_except(
                    room,
                    ctx.conn_id,
                    ServerEvent::MessageRead {
                        message_id,
                        conversation_id,
                        user_id: ctx.user.user_id.clone(),
                    },
                )]
            }
            ClientEvent::UpdateConversation {
                conversation_id,
                name,
            } => {
                self.handle_update_conversation(ctx, conversation_id, name)
                    .await
            }
            ClientEvent::DeleteConversation { conversation_id } => {
                self.handle_delete_conversation(ctx, conversation_id).await
            }
        }
    }

    /// Perform the fan-out planned by a handler.
    pub async fn deliver(&self, emits: Vec<Emit>) {
        for emit in emits {
            let payload = match serde_json::to_string(&emit.event) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!("Failed to serialize outbound event: {}", e);
                    continue;
                }
            };

            let targets = match emit.target {
                Target::Connection(conn_id) => self.registry.senders(&[conn_id]).await,
                Target::Room(room) => {
                    let members = self.rooms.members(&room).await;
                    self.registry.senders(&members).await
                }
                Target::RoomExcept(room, except) => {
                    let members: Vec<ConnectionId> = self
                        .rooms
                        .members(&room)
                        .await
                        .into_iter()
                        .filter(|member| *member != except)
                        .collect();
                    self.registry.senders(&members).await
                }
                Target::Everyone => self.registry.all_senders().await,
            };

            for (conn_id, sender) in targets {
                if sender.send(payload.clone()).is_err() {
                    tracing::warn!("Failed to push event to connection '{}'", conn_id);
                }
            }
        }
    }

    /// One cleanup pass over every gate plus the registry bookkeeping.
    /// Returns the number of reclaimed entries.
    pub async fn sweep_stale(&self) -> usize {
        let max_age = self.config.stale_max_age_ms;
        self.presence_gate.evict_older_than(max_age).await
            + self.typing_gate.evict_older_than(max_age).await
            + self.join_leave_gate.evict_older_than(max_age).await
            + self.dedupe_gate.evict_older_than(max_age).await
            + self.registry.sweep_idle_counts().await
    }

    async fn handle_join_user_room(&self, ctx: &ConnectionContext, user_id: UserId) -> Vec<Emit> {
        // The personal room is already joined on connect; this event is an
        // idempotent re-join kept for wire compatibility. A foreign user id
        // is dropped.
        if user_id != ctx.user.user_id {
            tracing::warn!(
                "Connection '{}' of user '{}' tried to join personal room of '{}', ignoring",
                ctx.conn_id,
                ctx.user.user_id,
                user_id
            );
            return Vec::new();
        }
        self.rooms
            .join(RoomId::personal(&user_id), ctx.conn_id)
            .await;
        Vec::new()
    }

    async fn handle_join_conversation(
        &self,
        ctx: &ConnectionContext,
        conversation_id: ConversationId,
    ) -> Vec<Emit> {
        let user_id = &ctx.user.user_id;

        let conversation = match self.chat_store.get_conversation(&conversation_id).await {
            Ok(Some(conversation)) => conversation,
            Ok(None) => {
                return vec![Emit::to_connection(
                    ctx.conn_id,
                    ServerEvent::JoinConversationError {
                        conversation_id,
                        error: "Conversation not found".to_string(),
                    },
                )];
            }
            Err(e) => {
                tracing::error!(
                    "Chat store lookup failed for conversation '{}': {}",
                    conversation_id,
                    e
                );
                return Vec::new();
            }
        };

        let mut authorized = conversation.has_participant(user_id);
        if !authorized {
            if let Some(project_id) = &conversation.project_id {
                authorized = match self.teams.is_active_member(project_id, user_id).await {
                    Ok(is_member) => is_member,
                    Err(e) => {
                        tracing::error!(
                            "Team membership lookup failed for project '{}': {}",
                            project_id,
                            e
                        );
                        return Vec::new();
                    }
                };
            }
        }

        if !authorized {
            tracing::debug!(
                "User '{}' denied access to conversation '{}'",
                user_id,
                conversation_id
            );
            return vec![Emit::to_connection(
                ctx.conn_id,
                ServerEvent::JoinConversationError {
                    conversation_id,
                    error: "User is not a participant of this conversation".to_string(),
                },
            )];
        }

        let room = RoomId::conversation(&conversation_id);
        self.rooms.join(room.clone(), ctx.conn_id).await;

        // The join always succeeds structurally; the gate only suppresses
        // broadcast spam from rapid join/leave churn by the same pair.
        let churn_key = join_leave_key(user_id, &conversation_id);
        if self
            .join_leave_gate
            .try_accept(&churn_key, self.config.join_leave_window_ms)
            .await
            .is_accepted()
        {
            vec![Emit::to_room_except(
                room,
                ctx.conn_id,
                ServerEvent::UserJoinedConversation {
                    conversation_id,
                    user_id: user_id.clone(),
                },
            )]
        } else {
            Vec::new()
        }
    }

    async fn handle_leave_conversation(
        &self,
        ctx: &ConnectionContext,
        conversation_id: ConversationId,
    ) -> Vec<Emit> {
        let room = RoomId::conversation(&conversation_id);
        self.rooms.leave(&room, ctx.conn_id).await;

        // Ticking the shared churn key here is what suppresses the broadcast
        // of an immediate re-join; an unknown conversation id is a no-op and
        // never surfaces an error.
        let churn_key = join_leave_key(&ctx.user.user_id, &conversation_id);
        let _ = self
            .join_leave_gate
            .try_accept(&churn_key, self.config.join_leave_window_ms)
            .await;
        Vec::new()
    }

    async fn handle_send_message(
        &self,
        ctx: &ConnectionContext,
        conversation_id: ConversationId,
        content: String,
        attachments: Vec<crate::domain::Attachment>,
        client_message_id: String,
    ) -> Vec<Emit> {
        if !self
            .dedupe_gate
            .try_accept(&client_message_id, self.config.dedupe_window_ms)
            .await
            .is_accepted()
        {
            tracing::debug!(
                "Duplicate message '{}' from user '{}' rejected",
                client_message_id,
                ctx.user.user_id
            );
            return vec![Emit::to_connection(
                ctx.conn_id,
                ServerEvent::MessageError {
                    message_id: client_message_id,
                    error: MessageErrorKind::DuplicateMessage,
                },
            )];
        }

        let input = NewMessage {
            conversation_id: conversation_id.clone(),
            sender_id: ctx.user.user_id.clone(),
            content,
            attachments,
            client_message_id: client_message_id.clone(),
        };
        let message = match self.chat_store.create_message(input).await {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(
                    "Failed to persist message '{}' in conversation '{}': {}",
                    client_message_id,
                    conversation_id,
                    e
                );
                return vec![Emit::to_connection(
                    ctx.conn_id,
                    ServerEvent::MessageError {
                        message_id: client_message_id,
                        error: MessageErrorKind::MessageSendFailed,
                    },
                )];
            }
        };

        let sender = match self.users.find_by_id(&ctx.user.user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => UserProfile::unknown(&ctx.user.user_id),
            Err(e) => {
                tracing::warn!(
                    "User lookup failed for '{}', falling back to bare id: {}",
                    ctx.user.user_id,
                    e
                );
                UserProfile::unknown(&ctx.user.user_id)
            }
        };

        let room = RoomId::conversation(&conversation_id);
        vec![
            Emit::to_room(
                room,
                ServerEvent::NewMessage {
                    message: MessageBroadcast::enrich(message.clone(), sender),
                },
            ),
            Emit::to_connection(
                ctx.conn_id,
                ServerEvent::MessageSent {
                    message_id: message.id,
                    client_message_id,
                    conversation_id,
                },
            ),
        ]
    }

    async fn handle_typing(
        &self,
        ctx: &ConnectionContext,
        conversation_id: ConversationId,
        is_typing: bool,
    ) -> Vec<Emit> {
        // typing_stop always goes through so clients reliably clear the
        // indicator; only starts are rate-gated.
        if is_typing
            && !self
                .typing_gate
                .try_accept(ctx.user.user_id.as_str(), self.config.typing_window_ms)
                .await
                .is_accepted()
        {
            return Vec::new();
        }

        let room = RoomId::conversation(&conversation_id);
        vec![Emit::to_room_except(
            room,
            ctx.conn_id,
            ServerEvent::UserTyping {
                conversation_id,
                user_id: ctx.user.user_id.clone(),
                is_typing,
            },
        )]
    }

    async fn handle_update_conversation(
        &self,
        ctx: &ConnectionContext,
        conversation_id: ConversationId,
        name: String,
    ) -> Vec<Emit> {
        let patch = ConversationPatch { name: Some(name) };
        match self
            .chat_store
            .update_conversation(&conversation_id, patch)
            .await
        {
            Ok(Some(conversation)) => {
                let room = RoomId::conversation(&conversation_id);
                vec![Emit::to_room(
                    room,
                    ServerEvent::ConversationUpdated {
                        conversation_id,
                        name: conversation.name,
                    },
                )]
            }
            Ok(None) => vec![Emit::to_connection(
                ctx.conn_id,
                ServerEvent::ConversationError {
                    conversation_id,
                    error: "Conversation not found".to_string(),
                },
            )],
            Err(e) => {
                tracing::error!("Failed to update conversation '{}': {}", conversation_id, e);
                vec![Emit::to_connection(
                    ctx.conn_id,
                    ServerEvent::ConversationError {
                        conversation_id,
                        error: "Failed to update conversation".to_string(),
                    },
                )]
            }
        }
    }

    async fn handle_delete_conversation(
        &self,
        ctx: &ConnectionContext,
        conversation_id: ConversationId,
    ) -> Vec<Emit> {
        // Participants are needed for the personal-room fan-out, so read the
        // conversation before deleting it.
        let conversation = match self.chat_store.get_conversation(&conversation_id).await {
            Ok(Some(conversation)) => conversation,
            Ok(None) => {
                return vec![Emit::to_connection(
                    ctx.conn_id,
                    ServerEvent::ConversationError {
                        conversation_id,
                        error: "Conversation not found".to_string(),
                    },
                )];
            }
            Err(e) => {
                tracing::error!(
                    "Chat store lookup failed for conversation '{}': {}",
                    conversation_id,
                    e
                );
                return vec![Emit::to_connection(
                    ctx.conn_id,
                    ServerEvent::ConversationError {
                        conversation_id,
                        error: "Failed to delete conversation".to_string(),
                    },
                )];
            }
        };

        if let Err(e) = self.chat_store.delete_conversation(&conversation_id).await {
            tracing::error!("Failed to delete conversation '{}': {}", conversation_id, e);
            return vec![Emit::to_connection(
                ctx.conn_id,
                ServerEvent::ConversationError {
                    conversation_id,
                    error: "Failed to delete conversation".to_string(),
                },
            )];
        }

        // Membership snapshot is taken while evicting, so the deletion
        // notice still reaches every connection that was in the room.
        let room = RoomId::conversation(&conversation_id);
        let evicted = self.rooms.drop_room(&room).await;

        let mut emits: Vec<Emit> = evicted
            .into_iter()
            .map(|member| {
                Emit::to_connection(
                    member,
                    ServerEvent::ConversationDeleted {
                        conversation_id: conversation_id.clone(),
                    },
                )
            })
            .collect();
        for participant in &conversation.participants {
            emits.push(Emit::to_room(
                RoomId::personal(participant),
                ServerEvent::ConversationDeleted {
                    conversation_id: conversation_id.clone(),
                },
            ));
        }
        emits
    }
}

fn join_leave_key(user_id: &UserId, conversation_id: &ConversationId) -> String {
    format!("{user_id}:{conversation_id}")
}
