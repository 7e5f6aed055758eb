//! In-memory chat store, team directory and user directory.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use roka_shared::time::Clock;

use crate::domain::{
    ChatStore, Conversation, ConversationId, ConversationPatch, Message, MessageId, NewMessage,
    ProjectId, StoreError, TeamMembershipStore, UserId, UserLookup, UserProfile,
};

/// In-memory [`ChatStore`].
pub struct InMemoryChatStore {
    conversations: Mutex<HashMap<ConversationId, Conversation>>,
    messages: Mutex<Vec<Message>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryChatStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
            messages: Mutex::new(Vec::new()),
            clock,
        }
    }

    /// Seed a conversation (the durable CRUD path owns creation in
    /// production).
    pub async fn insert_conversation(&self, conversation: Conversation) {
        let mut conversations = self.conversations.lock().await;
        conversations.insert(conversation.id.clone(), conversation);
    }

    pub async fn message_count(&self, conversation_id: &ConversationId) -> usize {
        let messages = self.messages.lock().await;
        messages
            .iter()
            .filter(|message| &message.conversation_id == conversation_id)
            .count()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        let conversations = self.conversations.lock().await;
        Ok(conversations.get(id).cloned())
    }

    async fn create_message(&self, input: NewMessage) -> Result<Message, StoreError> {
        let message = Message {
            id: MessageId::new(Uuid::new_v4().to_string()),
            conversation_id: input.conversation_id,
            sender_id: input.sender_id,
            content: input.content,
            attachments: input.attachments,
            client_message_id: input.client_message_id,
            sent_at: self.clock.now_millis(),
        };
        let mut messages = self.messages.lock().await;
        messages.push(message.clone());
        Ok(message)
    }

    async fn update_conversation(
        &self,
        id: &ConversationId,
        patch: ConversationPatch,
    ) -> Result<Option<Conversation>, StoreError> {
        let mut conversations = self.conversations.lock().await;
        let Some(conversation) = conversations.get_mut(id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            conversation.name = Some(name);
        }
        Ok(Some(conversation.clone()))
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), StoreError> {
        let mut conversations = self.conversations.lock().await;
        conversations.remove(id);
        // Cascade: drop the conversation's messages with it.
        let mut messages = self.messages.lock().await;
        messages.retain(|message| &message.conversation_id != id);
        Ok(())
    }
}

/// In-memory [`TeamMembershipStore`].
#[derive(Default)]
pub struct InMemoryTeamDirectory {
    active: Mutex<HashSet<(ProjectId, UserId)>>,
}

impl InMemoryTeamDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant(&self, project_id: ProjectId, user_id: UserId) {
        let mut active = self.active.lock().await;
        active.insert((project_id, user_id));
    }

    pub async fn revoke(&self, project_id: &ProjectId, user_id: &UserId) {
        let mut active = self.active.lock().await;
        active.remove(&(project_id.clone(), user_id.clone()));
    }
}

#[async_trait]
impl TeamMembershipStore for InMemoryTeamDirectory {
    async fn is_active_member(
        &self,
        project_id: &ProjectId,
        user_id: &UserId,
    ) -> Result<bool, StoreError> {
        let active = self.active.lock().await;
        Ok(active.contains(&(project_id.clone(), user_id.clone())))
    }
}

/// In-memory [`UserLookup`].
#[derive(Default)]
pub struct InMemoryUserDirectory {
    profiles: Mutex<HashMap<UserId, UserProfile>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, profile: UserProfile) {
        let mut profiles = self.profiles.lock().await;
        profiles.insert(profile.id.clone(), profile);
    }
}

#[async_trait]
impl UserLookup for InMemoryUserDirectory {
    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError> {
        let profiles = self.profiles.lock().await;
        Ok(profiles.get(user_id).cloned())
    }
}
