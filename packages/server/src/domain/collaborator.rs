//! Collaborator interfaces consumed by the gateway.
//!
//! The gateway core depends on these traits and not on any concrete backend;
//! the main application wires in its own implementations, the bundled binary
//! and the tests use the in-memory ones from the `infrastructure` layer.

use async_trait::async_trait;
use thiserror::Error;

use super::model::{
    AuthenticatedUser, Conversation, ConversationId, ConversationPatch, Message, NewMessage,
    ProjectId, UserId, UserProfile,
};

/// Failure of a collaborator backend (database down, RPC timeout, ...).
///
/// The gateway never retries; each call site maps this to the error category
/// the event contract demands.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Handshake credential rejection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credential")]
    InvalidCredential,
    #[error("credential expired")]
    Expired,
}

/// Verifies the bearer credential presented at handshake time.
///
/// Called exactly once per connection attempt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<AuthenticatedUser, AuthError>;
}

/// Durable persistence for conversations and messages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError>;

    async fn create_message(&self, input: NewMessage) -> Result<Message, StoreError>;

    async fn update_conversation(
        &self,
        id: &ConversationId,
        patch: ConversationPatch,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Deletes the conversation and cascades deletion of its messages.
    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), StoreError>;
}

/// Authorizes non-participants who are active members of the project team a
/// conversation is attached to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TeamMembershipStore: Send + Sync {
    async fn is_active_member(
        &self,
        project_id: &ProjectId,
        user_id: &UserId,
    ) -> Result<bool, StoreError>;
}

/// Read-only user directory used to enrich outbound message payloads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError>;
}
