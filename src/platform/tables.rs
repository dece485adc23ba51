use async_trait::async_trait;
use uuid::Uuid;

use crate::Result;
use crate::model::{Conversation, Membership, Message, MessageView, Profile, Status};

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub status: Status,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberFilter {
    Is(Uuid),
    IsNot(Uuid),
}

/// Row access to the four chat relations. Every write publishes the
/// affected rows on the platform's realtime hub.
#[async_trait]
pub trait Tables: Send + Sync {
    async fn profile(&self, id: Uuid) -> Result<Option<Profile>>;

    async fn profile_by_username(&self, username: &str) -> Result<Option<Profile>>;

    async fn online_profile_ids(&self) -> Result<Vec<Uuid>>;

    /// Case-insensitive substring match on username.
    async fn search_profiles(&self, query: &str, exclude: Uuid, limit: u32) -> Result<Vec<Profile>>;

    async fn insert_profile(&self, profile: NewProfile) -> Result<Profile>;

    /// Sets status and stamps `last_seen` with the current time.
    async fn update_status(&self, id: Uuid, status: Status) -> Result<Option<Profile>>;

    async fn insert_conversation(&self) -> Result<Conversation>;

    /// Newest first.
    async fn conversations(&self, ids: &[Uuid]) -> Result<Vec<Conversation>>;

    async fn memberships_of_user(&self, user_id: Uuid) -> Result<Vec<Membership>>;

    async fn memberships_of_conversation(&self, conversation_id: Uuid, filter: MemberFilter) -> Result<Vec<Membership>>;

    async fn insert_memberships(&self, memberships: &[Membership]) -> Result<()>;

    /// Oldest first, each with its sender as it is now.
    async fn message_history(&self, conversation_id: Uuid) -> Result<Vec<MessageView>>;

    /// Messages of several conversations, oldest first.
    async fn messages_in(&self, conversation_ids: &[Uuid]) -> Result<Vec<Message>>;

    /// Stamps `created_at` on the server side.
    async fn insert_message(&self, message: NewMessage) -> Result<Message>;

    /// Marks read every unread message in the conversation not sent by `reader`.
    async fn mark_conversation_read(&self, conversation_id: Uuid, reader: Uuid) -> Result<u64>;

    /// Marks one message read unless `reader` sent it. Returns whether a row changed.
    async fn mark_message_read(&self, message_id: Uuid, reader: Uuid) -> Result<bool>;
}
