use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::{ConversationSummary, Membership, Message, Related};
use crate::platform::{MemberFilter, Tables};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Existing(Uuid),
    Created(Uuid),
}

impl Resolved {
    pub fn id(&self) -> Uuid {
        match *self {
            Resolved::Existing(id) | Resolved::Created(id) => id,
        }
    }
}

/// Finds the conversation `self_id` already shares with `other_id`, or
/// creates it with both memberships.
///
/// Candidates are checked one at a time in membership order and the first
/// hit wins. Creation is two writes with nothing undoing the first if the
/// second fails, so a conversation without members can be left behind.
pub async fn resolve(tables: &dyn Tables, self_id: Uuid, other_id: Uuid) -> Result<Resolved> {
    if self_id == other_id {
        return Err(Error::invalid("other_user_id", "Tidak dapat memulai percakapan dengan diri sendiri"));
    }

    for candidate in tables.memberships_of_user(self_id).await? {
        let shared = tables
            .memberships_of_conversation(candidate.conversation_id, MemberFilter::Is(other_id))
            .await?;
        if !shared.is_empty() {
            return Ok(Resolved::Existing(candidate.conversation_id));
        }
    }

    let conversation = tables.insert_conversation().await?;
    tables
        .insert_memberships(&[
            Membership { conversation_id: conversation.id, user_id: self_id },
            Membership { conversation_id: conversation.id, user_id: other_id },
        ])
        .await?;

    info!(conversation_id = %conversation.id, %self_id, %other_id, "conversation created");
    Ok(Resolved::Created(conversation.id))
}

/// Every conversation `user_id` belongs to, newest first, with the other
/// participant, the latest message and the unread count.
pub async fn fetch_conversations(tables: &dyn Tables, user_id: Uuid) -> Result<Vec<ConversationSummary>> {
    let ids: Vec<Uuid> = tables
        .memberships_of_user(user_id)
        .await?
        .into_iter()
        .map(|m| m.conversation_id)
        .collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let conversations = tables.conversations(&ids).await?;
    let mut messages: HashMap<Uuid, Vec<Message>> = HashMap::new();
    for message in tables.messages_in(&ids).await? {
        messages.entry(message.conversation_id).or_default().push(message);
    }

    let mut summaries = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        let others = tables
            .memberships_of_conversation(conversation.id, MemberFilter::IsNot(user_id))
            .await?;
        let other_user = match others.first() {
            Some(other) => tables.profile(other.user_id).await?.into(),
            None => Related::Missing,
        };

        let messages = messages.remove(&conversation.id).unwrap_or_default();
        let unread_count = messages
            .iter()
            .filter(|m| !m.is_read && m.sender_id != user_id)
            .count();

        summaries.push(ConversationSummary {
            conversation,
            other_user,
            last_message: messages.into_iter().last(),
            unread_count,
        });
    }
    Ok(summaries)
}

/// The signed-in user's conversation list.
pub struct Conversations {
    tables: Arc<dyn Tables>,
    user_id: Uuid,
    list: watch::Sender<Vec<ConversationSummary>>,
}

impl Conversations {
    pub fn new(tables: Arc<dyn Tables>, user_id: Uuid) -> Self {
        Conversations { tables, user_id, list: watch::channel(Vec::new()).0 }
    }

    pub fn list(&self) -> Vec<ConversationSummary> {
        self.list.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Vec<ConversationSummary>> {
        self.list.subscribe()
    }

    pub async fn refresh(&self) -> Result<Vec<ConversationSummary>> {
        let list = fetch_conversations(self.tables.as_ref(), self.user_id).await?;
        debug!(user_id = %self.user_id, count = list.len(), "conversations fetched");
        self.list.send_replace(list.clone());
        Ok(list)
    }

    /// Opens the conversation with `other_id`, creating it if needed. Any
    /// failure is logged and yields `None`.
    pub async fn open_with(&self, other_id: Uuid) -> Option<Uuid> {
        let resolved = match resolve(self.tables.as_ref(), self.user_id, other_id).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(user_id = %self.user_id, %other_id, error = %e, "could not open conversation");
                return None;
            }
        };

        if let Resolved::Created(_) = resolved {
            if let Err(e) = self.refresh().await {
                warn!(user_id = %self.user_id, error = %e, "conversation refresh failed");
            }
        }
        Some(resolved.id())
    }
}
