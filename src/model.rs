use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Online,
    Offline,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Online => "online",
            Status::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "online" => Ok(Status::Online),
            "offline" => Ok(Status::Offline),
            other => Err(Error::corrupt("status", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub status: Status,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seen: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The part of a profile a message carries, captured when it was loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderSnapshot {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
}

impl From<&Profile> for SenderSnapshot {
    fn from(profile: &Profile) -> Self {
        SenderSnapshot {
            id: profile.id,
            username: profile.username.clone(),
            avatar_url: profile.avatar_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Membership {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub is_read: bool,
}

/// A row another row points at, which may not exist (deleted, not yet
/// visible, or never created).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Related<T> {
    Present(T),
    Missing,
}

impl<T> Related<T> {
    pub fn as_ref(&self) -> Option<&T> {
        match self {
            Related::Present(value) => Some(value),
            Related::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Related::Missing)
    }
}

impl<T> From<Option<T>> for Related<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Related::Missing, Related::Present)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub sender: Related<SenderSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub other_user: Related<Profile>,
    pub last_message: Option<Message>,
    pub unread_count: usize,
}

/// Stable key for a user pair, independent of argument order.
pub fn conversation_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}_{hi}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_key_ignores_order() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        assert_eq!(conversation_key(a, b), conversation_key(b, a));
        assert_ne!(conversation_key(a, a), conversation_key(a, b));
    }

    #[test]
    fn missing_relation_serializes_as_tagged_variant() {
        let related: Related<SenderSnapshot> = None.into();
        assert!(related.is_missing());
        assert_eq!(serde_json::to_value(&related).unwrap(), serde_json::json!({ "state": "missing" }));
    }

    #[test]
    fn status_round_trips_through_text() {
        assert_eq!(Status::parse(Status::Online.as_str()).unwrap(), Status::Online);
        assert!(Status::parse("away").is_err());
    }
}
