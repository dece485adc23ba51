use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::model::{Conversation, Membership, Message, MessageView, Profile, SenderSnapshot, Status};
use crate::{Error, Result};

use super::realtime::{Change, ChangeKind, Realtime, Record};
use super::tables::{MemberFilter, NewMessage, NewProfile, Tables};
use super::{from_micros, now_micros, parse_id};

const PROFILE_COLUMNS: &str = "id,username,avatar_url,status,last_seen,created_at";
const MESSAGE_COLUMNS: &str = "id,conversation_id,sender_id,content,created_at,is_read";

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: String,
    username: String,
    avatar_url: Option<String>,
    status: String,
    last_seen: Option<i64>,
    created_at: i64,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = Error;

    fn try_from(row: ProfileRow) -> Result<Self> {
        Ok(Profile {
            id: parse_id(&row.id)?,
            username: row.username,
            avatar_url: row.avatar_url,
            status: Status::parse(&row.status)?,
            last_seen: row.last_seen.map(from_micros).transpose()?,
            created_at: from_micros(row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    conversation_id: String,
    sender_id: String,
    content: String,
    created_at: i64,
    is_read: bool,
}

impl TryFrom<MessageRow> for Message {
    type Error = Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: parse_id(&row.id)?,
            conversation_id: parse_id(&row.conversation_id)?,
            sender_id: parse_id(&row.sender_id)?,
            content: row.content,
            created_at: from_micros(row.created_at)?,
            is_read: row.is_read,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    #[sqlx(flatten)]
    message: MessageRow,
    sender_username: Option<String>,
    sender_avatar_url: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: String,
    created_at: i64,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = Error;

    fn try_from(row: ConversationRow) -> Result<Self> {
        Ok(Conversation { id: parse_id(&row.id)?, created_at: from_micros(row.created_at)? })
    }
}

#[derive(sqlx::FromRow)]
struct MembershipRow {
    conversation_id: String,
    user_id: String,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = Error;

    fn try_from(row: MembershipRow) -> Result<Self> {
        Ok(Membership {
            conversation_id: parse_id(&row.conversation_id)?,
            user_id: parse_id(&row.user_id)?,
        })
    }
}

fn convert<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = Error>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Escapes LIKE wildcards so usernames containing `_` match literally.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::from("%");
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub struct SqliteTables {
    pool: SqlitePool,
    realtime: Realtime,
}

impl SqliteTables {
    pub fn new(pool: SqlitePool, realtime: Realtime) -> Self {
        SqliteTables { pool, realtime }
    }

    fn publish(&self, kind: ChangeKind, record: Record) {
        self.realtime.publish(Change { kind, record });
    }
}

#[async_trait]
impl Tables for SqliteTables {
    async fn profile(&self, id: Uuid) -> Result<Option<Profile>> {
        sqlx::query_as::<_, ProfileRow>(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id=?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(Profile::try_from)
            .transpose()
    }

    async fn profile_by_username(&self, username: &str) -> Result<Option<Profile>> {
        sqlx::query_as::<_, ProfileRow>(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE username=?"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .map(Profile::try_from)
            .transpose()
    }

    async fn online_profile_ids(&self) -> Result<Vec<Uuid>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM profiles WHERE status='online'")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|(id,)| parse_id(id)).collect()
    }

    async fn search_profiles(&self, query: &str, exclude: Uuid, limit: u32) -> Result<Vec<Profile>> {
        let rows = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE username LIKE ? ESCAPE '\\' AND id<>? ORDER BY username LIMIT ?"
        ))
        .bind(like_pattern(query))
        .bind(exclude.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn insert_profile(&self, profile: NewProfile) -> Result<Profile> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "INSERT INTO profiles (id,username,avatar_url,status,last_seen,created_at) VALUES (?,?,?,?,?,?) RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(profile.id.to_string())
        .bind(&profile.username)
        .bind(&profile.avatar_url)
        .bind(profile.status.as_str())
        .bind(now_micros())
        .bind(now_micros())
        .fetch_one(&self.pool)
        .await?;

        let profile = Profile::try_from(row)?;
        self.publish(ChangeKind::Insert, Record::Profile(profile.clone()));
        Ok(profile)
    }

    async fn update_status(&self, id: Uuid, status: Status) -> Result<Option<Profile>> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "UPDATE profiles SET status=?, last_seen=? WHERE id=? RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(now_micros())
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let profile = Profile::try_from(row)?;
        self.publish(ChangeKind::Update, Record::Profile(profile.clone()));
        Ok(Some(profile))
    }

    async fn insert_conversation(&self) -> Result<Conversation> {
        let row = sqlx::query_as::<_, ConversationRow>(
            "INSERT INTO conversations (id,created_at) VALUES (?,?) RETURNING id,created_at",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(now_micros())
        .fetch_one(&self.pool)
        .await?;

        let conversation = Conversation::try_from(row)?;
        self.publish(ChangeKind::Insert, Record::Conversation(conversation));
        Ok(conversation)
    }

    async fn conversations(&self, ids: &[Uuid]) -> Result<Vec<Conversation>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new("SELECT id,created_at FROM conversations WHERE id IN (");
        let mut list = query.separated(",");
        for id in ids {
            list.push_bind(id.to_string());
        }
        list.push_unseparated(") ORDER BY created_at DESC, rowid DESC");

        let rows = query.build_query_as::<ConversationRow>().fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn memberships_of_user(&self, user_id: Uuid) -> Result<Vec<Membership>> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            "SELECT conversation_id,user_id FROM conversation_participants WHERE user_id=? ORDER BY rowid",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn memberships_of_conversation(&self, conversation_id: Uuid, filter: MemberFilter) -> Result<Vec<Membership>> {
        let (sql, user_id) = match filter {
            MemberFilter::Is(user_id) => (
                "SELECT conversation_id,user_id FROM conversation_participants WHERE conversation_id=? AND user_id=?",
                user_id,
            ),
            MemberFilter::IsNot(user_id) => (
                "SELECT conversation_id,user_id FROM conversation_participants WHERE conversation_id=? AND user_id<>?",
                user_id,
            ),
        };

        let rows = sqlx::query_as::<_, MembershipRow>(sql)
            .bind(conversation_id.to_string())
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        convert(rows)
    }

    async fn insert_memberships(&self, memberships: &[Membership]) -> Result<()> {
        if memberships.is_empty() {
            return Ok(());
        }

        let mut query = QueryBuilder::<Sqlite>::new("INSERT INTO conversation_participants (conversation_id,user_id) ");
        query.push_values(memberships, |mut row, m| {
            row.push_bind(m.conversation_id.to_string()).push_bind(m.user_id.to_string());
        });
        query.build().execute(&self.pool).await?;

        for membership in memberships {
            self.publish(ChangeKind::Insert, Record::Membership(*membership));
        }
        Ok(())
    }

    async fn message_history(&self, conversation_id: Uuid) -> Result<Vec<MessageView>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT m.id,m.conversation_id,m.sender_id,m.content,m.created_at,m.is_read,\
                    p.username AS sender_username,p.avatar_url AS sender_avatar_url \
             FROM messages m LEFT JOIN profiles p ON p.id=m.sender_id \
             WHERE m.conversation_id=? ORDER BY m.created_at ASC, m.rowid ASC",
        )
        .bind(conversation_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let message = Message::try_from(row.message)?;
                let sender = row
                    .sender_username
                    .map(|username| SenderSnapshot {
                        id: message.sender_id,
                        username,
                        avatar_url: row.sender_avatar_url,
                    })
                    .into();
                Ok(MessageView { message, sender })
            })
            .collect()
    }

    async fn messages_in(&self, conversation_ids: &[Uuid]) -> Result<Vec<Message>> {
        if conversation_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id IN ("));
        let mut list = query.separated(",");
        for id in conversation_ids {
            list.push_bind(id.to_string());
        }
        list.push_unseparated(") ORDER BY created_at ASC, rowid ASC");

        let rows = query.build_query_as::<MessageRow>().fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "INSERT INTO messages (id,conversation_id,sender_id,content,created_at,is_read) VALUES (?,?,?,?,?,0) RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(Uuid::now_v7().to_string())
        .bind(message.conversation_id.to_string())
        .bind(message.sender_id.to_string())
        .bind(&message.content)
        .bind(now_micros())
        .fetch_one(&self.pool)
        .await?;

        let message = Message::try_from(row)?;
        self.publish(ChangeKind::Insert, Record::Message(message.clone()));
        Ok(message)
    }

    async fn mark_conversation_read(&self, conversation_id: Uuid, reader: Uuid) -> Result<u64> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "UPDATE messages SET is_read=1 WHERE conversation_id=? AND sender_id<>? AND is_read=0 RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(conversation_id.to_string())
        .bind(reader.to_string())
        .fetch_all(&self.pool)
        .await?;

        let messages: Vec<Message> = convert(rows)?;
        let count = messages.len() as u64;
        for message in messages {
            self.publish(ChangeKind::Update, Record::Message(message));
        }
        Ok(count)
    }

    async fn mark_message_read(&self, message_id: Uuid, reader: Uuid) -> Result<bool> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "UPDATE messages SET is_read=1 WHERE id=? AND sender_id<>? AND is_read=0 RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(message_id.to_string())
        .bind(reader.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(false);
        };
        self.publish(ChangeKind::Update, Record::Message(Message::try_from(row)?));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;

    async fn profile(platform: &Platform, username: &str, status: Status) -> Profile {
        platform
            .tables
            .insert_profile(NewProfile { id: Uuid::now_v7(), username: username.into(), avatar_url: None, status })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn search_matches_substring_case_insensitively() {
        let platform = Platform::in_memory().await;
        let me = profile(&platform, "budi", Status::Online).await;
        profile(&platform, "Budiman", Status::Offline).await;
        profile(&platform, "sari_budi", Status::Offline).await;
        profile(&platform, "sarixbudi", Status::Offline).await;

        let found = platform.tables.search_profiles("BUDI", me.id, 10).await.unwrap();
        let names: Vec<&str> = found.iter().map(|p| p.username.as_str()).collect();
        assert_eq!(names, ["Budiman", "sari_budi", "sarixbudi"]);

        let literal = platform.tables.search_profiles("i_b", me.id, 10).await.unwrap();
        assert_eq!(literal.len(), 1);
        assert_eq!(literal[0].username, "sari_budi");

        let limited = platform.tables.search_profiles("budi", me.id, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let platform = Platform::in_memory().await;
        profile(&platform, "nep", Status::Online).await;
        let err = platform
            .tables
            .insert_profile(NewProfile { id: Uuid::now_v7(), username: "nep".into(), avatar_url: None, status: Status::Online })
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn read_marking_skips_own_messages() {
        let platform = Platform::in_memory().await;
        let a = profile(&platform, "alice", Status::Online).await;
        let b = profile(&platform, "bob", Status::Online).await;
        let conversation = platform.tables.insert_conversation().await.unwrap();

        let from_a = platform
            .tables
            .insert_message(NewMessage { conversation_id: conversation.id, sender_id: a.id, content: "hi".into() })
            .await
            .unwrap();
        let from_b = platform
            .tables
            .insert_message(NewMessage { conversation_id: conversation.id, sender_id: b.id, content: "yo".into() })
            .await
            .unwrap();

        assert!(!platform.tables.mark_message_read(from_a.id, a.id).await.unwrap());
        assert_eq!(platform.tables.mark_conversation_read(conversation.id, a.id).await.unwrap(), 1);
        assert!(!platform.tables.mark_message_read(from_b.id, a.id).await.unwrap());

        let history = platform.tables.message_history(conversation.id).await.unwrap();
        assert!(!history[0].message.is_read);
        assert!(history[1].message.is_read);
    }

    #[tokio::test]
    async fn history_keeps_insert_order_and_sender_snapshots() {
        let platform = Platform::in_memory().await;
        let a = profile(&platform, "alice", Status::Online).await;
        let conversation = platform.tables.insert_conversation().await.unwrap();
        let ghost = Uuid::now_v7();

        for (sender_id, content) in [(a.id, "one"), (ghost, "two"), (a.id, "three")] {
            platform
                .tables
                .insert_message(NewMessage { conversation_id: conversation.id, sender_id, content: content.into() })
                .await
                .unwrap();
        }

        let history = platform.tables.message_history(conversation.id).await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.message.content.as_str()).collect();
        assert_eq!(contents, ["one", "two", "three"]);
        assert_eq!(history[0].sender.as_ref().map(|s| s.username.as_str()), Some("alice"));
        assert!(history[1].sender.is_missing());
        assert!(history.windows(2).all(|w| w[0].message.created_at <= w[1].message.created_at));
    }
}
