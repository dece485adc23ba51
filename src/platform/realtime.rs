use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::{Conversation, Membership, Message, Profile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Profiles,
    Conversations,
    ConversationParticipants,
    Messages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
}

#[derive(Debug, Clone)]
pub enum Record {
    Profile(Profile),
    Conversation(Conversation),
    Membership(Membership),
    Message(Message),
}

impl Record {
    pub fn table(&self) -> Table {
        match self {
            Record::Profile(_) => Table::Profiles,
            Record::Conversation(_) => Table::Conversations,
            Record::Membership(_) => Table::ConversationParticipants,
            Record::Message(_) => Table::Messages,
        }
    }

    fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Record::Membership(m) => Some(m.conversation_id),
            Record::Message(m) => Some(m.conversation_id),
            Record::Conversation(c) => Some(c.id),
            Record::Profile(_) => None,
        }
    }
}

/// A row-level change, carrying the row as it is after the write.
#[derive(Debug, Clone)]
pub struct Change {
    pub kind: ChangeKind,
    pub record: Record,
}

#[derive(Debug, Clone)]
pub struct Filter {
    table: Table,
    kind: Option<ChangeKind>,
    conversation_id: Option<Uuid>,
}

impl Filter {
    pub fn table(table: Table) -> Self {
        Filter { table, kind: None, conversation_id: None }
    }

    pub fn kind(mut self, kind: ChangeKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn conversation(mut self, conversation_id: Uuid) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    fn matches(&self, change: &Change) -> bool {
        change.record.table() == self.table
            && self.kind.is_none_or(|kind| kind == change.kind)
            && self
                .conversation_id
                .is_none_or(|id| change.record.conversation_id() == Some(id))
    }
}

/// Why a subscription stopped yielding changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// The subscriber fell behind and `skipped` changes were dropped. The
    /// subscription stays usable; callers re-fetch their baseline.
    Lagged(u64),
    Closed,
}

/// Fan-out of row changes to every subscriber.
#[derive(Clone)]
pub struct Realtime {
    tx: broadcast::Sender<Change>,
}

impl Realtime {
    pub fn new(capacity: usize) -> Self {
        Realtime { tx: broadcast::channel(capacity).0 }
    }

    pub(crate) fn publish(&self, change: Change) {
        // no subscribers is fine
        let _ = self.tx.send(change);
    }

    pub fn subscribe(&self, name: impl Into<String>, filter: Filter) -> Subscription {
        let name = name.into();
        debug!(channel = %name, ?filter, "subscribed");
        Subscription { name, filter, rx: self.tx.subscribe() }
    }
}

pub struct Subscription {
    name: String,
    filter: Filter,
    rx: broadcast::Receiver<Change>,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next change matching the filter, in delivery order.
    pub async fn recv(&mut self) -> Result<Change, Interrupted> {
        loop {
            match self.rx.recv().await {
                Ok(change) if self.filter.matches(&change) => return Ok(change),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.name, skipped, "subscriber lagged");
                    return Err(Interrupted::Lagged(skipped));
                }
                Err(RecvError::Closed) => return Err(Interrupted::Closed),
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!(channel = %self.name, "unsubscribed");
    }
}
