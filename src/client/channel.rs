use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::{Message, MessageView, Related, SenderSnapshot};
use crate::platform::{ChangeKind, Filter, Interrupted, NewMessage, Platform, Record, Subscription, Table, Tables};
use crate::{Error, Result};

use super::notify::{Notification, Notifier};

struct Active {
    conversation_id: Uuid,
    task: JoinHandle<()>,
}

/// Live message list of the one conversation the user has open.
pub struct MessageChannel {
    platform: Platform,
    user_id: Uuid,
    notifier: Arc<dyn Notifier>,
    messages: Arc<watch::Sender<Vec<MessageView>>>,
    active: Option<Active>,
    // no write path fills this yet
    typing: HashMap<Uuid, bool>,
}

impl MessageChannel {
    pub fn new(platform: Platform, user_id: Uuid, notifier: Arc<dyn Notifier>) -> Self {
        MessageChannel {
            platform,
            user_id,
            notifier,
            messages: Arc::new(watch::channel(Vec::new()).0),
            active: None,
            typing: HashMap::new(),
        }
    }

    pub fn active(&self) -> Option<Uuid> {
        self.active.as_ref().map(|a| a.conversation_id)
    }

    pub fn messages(&self) -> Vec<MessageView> {
        self.messages.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Vec<MessageView>> {
        self.messages.subscribe()
    }

    pub fn typing_users(&self) -> &HashMap<Uuid, bool> {
        &self.typing
    }

    /// Switches to `conversation_id`: drops the previous subscription,
    /// subscribes to new messages, loads the history and marks the other
    /// party's messages read.
    pub async fn activate(&mut self, conversation_id: Uuid) -> Result<()> {
        self.deactivate();

        let subscription = self.platform.realtime.subscribe(
            format!("conversation:{conversation_id}"),
            Filter::table(Table::Messages).kind(ChangeKind::Insert).conversation(conversation_id),
        );

        let history = self.platform.tables.message_history(conversation_id).await?;
        debug!(%conversation_id, count = history.len(), "history loaded");
        self.messages.send_replace(history);

        match self.platform.tables.mark_conversation_read(conversation_id, self.user_id).await {
            Ok(count) => debug!(%conversation_id, count, "marked read"),
            Err(e) => warn!(%conversation_id, error = %e, "marking read failed"),
        }

        let task = tokio::spawn(listen(
            self.platform.tables.clone(),
            self.user_id,
            conversation_id,
            self.notifier.clone(),
            self.messages.clone(),
            subscription,
        ));
        self.active = Some(Active { conversation_id, task });
        Ok(())
    }

    pub fn deactivate(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
            debug!(conversation_id = %active.conversation_id, "conversation closed");
        }
        self.messages.send_replace(Vec::new());
    }

    /// Sends trimmed `content`. The list is not touched here: the sender
    /// sees the message when the insert comes back through the channel.
    pub async fn send(&self, conversation_id: Uuid, content: &str) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::invalid("content", "Pesan tidak boleh kosong"));
        }

        self.platform
            .tables
            .insert_message(NewMessage {
                conversation_id,
                sender_id: self.user_id,
                content: content.to_owned(),
            })
            .await
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
        }
    }
}

async fn listen(
    tables: Arc<dyn Tables>,
    user_id: Uuid,
    conversation_id: Uuid,
    notifier: Arc<dyn Notifier>,
    messages: Arc<watch::Sender<Vec<MessageView>>>,
    mut subscription: Subscription,
) {
    loop {
        match subscription.recv().await {
            Ok(change) => {
                if let Record::Message(message) = change.record {
                    receive(tables.as_ref(), user_id, notifier.as_ref(), &messages, message).await;
                }
            }
            Err(Interrupted::Lagged(_)) => {
                if let Err(e) = resync(tables.as_ref(), user_id, conversation_id, notifier.as_ref(), &messages).await {
                    warn!(%conversation_id, error = %e, "history refetch failed");
                }
            }
            Err(Interrupted::Closed) => break,
        }
    }
}

/// Replaces the list with a fresh history after missed events. Unread
/// messages from the other party that the list did not hold yet are
/// notified, then the conversation is marked read again.
async fn resync(
    tables: &dyn Tables,
    user_id: Uuid,
    conversation_id: Uuid,
    notifier: &dyn Notifier,
    messages: &watch::Sender<Vec<MessageView>>,
) -> Result<()> {
    let history = tables.message_history(conversation_id).await?;
    debug!(%conversation_id, count = history.len(), "history refetched");

    let known: HashSet<Uuid> = messages.borrow().iter().map(|m| m.message.id).collect();
    for view in &history {
        if !known.contains(&view.message.id) && view.message.sender_id != user_id && !view.message.is_read {
            notifier.notify(Notification::new_message(view));
        }
    }
    messages.send_replace(history);

    match tables.mark_conversation_read(conversation_id, user_id).await {
        Ok(count) => debug!(%conversation_id, count, "marked read"),
        Err(e) => warn!(%conversation_id, error = %e, "marking read failed"),
    }
    Ok(())
}

async fn receive(
    tables: &dyn Tables,
    user_id: Uuid,
    notifier: &dyn Notifier,
    messages: &watch::Sender<Vec<MessageView>>,
    message: Message,
) {
    let sender: Related<SenderSnapshot> = match tables.profile(message.sender_id).await {
        Ok(profile) => profile.as_ref().map(SenderSnapshot::from).into(),
        Err(e) => {
            warn!(sender_id = %message.sender_id, error = %e, "sender lookup failed");
            Related::Missing
        }
    };
    let view = MessageView { message, sender };

    let appended = messages.send_if_modified(|list| {
        if list.iter().any(|m| m.message.id == view.message.id) {
            return false;
        }
        list.push(view.clone());
        true
    });
    if !appended || view.message.sender_id == user_id {
        return;
    }

    notifier.notify(Notification::new_message(&view));
    if let Err(e) = tables.mark_message_read(view.message.id, user_id).await {
        warn!(message_id = %view.message.id, error = %e, "marking read failed");
    }
}
