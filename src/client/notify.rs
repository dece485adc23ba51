use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::model::MessageView;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub conversation_id: Uuid,
    pub message_id: Uuid,
}

impl Notification {
    pub fn new_message(view: &MessageView) -> Self {
        let username = view.sender.as_ref().map_or("?", |s| s.username.as_str());
        Notification {
            title: "Pesan Baru".to_owned(),
            body: format!("{username}: {}", view.message.content),
            conversation_id: view.message.conversation_id,
            message_id: view.message.id,
        }
    }
}

/// Where new-message alerts go.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        info!(conversation_id = %notification.conversation_id, "{}: {}", notification.title, notification.body);
    }
}

impl Notifier for mpsc::UnboundedSender<Notification> {
    fn notify(&self, notification: Notification) {
        // receiver gone means nobody is watching anymore
        let _ = self.send(notification);
    }
}
