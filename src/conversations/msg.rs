use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
    Error,
    client::{MessageChannel, Notification},
    model::MessageView,
    validate::{FieldErrors, sanitize_input},
};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ServerFrame {
    History { messages: Vec<MessageView> },
    Message { message: MessageView },
    Notification { notification: Notification },
    Rejected { errors: FieldErrors },
    Error { message: &'static str },
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClientFrame {
    content: String,
}

/// Frames that bring a client holding the first `sent` entries up to `list`.
/// A list shorter than what was sent has been replaced, so it goes out whole.
pub(crate) fn frames_since(list: &[MessageView], sent: usize) -> Vec<ServerFrame> {
    match list.get(sent..) {
        Some(tail) => tail.iter().cloned().map(|message| ServerFrame::Message { message }).collect(),
        None => vec![ServerFrame::History { messages: list.to_vec() }],
    }
}

/// Stores the message. Returns a frame for the sender only when it was
/// refused; accepted messages come back through the channel.
pub(crate) async fn send_msg(
    channel: &MessageChannel,
    conversation_id: Uuid,
    ClientFrame { content }: ClientFrame,
) -> Option<ServerFrame> {
    match channel.send(conversation_id, &sanitize_input(&content)).await {
        Ok(_) => None,
        Err(Error::Validation(errors)) => Some(ServerFrame::Rejected { errors }),
        Err(e) => {
            warn!(%conversation_id, error = %e, "message not sent");
            Some(ServerFrame::Error { message: "Pesan gagal dikirim" })
        }
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::model::{Message, Related};

    fn view(content: &str) -> MessageView {
        MessageView {
            message: Message {
                id: Uuid::now_v7(),
                conversation_id: Uuid::nil(),
                sender_id: Uuid::nil(),
                content: content.into(),
                created_at: OffsetDateTime::UNIX_EPOCH,
                is_read: false,
            },
            sender: Related::Missing,
        }
    }

    #[test]
    fn only_the_tail_is_sent() {
        let list = vec![view("a"), view("b"), view("c")];
        let frames = frames_since(&list, 1);
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], ServerFrame::Message { message } if message.message.content == "b"));
        assert!(frames_since(&list, 3).is_empty());
    }

    #[test]
    fn shrunk_list_is_resent_whole() {
        let list = vec![view("a")];
        let frames = frames_since(&list, 2);
        assert!(matches!(&frames[..], [ServerFrame::History { messages }] if messages.len() == 1));
    }

    #[test]
    fn frames_are_tagged() {
        let json = serde_json::to_value(ServerFrame::Message { message: view("hai") }).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["message"]["content"], "hai");
        assert_eq!(json["message"]["sender"]["state"], "missing");

        let frame: ClientFrame = serde_json::from_str(r#"{"content":"halo"}"#).unwrap();
        assert_eq!(frame.content, "halo");
    }
}
