use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Path, State, WebSocketUpgrade, ws::{Message, WebSocket}},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use tokio::sync::{broadcast, mpsc, watch};
use tower_sessions::Session;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    AppResult, Error,
    client::{MessageChannel, Notification, SessionStore},
    model::MessageView,
    platform::{AuthEvent, MemberFilter, Platform},
    session,
};

use super::msg::{self, ServerFrame};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn conversation_ws(
    Path(conversation_id): Path<Uuid>,
    State(platform): State<Platform>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let (store, identity) = session::require_user(&session, &platform).await?;

    let membership = platform
        .tables
        .memberships_of_conversation(conversation_id, MemberFilter::Is(identity.id))
        .await?;
    if membership.is_empty() {
        return Err(Error::NotFound("Percakapan").into());
    }

    let (notify_tx, notifications) = mpsc::unbounded_channel();
    let auth_events = platform.auth.subscribe();
    let mut channel = MessageChannel::new(platform, identity.id, Arc::new(notify_tx));
    channel.activate(conversation_id).await?;

    Ok(ws.on_upgrade(async move |stream| {
        let (sender, mut receiver) = stream.split();
        let (outbox_tx, outbox) = mpsc::unbounded_channel();

        let mut forward_task = tokio::spawn(forward(
            sender,
            channel.watch(),
            notifications,
            outbox,
            store,
            auth_events,
        ));

        let mut receive_task = tokio::spawn(async move {
            while let Some(Ok(msg)) = receiver.next().await {
                let Ok(frame) = serde_json::from_slice(&msg.into_data()) else {
                    continue;
                };

                if let Some(reply) = msg::send_msg(&channel, conversation_id, frame).await {
                    let _ = outbox_tx.send(reply);
                }
            }
        });

        tokio::select! {
            _ = &mut forward_task => receive_task.abort(),
            _ = &mut receive_task => forward_task.abort(),
        };
        debug!(%conversation_id, user_id = %identity.id, "conversation socket closed");
    })
    .into_response())
}

async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &ServerFrame) -> bool {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "frame not serialized");
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

async fn forward(
    mut sender: SplitSink<WebSocket, Message>,
    mut messages: watch::Receiver<Vec<MessageView>>,
    mut notifications: mpsc::UnboundedReceiver<Notification>,
    mut outbox: mpsc::UnboundedReceiver<ServerFrame>,
    mut store: SessionStore,
    mut auth_events: broadcast::Receiver<AuthEvent>,
) {
    let history = messages.borrow_and_update().clone();
    let mut sent = history.len();
    if !send_frame(&mut sender, &ServerFrame::History { messages: history }).await {
        return;
    }

    loop {
        let frames = tokio::select! {
            changed = messages.changed() => {
                if changed.is_err() {
                    break;
                }
                let list = messages.borrow_and_update().clone();
                let frames = msg::frames_since(&list, sent);
                sent = list.len();
                frames
            }
            Some(notification) = notifications.recv() => vec![ServerFrame::Notification { notification }],
            Some(frame) = outbox.recv() => vec![frame],
            _ = store.signed_out(&mut auth_events) => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        };

        for frame in &frames {
            if !send_frame(&mut sender, frame).await {
                return;
            }
        }
    }
}
