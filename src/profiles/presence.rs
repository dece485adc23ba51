use std::collections::HashSet;

use axum::{
    debug_handler,
    extract::{State, WebSocketUpgrade, ws::Message},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::oneshot;
use tower_sessions::Session;
use tracing::debug;
use uuid::Uuid;

use crate::{
    AppResult,
    client::{PresenceTracker, SessionStore},
    platform::Platform,
    session,
};

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename = "presence")]
pub(crate) struct PresenceFrame {
    online: Vec<Uuid>,
}

impl PresenceFrame {
    pub(crate) fn new(online: &HashSet<Uuid>) -> Self {
        let mut online: Vec<Uuid> = online.iter().copied().collect();
        online.sort();
        PresenceFrame { online }
    }
}

/// How a presence socket ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ending {
    Closed,
    SignedOut,
}

/// Stops tracking. A closed socket owes the offline write; a sign-out has
/// already ended the session it would be written for.
pub(crate) async fn finish(tracker: PresenceTracker, store: &SessionStore, ending: Ending) {
    tracker.stop();
    if ending == Ending::Closed {
        store.unload().await;
    }
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn presence_ws(
    State(platform): State<Platform>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let (mut store, identity) = session::require_user(&session, &platform).await?;
    store.mark_online().await;
    let mut auth_events = platform.auth.subscribe();
    let tracker = PresenceTracker::start(&platform).await?;

    Ok(ws.on_upgrade(async move |stream| {
        let mut online = tracker.watch();
        let (mut sender, mut receiver) = stream.split();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let mut push_task = tokio::spawn(async move {
            loop {
                let frame = PresenceFrame::new(&online.borrow_and_update());
                let Ok(text) = serde_json::to_string(&frame) else {
                    break;
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
                tokio::select! {
                    changed = online.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = &mut stop_rx => {
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        // only a close matters from this side
        let mut close_task = tokio::spawn(async move {
            while let Some(Ok(msg)) = receiver.next().await {
                if let Message::Close(_) = msg {
                    break;
                }
            }
        });

        let ending = tokio::select! {
            _ = &mut push_task => Ending::Closed,
            _ = &mut close_task => Ending::Closed,
            _ = store.signed_out(&mut auth_events) => Ending::SignedOut,
        };
        if ending == Ending::SignedOut {
            let _ = stop_tx.send(());
            let _ = (&mut push_task).await;
        }
        push_task.abort();
        close_task.abort();

        finish(tracker, &store, ending).await;
        debug!(user_id = %identity.id, ?ending, "presence socket closed");
    })
    .into_response())
}
