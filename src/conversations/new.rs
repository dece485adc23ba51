use axum::{Json, debug_handler, extract::State};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppResult, client::Conversations, platform::Platform, session};

#[derive(Debug, Deserialize)]
pub(crate) struct NewConversation {
    other_user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub(crate) struct Opened {
    /// `None` when the conversation could not be opened.
    conversation_id: Option<Uuid>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_conversation(
    State(platform): State<Platform>,
    session: Session,
    Json(NewConversation { other_user_id }): Json<NewConversation>,
) -> AppResult<Json<Opened>> {
    let (_, identity) = session::require_user(&session, &platform).await?;
    let conversations = Conversations::new(platform.tables.clone(), identity.id);
    Ok(Json(Opened { conversation_id: conversations.open_with(other_user_id).await }))
}
