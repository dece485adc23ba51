use axum::{Json, debug_handler, extract::State};
use tower_sessions::Session;

use crate::{AppResult, client::Conversations, model::ConversationSummary, platform::Platform, session};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list(
    State(platform): State<Platform>,
    session: Session,
) -> AppResult<Json<Vec<ConversationSummary>>> {
    let (_, identity) = session::require_user(&session, &platform).await?;
    let conversations = Conversations::new(platform.tables.clone(), identity.id);
    Ok(Json(conversations.refresh().await?))
}
