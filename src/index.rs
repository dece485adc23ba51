use axum::{Json, debug_handler, extract::State};
use tower_sessions::Session;

use crate::{AppResult, client::SessionState, platform::Platform, session};

#[debug_handler(state = crate::AppState)]
pub async fn index(
    State(platform): State<Platform>,
    session: Session,
) -> AppResult<Json<SessionState>> {
    let store = session::restore(&session, &platform).await?;
    Ok(Json(store.state()))
}
