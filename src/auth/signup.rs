use axum::{Json, debug_handler, extract::State, http::StatusCode};
use tower_sessions::Session;
use tracing::info;

use crate::{AppResult, AppState, client::{SessionState, SessionStore}, platform::Platform, session, validate::SignUpForm};

#[debug_handler(state = AppState)]
pub(crate) async fn signup(
    State(platform): State<Platform>,
    session: Session,
    Json(form): Json<SignUpForm>,
) -> AppResult<(StatusCode, Json<SessionState>)> {
    let mut store = SessionStore::new(platform);
    let identity = store.sign_up(&form).await?;
    session.cycle_id().await?;
    session::remember(&session, &store).await?;

    info!(user_id = %identity.id, username = %identity.username, "signed up");
    Ok((StatusCode::CREATED, Json(store.state())))
}
