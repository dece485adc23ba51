use axum::{Json, debug_handler, extract::State};
use tower_sessions::Session;

use crate::{AppResult, AppState, client::{SessionState, SessionStore}, platform::Platform, session, validate::SignInForm};

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(platform): State<Platform>,
    session: Session,
    Json(form): Json<SignInForm>,
) -> AppResult<Json<SessionState>> {
    let mut store = SessionStore::new(platform);
    store.sign_in(&form).await?;
    session.cycle_id().await?;
    session::remember(&session, &store).await?;
    Ok(Json(store.state()))
}
