use axum::{debug_handler, extract::State, http::StatusCode};
use tower_sessions::Session;

use crate::{AppResult, AppState, platform::Platform, session};

#[debug_handler(state = AppState)]
pub(crate) async fn logout(
    State(platform): State<Platform>,
    session: Session,
) -> AppResult<StatusCode> {
    let mut store = session::restore(&session, &platform).await?;
    // the cookie stays valid when the platform refused the sign-out
    store.sign_out().await?;
    session.clear().await;
    Ok(StatusCode::NO_CONTENT)
}
