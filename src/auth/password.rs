use axum::{debug_handler, extract::State, http::StatusCode, Json};
use tower_sessions::Session;
use tracing::info;

use crate::{AppResult, AppState, platform::Platform, session, validate::PasswordChangeForm};

#[debug_handler(state = AppState)]
pub(crate) async fn password(
    State(platform): State<Platform>,
    session: Session,
    Json(form): Json<PasswordChangeForm>,
) -> AppResult<StatusCode> {
    let (store, identity) = session::require_user(&session, &platform).await?;
    store.update_password(&form).await?;
    info!(user_id = %identity.id, "password changed");
    Ok(StatusCode::NO_CONTENT)
}
