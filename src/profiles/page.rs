use axum::{Json, debug_handler, extract::{Path, State}};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppResult, Error, model::Profile, platform::Platform, session};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn profile(
    Path(profile_id): Path<Uuid>,
    State(platform): State<Platform>,
    session: Session,
) -> AppResult<Json<Profile>> {
    session::require_user(&session, &platform).await?;

    let profile = platform.tables.profile(profile_id).await?.ok_or(Error::NotFound("Profil"))?;
    Ok(Json(profile))
}
