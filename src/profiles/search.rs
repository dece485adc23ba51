use std::sync::Arc;

use axum::{Json, debug_handler, extract::{Query, State}};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{AppResult, Config, client::search_users, model::Profile, platform::Platform, session};

#[derive(Deserialize)]
pub(crate) struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn search(
    Query(SearchQuery { q }): Query<SearchQuery>,
    State(platform): State<Platform>,
    State(config): State<Arc<Config>>,
    session: Session,
) -> AppResult<Json<Vec<Profile>>> {
    let (_, identity) = session::require_user(&session, &platform).await?;
    let found = search_users(platform.tables.as_ref(), &q, identity.id, config.search_limit).await?;
    Ok(Json(found))
}
