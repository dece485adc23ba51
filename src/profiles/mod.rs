mod page;
mod presence;
mod search;

use axum::{Router, routing::get};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search", get(search::search))
        .route("/presence/ws", get(presence::presence_ws))
        .route("/{id}", get(page::profile))
}
