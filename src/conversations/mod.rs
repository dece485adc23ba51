mod list;
mod msg;
mod new;
mod ws;

use axum::{Router, routing::get};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list::list).post(new::new_conversation))
        .route("/{id}/ws", get(ws::conversation_ws))
}
