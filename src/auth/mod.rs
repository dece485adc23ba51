mod login;
mod logout;
mod password;
mod signup;

use axum::{Json, Router, debug_handler, extract::{Path, State}, routing::{get, post}};
use serde::Serialize;

use crate::{AppState, client::SessionStore, platform::Platform};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup::signup))
        .route("/login", post(login::login))
        .route("/logout", post(logout::logout))
        .route("/password", post(password::password))
        .route("/username/{username}", get(username_available))
}

#[derive(Serialize)]
pub(crate) struct Availability {
    available: bool,
}

#[debug_handler(state = AppState)]
pub(crate) async fn username_available(
    Path(username): Path<String>,
    State(platform): State<Platform>,
) -> Json<Availability> {
    let store = SessionStore::new(platform);
    Json(Availability { available: store.check_username_availability(&username).await })
}
