pub mod auth;
pub mod client;
pub mod config;
pub mod conversations;
pub mod error;
pub mod format;
pub mod index;
pub mod logging;
pub mod model;
pub mod platform;
pub mod profiles;
pub mod session;
pub mod validate;

use std::sync::Arc;

use axum::{Json, Router, extract::FromRef, http::StatusCode, response::{IntoResponse, Response}, routing::get};
use serde_json::json;
use tracing::error;

pub use config::Config;
pub use error::{Error, Result};
pub use platform::Platform;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub platform: Platform,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index::index))
        .nest("/auth", auth::router())
        .nest("/c", conversations::router())
        .nest("/p", profiles::router())
        .with_state(state)
}

pub type AppResult<T> = std::result::Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            Error::Validation(errors) => (StatusCode::BAD_REQUEST, json!({ "errors": errors })),
            Error::UsernameTaken => (StatusCode::CONFLICT, json!({ "errors": { "username": "Username sudah digunakan" } })),
            Error::EmailTaken => (StatusCode::CONFLICT, json!({ "errors": { "email": "Email sudah terdaftar" } })),
            Error::InvalidCredentials => (StatusCode::UNAUTHORIZED, json!({ "message": "Email atau password salah" })),
            Error::Unauthenticated => (StatusCode::UNAUTHORIZED, json!({ "message": "Silakan masuk terlebih dahulu" })),
            Error::NotFound(what) => (StatusCode::NOT_FOUND, json!({ "message": format!("{what} tidak ditemukan") })),
            e => {
                error!(error = %e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "message": "Terjadi kesalahan" }))
            }
        };
        (status, Json(body)).into_response()
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(Error::from(err))
            }
        }
    };
}

apperr_impl!(Error);
apperr_impl!(sqlx::Error);
apperr_impl!(tower_sessions::session::Error);
