use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method, header};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};
use tracing::info;
use whatsnep::{AppState, Config, Platform, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();
    let config = Config::from_env()?;

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(config.session_idle_minutes)));

    let platform = Platform::connect(&config.database_url, config.realtime_capacity)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;

    let cors = match config.allowed_origin.as_deref() {
        Some("*") => Some(CorsLayer::permissive()),
        Some(origin) => Some(
            CorsLayer::new()
                .allow_origin(HeaderValue::from_str(origin).context("ALLOWED_ORIGIN")?)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE])
                .allow_credentials(true),
        ),
        None => None,
    };

    let bind_addr = config.bind_addr.clone();
    let app_state = AppState { platform, config: Arc::new(config) };

    let mut app = whatsnep::router(app_state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http());
    if let Some(cors) = cors {
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    info!(addr = %bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
