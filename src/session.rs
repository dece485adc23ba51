use tower_sessions::Session;

use crate::client::SessionStore;
use crate::platform::{Identity, Platform};
use crate::{AppResult, Error};

pub(crate) const ACCESS_TOKEN: &str = "access_token";

/// Rebuilds the caller's session store from the cookie session.
pub(crate) async fn restore(session: &Session, platform: &Platform) -> AppResult<SessionStore> {
    let token = session.get::<String>(ACCESS_TOKEN).await?;
    let mut store = SessionStore::new(platform.clone());
    store.init(token).await;
    Ok(store)
}

/// Like [`restore`], but the caller must be signed in.
pub(crate) async fn require_user(session: &Session, platform: &Platform) -> AppResult<(SessionStore, Identity)> {
    let store = restore(session, platform).await?;
    let identity = store.identity().ok_or(Error::Unauthenticated)?;
    Ok((store, identity))
}

pub(crate) async fn remember(session: &Session, store: &SessionStore) -> AppResult<()> {
    if let Some(token) = store.token() {
        session.insert(ACCESS_TOKEN, token).await?;
    }
    Ok(())
}
