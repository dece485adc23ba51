use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::model::{Profile, Related, Status};
use crate::platform::{AuthEvent, AuthSession, Identity, NewProfile, Platform};
use crate::validate::{PasswordChangeForm, SignInForm, SignUpForm, is_valid_username};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Initializing,
    Anonymous,
    Authenticated { identity: Identity, profile: Related<Profile> },
}

/// The signed-in identity and its profile, for one client.
pub struct SessionStore {
    platform: Platform,
    token: Option<String>,
    state: watch::Sender<SessionState>,
}

impl SessionStore {
    pub fn new(platform: Platform) -> Self {
        SessionStore {
            platform,
            token: None,
            state: watch::channel(SessionState::Initializing).0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn identity(&self) -> Option<Identity> {
        match &*self.state.borrow() {
            SessionState::Authenticated { identity, .. } => Some(identity.clone()),
            _ => None,
        }
    }

    pub fn profile(&self) -> Option<Profile> {
        match &*self.state.borrow() {
            SessionState::Authenticated { profile, .. } => profile.as_ref().cloned(),
            _ => None,
        }
    }

    /// Resolves the first session check. A lookup failure counts as signed out.
    pub async fn init(&mut self, token: Option<String>) -> SessionState {
        let session = match token {
            Some(token) => self.platform.auth.session(&token).await.unwrap_or_else(|e| {
                warn!(error = %e, "session lookup failed");
                None
            }),
            None => None,
        };

        match session {
            Some(session) => self.authenticate(session).await,
            None => self.clear(),
        }
        self.state()
    }

    async fn authenticate(&mut self, session: AuthSession) {
        let profile = match self.platform.tables.profile(session.identity.id).await {
            Ok(profile) => profile.into(),
            Err(e) => {
                warn!(user_id = %session.identity.id, error = %e, "profile fetch failed");
                Related::Missing
            }
        };
        self.token = Some(session.token);
        self.state.send_replace(SessionState::Authenticated { identity: session.identity, profile });
    }

    fn clear(&mut self) {
        self.token = None;
        self.state.send_replace(SessionState::Anonymous);
    }

    /// Re-reads the cached profile.
    pub async fn fetch_profile(&self) -> Option<Profile> {
        let identity = self.identity()?;
        match self.platform.tables.profile(identity.id).await {
            Ok(profile) => {
                let related: Related<Profile> = profile.clone().into();
                self.state.send_modify(|state| {
                    if let SessionState::Authenticated { profile, .. } = state {
                        *profile = related;
                    }
                });
                profile
            }
            Err(e) => {
                warn!(user_id = %identity.id, error = %e, "profile fetch failed");
                None
            }
        }
    }

    pub async fn sign_up(&mut self, form: &SignUpForm) -> Result<Identity> {
        form.validate()?;
        if self.platform.tables.profile_by_username(&form.username).await?.is_some() {
            return Err(Error::UsernameTaken);
        }

        let identity = self.platform.auth.sign_up(&form.email, &form.password, &form.username).await?;
        let inserted = self
            .platform
            .tables
            .insert_profile(NewProfile {
                id: identity.id,
                username: form.username.clone(),
                avatar_url: None,
                status: Status::Online,
            })
            .await;
        match inserted {
            Err(e) if e.is_unique_violation() => return Err(Error::UsernameTaken),
            Err(e) => return Err(e),
            Ok(_) => {}
        }

        let session = self.platform.auth.sign_in_with_password(&form.email, &form.password).await?;
        self.authenticate(session).await;
        Ok(identity)
    }

    pub async fn sign_in(&mut self, form: &SignInForm) -> Result<Identity> {
        form.validate()?;
        let session = self.platform.auth.sign_in_with_password(&form.email, &form.password).await?;
        let identity = session.identity.clone();
        self.authenticate(session).await;
        info!(user_id = %identity.id, "signed in");
        Ok(identity)
    }

    /// Marks the profile offline (best effort), ends the session, then
    /// forgets the identity.
    pub async fn sign_out(&mut self) -> Result<()> {
        if let Some(identity) = self.identity() {
            if let Err(e) = self.platform.tables.update_status(identity.id, Status::Offline).await {
                warn!(user_id = %identity.id, error = %e, "offline status not written");
            }
        }
        if let Some(token) = &self.token {
            self.platform.auth.sign_out(token).await?;
        }
        self.clear();
        Ok(())
    }

    pub async fn update_password(&self, form: &PasswordChangeForm) -> Result<()> {
        form.validate()?;
        let token = self.token.as_deref().ok_or(Error::Unauthenticated)?;
        self.platform.auth.update_password(token, &form.new_password).await
    }

    /// No profile with that name → available. Any lookup failure counts as
    /// taken.
    pub async fn check_username_availability(&self, username: &str) -> bool {
        if !is_valid_username(username) {
            return false;
        }
        match self.platform.tables.profile_by_username(username).await {
            Ok(found) => found.is_none(),
            Err(e) => {
                warn!(%username, error = %e, "username check failed");
                false
            }
        }
    }

    pub async fn mark_online(&self) {
        self.write_status(Status::Online).await;
    }

    /// The client is going away: queue an offline write without waiting for
    /// it, or write directly when the beacon cannot take it.
    pub async fn unload(&self) {
        let Some(identity) = self.identity() else {
            return;
        };
        if self.platform.beacon.send(identity.id, Status::Offline) {
            debug!(user_id = %identity.id, "offline beacon queued");
        } else {
            self.write_status(Status::Offline).await;
        }
    }

    async fn write_status(&self, status: Status) {
        let Some(identity) = self.identity() else {
            return;
        };
        match self.platform.tables.update_status(identity.id, status).await {
            Ok(profile) => {
                let related: Related<Profile> = profile.into();
                self.state.send_modify(|state| {
                    if let SessionState::Authenticated { profile, .. } = state {
                        *profile = related;
                    }
                });
            }
            Err(e) => warn!(user_id = %identity.id, status = status.as_str(), error = %e, "status not written"),
        }
    }

    /// Follows session changes made elsewhere, e.g. a sign-out from another
    /// connection holding the same token.
    pub async fn apply(&mut self, event: &AuthEvent) {
        let Some(current) = self.identity() else {
            return;
        };
        match event {
            AuthEvent::SignedOut { token, .. } if self.token.as_ref() == Some(token) => {
                debug!("session ended elsewhere");
                self.clear();
            }
            AuthEvent::SignedIn(session) if session.identity.id == current.id => {
                self.fetch_profile().await;
            }
            AuthEvent::PasswordUpdated(identity) if identity.id == current.id => {
                let identity = identity.clone();
                self.state.send_modify(|state| {
                    if let SessionState::Authenticated { identity: current, .. } = state {
                        *current = identity;
                    }
                });
            }
            _ => {}
        }
    }

    /// Applies auth events until this session is gone. Resolves right away
    /// when signed out already, and when the event stream ends.
    pub async fn signed_out(&mut self, events: &mut broadcast::Receiver<AuthEvent>) {
        while self.identity().is_some() {
            match events.recv().await {
                Ok(event) => self.apply(&event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "auth events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign_up_form(username: &str, email: &str) -> SignUpForm {
        SignUpForm {
            username: username.into(),
            email: email.into(),
            password: "rahasia1".into(),
            confirm_password: "rahasia1".into(),
        }
    }

    #[tokio::test]
    async fn starts_initializing_then_anonymous() {
        let platform = Platform::in_memory().await;
        let mut store = SessionStore::new(platform);
        assert_eq!(store.state(), SessionState::Initializing);
        assert_eq!(store.init(None).await, SessionState::Anonymous);

        let mut store = SessionStore::new(store.platform.clone());
        assert_eq!(store.init(Some("stale".into())).await, SessionState::Anonymous);
    }

    #[tokio::test]
    async fn sign_up_creates_online_profile_and_session() {
        let platform = Platform::in_memory().await;
        let mut store = SessionStore::new(platform.clone());
        let identity = store.sign_up(&sign_up_form("nep", "nep@example.com")).await.unwrap();

        let profile = store.profile().unwrap();
        assert_eq!(profile.id, identity.id);
        assert_eq!(profile.status, Status::Online);

        let mut resumed = SessionStore::new(platform);
        let state = resumed.init(store.token().map(str::to_owned)).await;
        assert!(matches!(state, SessionState::Authenticated { identity: ref i, .. } if i.id == identity.id));
    }

    #[tokio::test]
    async fn taken_username_is_a_conflict() {
        let platform = Platform::in_memory().await;
        let mut first = SessionStore::new(platform.clone());
        first.sign_up(&sign_up_form("nep", "a@example.com")).await.unwrap();

        let mut second = SessionStore::new(platform);
        assert!(!second.check_username_availability("nep").await);
        assert!(second.check_username_availability("nep2").await);
        assert!(!second.check_username_availability("x").await);
        assert!(matches!(
            second.sign_up(&sign_up_form("nep", "b@example.com")).await,
            Err(Error::UsernameTaken)
        ));
    }

    #[tokio::test]
    async fn sign_out_marks_offline_and_clears() {
        let platform = Platform::in_memory().await;
        let mut store = SessionStore::new(platform.clone());
        let identity = store.sign_up(&sign_up_form("nep", "nep@example.com")).await.unwrap();
        let token = store.token().unwrap().to_owned();

        store.sign_out().await.unwrap();
        assert_eq!(store.state(), SessionState::Anonymous);
        assert_eq!(store.token(), None);
        assert_eq!(platform.auth.session(&token).await.unwrap(), None);

        let profile = platform.tables.profile(identity.id).await.unwrap().unwrap();
        assert_eq!(profile.status, Status::Offline);
        assert!(profile.last_seen.is_some());
    }

    #[tokio::test]
    async fn sign_in_with_wrong_password_stays_anonymous() {
        let platform = Platform::in_memory().await;
        let mut store = SessionStore::new(platform.clone());
        store.sign_up(&sign_up_form("nep", "nep@example.com")).await.unwrap();

        let mut other = SessionStore::new(platform);
        other.init(None).await;
        let form = SignInForm { email: "nep@example.com".into(), password: "salah123".into() };
        assert!(matches!(other.sign_in(&form).await, Err(Error::InvalidCredentials)));
        assert_eq!(other.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn remote_sign_out_clears_state() {
        let platform = Platform::in_memory().await;
        let mut store = SessionStore::new(platform.clone());
        store.sign_up(&sign_up_form("nep", "nep@example.com")).await.unwrap();
        let mut events = platform.auth.subscribe();

        platform.auth.sign_out(store.token().unwrap()).await.unwrap();
        let event = events.recv().await.unwrap();
        store.apply(&event).await;
        assert_eq!(store.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn signed_out_waits_for_this_session_only() {
        let platform = Platform::in_memory().await;
        let mut store = SessionStore::new(platform.clone());
        store.sign_up(&sign_up_form("nep", "nep@example.com")).await.unwrap();
        let mut other = SessionStore::new(platform.clone());
        other.sign_up(&sign_up_form("lain", "lain@example.com")).await.unwrap();
        let mut events = platform.auth.subscribe();

        other.sign_out().await.unwrap();
        platform.auth.sign_out(store.token().unwrap()).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), store.signed_out(&mut events))
            .await
            .unwrap();
        assert_eq!(store.state(), SessionState::Anonymous);

        // already signed out: nothing to wait for
        tokio::time::timeout(std::time::Duration::from_secs(2), store.signed_out(&mut events))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sign_in_elsewhere_refreshes_profile() {
        let platform = Platform::in_memory().await;
        let mut store = SessionStore::new(platform.clone());
        let identity = store.sign_up(&sign_up_form("nep", "nep@example.com")).await.unwrap();
        platform.tables.update_status(identity.id, Status::Offline).await.unwrap();
        assert_eq!(store.profile().unwrap().status, Status::Online);

        let mut events = platform.auth.subscribe();
        let mut elsewhere = SessionStore::new(platform.clone());
        let form = SignInForm { email: "nep@example.com".into(), password: "rahasia1".into() };
        elsewhere.sign_in(&form).await.unwrap();

        let event = events.recv().await.unwrap();
        assert!(matches!(event, AuthEvent::SignedIn(_)));
        store.apply(&event).await;
        assert_eq!(store.profile().unwrap().status, Status::Offline);
        assert!(store.identity().is_some());
    }

    #[tokio::test]
    async fn online_then_unload() {
        let platform = Platform::in_memory().await;
        let mut store = SessionStore::new(platform.clone());
        let identity = store.sign_up(&sign_up_form("nep", "nep@example.com")).await.unwrap();

        platform.tables.update_status(identity.id, Status::Offline).await.unwrap();
        store.mark_online().await;
        assert_eq!(store.profile().unwrap().status, Status::Online);

        store.unload().await;
        let mut status = Status::Online;
        for _ in 0..50 {
            status = platform.tables.profile(identity.id).await.unwrap().unwrap().status;
            if status == Status::Offline {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, Status::Offline);
    }
}
