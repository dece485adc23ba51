use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::distr::{Alphanumeric, SampleString};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{Error, Result};

use super::{now_micros, parse_id};

const TOKEN_LEN: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    /// Display name given at sign-up.
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub identity: Identity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(AuthSession),
    SignedOut { token: String, user_id: Uuid },
    PasswordUpdated(Identity),
}

/// Email + password accounts with opaque session tokens.
#[derive(Clone)]
pub struct Auth {
    pool: SqlitePool,
    events: broadcast::Sender<AuthEvent>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::PasswordHash(e.to_string()))
    })
    .await
    .map_err(|e| Error::PasswordHash(e.to_string()))?
}

async fn verify_password(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&hash).map_err(|e| Error::PasswordHash(e.to_string()))?;
        Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
    })
    .await
    .map_err(|e| Error::PasswordHash(e.to_string()))?
}

impl Auth {
    pub fn new(pool: SqlitePool) -> Self {
        Auth { pool, events: broadcast::channel(64).0 }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    pub async fn sign_up(&self, email: &str, password: &str, username: &str) -> Result<Identity> {
        let identity = Identity {
            id: Uuid::now_v7(),
            email: normalize_email(email),
            username: username.to_owned(),
        };
        let hash = hash_password(password.to_owned()).await?;

        let inserted = sqlx::query("INSERT INTO users (id,email,password_hash,username,created_at) VALUES (?,?,?,?,?)")
            .bind(identity.id.to_string())
            .bind(&identity.email)
            .bind(hash)
            .bind(&identity.username)
            .bind(now_micros())
            .execute(&self.pool)
            .await
            .map_err(Error::from);

        match inserted {
            Err(e) if e.is_unique_violation() => Err(Error::EmailTaken),
            Err(e) => Err(e),
            Ok(_) => {
                info!(user_id = %identity.id, username = %identity.username, "signed up");
                Ok(identity)
            }
        }
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession> {
        let row: Option<(String, String, String, String)> =
            sqlx::query_as("SELECT id,email,username,password_hash FROM users WHERE email=?")
                .bind(normalize_email(email))
                .fetch_optional(&self.pool)
                .await?;

        let Some((id, email, username, hash)) = row else {
            return Err(Error::InvalidCredentials);
        };
        if !verify_password(password.to_owned(), hash).await? {
            return Err(Error::InvalidCredentials);
        }

        let identity = Identity { id: parse_id(&id)?, email, username };
        let token = Alphanumeric.sample_string(&mut rand::rng(), TOKEN_LEN);
        sqlx::query("INSERT INTO auth_sessions (token,user_id,created_at) VALUES (?,?,?)")
            .bind(&token)
            .bind(identity.id.to_string())
            .bind(now_micros())
            .execute(&self.pool)
            .await?;

        let session = AuthSession { token, identity };
        debug!(user_id = %session.identity.id, "signed in");
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    pub async fn session(&self, token: &str) -> Result<Option<AuthSession>> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT u.id,u.email,u.username FROM auth_sessions s JOIN users u ON u.id=s.user_id WHERE s.token=?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, email, username)) = row else {
            return Ok(None);
        };
        Ok(Some(AuthSession {
            token: token.to_owned(),
            identity: Identity { id: parse_id(&id)?, email, username },
        }))
    }

    pub async fn sign_out(&self, token: &str) -> Result<()> {
        let row: Option<(String,)> = sqlx::query_as("DELETE FROM auth_sessions WHERE token=? RETURNING user_id")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        if let Some((user_id,)) = row {
            let user_id = parse_id(&user_id)?;
            debug!(%user_id, "signed out");
            self.emit(AuthEvent::SignedOut { token: token.to_owned(), user_id });
        }
        Ok(())
    }

    pub async fn update_password(&self, token: &str, new_password: &str) -> Result<()> {
        let session = self.session(token).await?.ok_or(Error::Unauthenticated)?;
        let hash = hash_password(new_password.to_owned()).await?;

        sqlx::query("UPDATE users SET password_hash=? WHERE id=?")
            .bind(hash)
            .bind(session.identity.id.to_string())
            .execute(&self.pool)
            .await?;

        self.emit(AuthEvent::PasswordUpdated(session.identity));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::Error;
    use crate::platform::Platform;

    #[tokio::test]
    async fn sign_up_then_sign_in_and_out() {
        let platform = Platform::in_memory().await;
        let auth = &platform.auth;
        let mut events = auth.subscribe();

        let identity = auth.sign_up("Nep@Example.com ", "rahasia1", "nep").await.unwrap();
        assert_eq!(identity.email, "nep@example.com");

        assert!(matches!(
            auth.sign_in_with_password("nep@example.com", "salah123").await,
            Err(Error::InvalidCredentials)
        ));

        let session = auth.sign_in_with_password("NEP@example.com", "rahasia1").await.unwrap();
        assert_eq!(session.identity, identity);
        assert_eq!(auth.session(&session.token).await.unwrap(), Some(session.clone()));
        assert!(matches!(events.recv().await.unwrap(), super::AuthEvent::SignedIn(_)));

        auth.sign_out(&session.token).await.unwrap();
        assert_eq!(auth.session(&session.token).await.unwrap(), None);
        assert!(matches!(events.recv().await.unwrap(), super::AuthEvent::SignedOut { .. }));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let platform = Platform::in_memory().await;
        platform.auth.sign_up("a@b.co", "rahasia1", "first").await.unwrap();
        assert!(matches!(
            platform.auth.sign_up("A@B.co", "rahasia2", "second").await,
            Err(Error::EmailTaken)
        ));
    }

    #[tokio::test]
    async fn password_update_takes_effect() {
        let platform = Platform::in_memory().await;
        let auth = &platform.auth;
        auth.sign_up("a@b.co", "rahasia1", "nep").await.unwrap();
        let session = auth.sign_in_with_password("a@b.co", "rahasia1").await.unwrap();

        auth.update_password(&session.token, "baru1234").await.unwrap();
        assert!(auth.sign_in_with_password("a@b.co", "rahasia1").await.is_err());
        assert!(auth.sign_in_with_password("a@b.co", "baru1234").await.is_ok());

        assert!(matches!(auth.update_password("bogus", "baru1234").await, Err(Error::Unauthenticated)));
    }
}
