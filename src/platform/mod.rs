//! The backend the chat client runs against: relational tables, password
//! auth, row-change fan-out and a best-effort status beacon.

mod auth;
mod beacon;
mod realtime;
mod sqlite;
mod tables;

use std::sync::Arc;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::{Error, Result};

pub use auth::{Auth, AuthEvent, AuthSession, Identity};
pub use beacon::Beacon;
pub use realtime::{Change, ChangeKind, Filter, Interrupted, Realtime, Record, Subscription, Table};
pub use sqlite::SqliteTables;
pub use tables::{MemberFilter, NewMessage, NewProfile, Tables};

const SCHEMA: &str = include_str!("schema.sql");
const BEACON_QUEUE: usize = 64;

#[derive(Clone)]
pub struct Platform {
    pub tables: Arc<dyn Tables>,
    pub auth: Auth,
    pub realtime: Realtime,
    pub beacon: Beacon,
}

impl Platform {
    pub async fn connect(database_url: &str, realtime_capacity: usize) -> Result<Self> {
        // every connection to `:memory:` is its own database
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(database_url)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(16)
                .connect(database_url)
                .await?
        };

        Self::from_pool(pool, realtime_capacity).await
    }

    /// Applies the schema and wires the tables to a fresh realtime hub.
    /// Must run inside a tokio runtime; the beacon worker is spawned here.
    pub async fn from_pool(pool: SqlitePool, realtime_capacity: usize) -> Result<Self> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        info!("schema ready");

        let realtime = Realtime::new(realtime_capacity);
        let tables: Arc<dyn Tables> = Arc::new(SqliteTables::new(pool.clone(), realtime.clone()));
        Ok(Platform {
            beacon: Beacon::spawn(tables.clone(), BEACON_QUEUE),
            auth: Auth::new(pool),
            tables,
            realtime,
        })
    }

    #[cfg(test)]
    pub(crate) async fn in_memory() -> Self {
        Self::connect("sqlite::memory:", 256).await.unwrap()
    }
}

pub(crate) fn parse_id(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|_| Error::corrupt("id", s))
}

pub(crate) fn now_micros() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000) as i64
}

pub(crate) fn from_micros(micros: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
        .map_err(|_| Error::corrupt("timestamp", micros))
}
