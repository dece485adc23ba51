use std::str::FromStr;

use anyhow::Context;

use crate::client::DEFAULT_SEARCH_LIMIT;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub session_idle_minutes: i64,
    pub realtime_capacity: usize,
    pub search_limit: u32,
    /// Browser origin allowed to call the API with credentials. `None`
    /// disables CORS.
    pub allowed_origin: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: "sqlite://whatsnep.db?mode=rwc".to_owned(),
            bind_addr: "0.0.0.0:8080".to_owned(),
            session_idle_minutes: 30,
            realtime_capacity: 256,
            search_limit: DEFAULT_SEARCH_LIMIT,
            allowed_origin: None,
        }
    }
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match dotenv::var(key) {
        Ok(value) => value.parse().with_context(|| format!("{key}={value:?} is not valid")),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Reads the environment, after loading `.env` if there is one.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        let defaults = Config::default();

        let config = Config {
            database_url: dotenv::var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: dotenv::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            session_idle_minutes: parsed("SESSION_IDLE_MINUTES", defaults.session_idle_minutes)?,
            realtime_capacity: parsed("REALTIME_CAPACITY", defaults.realtime_capacity)?,
            search_limit: parsed("SEARCH_LIMIT", defaults.search_limit)?,
            allowed_origin: dotenv::var("ALLOWED_ORIGIN").ok().filter(|o| !o.is_empty()),
        };

        anyhow::ensure!(config.realtime_capacity > 0, "REALTIME_CAPACITY must be positive");
        anyhow::ensure!(config.session_idle_minutes > 0, "SESSION_IDLE_MINUTES must be positive");
        Ok(config)
    }
}
