use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub token_ttl_days: i64,
    /// 0 disables the tombstone purge.
    pub tombstone_retention_hours: i64,
    pub cleanup_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = var("HUDDLE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("HUDDLE_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let db_path = var("HUDDLE_DB_PATH").unwrap_or_else(|| "huddle.db".into());
        let host = var("HUDDLE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or(&var, "HUDDLE_PORT", 3000)?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let token_ttl_days: i64 = parse_or(&var, "HUDDLE_TOKEN_TTL_DAYS", 30)?;
        if token_ttl_days <= 0 {
            bail!("HUDDLE_TOKEN_TTL_DAYS must be positive");
        }
        let tombstone_retention_hours: i64 = parse_or(&var, "HUDDLE_TOMBSTONE_RETENTION_HOURS", 0)?;
        if tombstone_retention_hours < 0 {
            bail!("HUDDLE_TOMBSTONE_RETENTION_HOURS must not be negative");
        }
        let cleanup_interval_secs: u64 = parse_or(&var, "HUDDLE_CLEANUP_INTERVAL_SECS", 3600)?;
        if cleanup_interval_secs == 0 {
            bail!("HUDDLE_CLEANUP_INTERVAL_SECS must be positive");
        }

        Ok(Self {
            jwt_secret,
            db_path: db_path.into(),
            addr,
            token_ttl_days,
            tombstone_retention_hours,
            cleanup_interval_secs,
        })
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.token_ttl_days)
    }

    pub fn tombstone_retention(&self) -> Option<chrono::Duration> {
        (self.tombstone_retention_hours > 0).then(|| chrono::Duration::hours(self.tombstone_retention_hours))
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}
