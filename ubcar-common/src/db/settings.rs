//! Runtime settings stored in the `settings` table
//!
//! Missing or NULL values are initialized with built-in defaults on startup,
//! so every key below is always present after [`init_default_settings`].

use crate::{Error, Result};
use sqlx::SqlitePool;
use tracing::{info, warn};

pub const NONCE_LIFETIME_SECS: &str = "nonce_lifetime_secs";
pub const SESSION_LIFETIME_SECS: &str = "session_lifetime_secs";
pub const UPLOAD_MAX_BYTES: &str = "upload_max_bytes";

const DEFAULT_NONCE_LIFETIME_SECS: i64 = 86_400;
const DEFAULT_SESSION_LIFETIME_SECS: i64 = 14 * 86_400;
const DEFAULT_UPLOAD_MAX_BYTES: i64 = 10 * 1024 * 1024;

/// Initialize or update default settings
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, NONCE_LIFETIME_SECS, &DEFAULT_NONCE_LIFETIME_SECS.to_string()).await?;
    ensure_setting(pool, SESSION_LIFETIME_SECS, &DEFAULT_SESSION_LIFETIME_SECS.to_string()).await?;
    ensure_setting(pool, UPLOAD_MAX_BYTES, &DEFAULT_UPLOAD_MAX_BYTES.to_string()).await?;
    Ok(())
}

/// Insert `default` when the key is missing, replace it when the value is NULL
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default: &str) -> Result<()> {
    let existing: Option<(Option<String>,)> =
        sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    match existing {
        Some((Some(_),)) => {}
        Some((None,)) => {
            warn!("Setting '{}' is NULL, resetting to default: {}", key, default);
            write_setting(pool, key, default).await?;
        }
        None => {
            info!("Setting '{}' not found in database, using default: {}", key, default);
            write_setting(pool, key, default).await?;
        }
    }
    Ok(())
}

pub async fn write_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn read_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<(Option<String>,)> =
        sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
    Ok(value.and_then(|(v,)| v))
}

async fn read_i64(pool: &SqlitePool, key: &str, default: i64) -> Result<i64> {
    match read_setting(pool, key).await? {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|e| Error::Config(format!("Setting '{}' is not an integer: {}", key, e))),
        None => Ok(default),
    }
}

/// Runtime settings snapshot taken at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub nonce_lifetime_secs: i64,
    pub session_lifetime_secs: i64,
    pub upload_max_bytes: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            nonce_lifetime_secs: DEFAULT_NONCE_LIFETIME_SECS,
            session_lifetime_secs: DEFAULT_SESSION_LIFETIME_SECS,
            upload_max_bytes: DEFAULT_UPLOAD_MAX_BYTES as usize,
        }
    }
}

impl RuntimeSettings {
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let nonce_lifetime_secs = read_i64(pool, NONCE_LIFETIME_SECS, DEFAULT_NONCE_LIFETIME_SECS).await?;
        let session_lifetime_secs =
            read_i64(pool, SESSION_LIFETIME_SECS, DEFAULT_SESSION_LIFETIME_SECS).await?;
        let upload_max_bytes = read_i64(pool, UPLOAD_MAX_BYTES, DEFAULT_UPLOAD_MAX_BYTES).await?;

        if nonce_lifetime_secs < 2 {
            return Err(Error::Config(format!(
                "{} must be at least 2, got {}",
                NONCE_LIFETIME_SECS, nonce_lifetime_secs
            )));
        }
        if session_lifetime_secs <= 0 {
            return Err(Error::Config(format!(
                "{} must be positive, got {}",
                SESSION_LIFETIME_SECS, session_lifetime_secs
            )));
        }
        if upload_max_bytes <= 0 {
            return Err(Error::Config(format!(
                "{} must be positive, got {}",
                UPLOAD_MAX_BYTES, upload_max_bytes
            )));
        }

        Ok(Self {
            nonce_lifetime_secs,
            session_lifetime_secs,
            upload_max_bytes: upload_max_bytes as usize,
        })
    }
}
