//! Request-forgery tokens and password hashing
//!
//! # Nonces
//!
//! A nonce binds one action name to one user session for a limited time:
//!
//! 1. `tick = floor(now_secs / (lifetime / 2))`
//! 2. `input = "{tick}|{action}|{user_id}|{session_token}|{secret}"`
//! 3. `nonce = first 20 hex chars of SHA-256(input)`
//!
//! A nonce verifies against the current and the previous tick, so it stays
//! valid for between `lifetime / 2` and `lifetime` seconds.
//!
//! The secret is a random non-zero i64 kept in the `settings` table under
//! `nonce_secret`.
//!
//! # Passwords
//!
//! `hex(SHA-256(salt || password))` with a random 16-byte hex salt per user.

use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::{Error, Result};

/// Action name used by all media admin forms
pub const MEDIA_NONCE_ACTION: &str = "ubcar_nonce_check";

const NONCE_SECRET_KEY: &str = "nonce_secret";
const NONCE_LEN: usize = 20;

// ========================================
// Secret Management
// ========================================

/// Load the nonce secret, generating and storing one on first use
pub async fn load_nonce_secret(db: &SqlitePool) -> Result<i64> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(NONCE_SECRET_KEY)
            .fetch_optional(db)
            .await?;

    match result {
        Some((value,)) => value
            .parse::<i64>()
            .map_err(|e| Error::Config(format!("Invalid {}: {}", NONCE_SECRET_KEY, e))),
        None => initialize_nonce_secret(db).await,
    }
}

/// Generate a crypto-random non-zero secret and store it
pub async fn initialize_nonce_secret(db: &SqlitePool) -> Result<i64> {
    let mut rng = rand::thread_rng();
    let secret: i64 = loop {
        let val = rng.gen::<i64>();
        if val != 0 {
            break val;
        }
    };

    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(NONCE_SECRET_KEY)
        .bind(secret.to_string())
        .execute(db)
        .await?;

    Ok(secret)
}

// ========================================
// Nonce Creation and Verification
// ========================================

/// Inputs that bind a nonce to a session
#[derive(Debug, Clone, Copy)]
pub struct NonceContext<'a> {
    pub user_id: i64,
    pub session_token: &'a str,
    pub secret: i64,
    pub lifetime_secs: i64,
}

fn tick(now_secs: i64, lifetime_secs: i64) -> i64 {
    let half = (lifetime_secs / 2).max(1);
    now_secs.div_euclid(half)
}

fn nonce_for_tick(ctx: &NonceContext<'_>, action: &str, tick: i64) -> String {
    let input = format!(
        "{}|{}|{}|{}|{}",
        tick, action, ctx.user_id, ctx.session_token, ctx.secret
    );
    let digest = format!("{:x}", Sha256::digest(input.as_bytes()));
    digest[..NONCE_LEN].to_string()
}

/// Create a nonce for `action` at `now_secs`
///
/// # Examples
///
/// ```
/// use ubcar_common::api::auth::{create_nonce, verify_nonce, NonceContext};
///
/// let ctx = NonceContext { user_id: 7, session_token: "abc", secret: 42, lifetime_secs: 86_400 };
/// let nonce = create_nonce(&ctx, "ubcar_nonce_check", 1_700_000_000);
/// assert_eq!(nonce.len(), 20);
/// assert!(verify_nonce(&ctx, "ubcar_nonce_check", &nonce, 1_700_000_000));
/// assert!(!verify_nonce(&ctx, "other_action", &nonce, 1_700_000_000));
/// ```
pub fn create_nonce(ctx: &NonceContext<'_>, action: &str, now_secs: i64) -> String {
    nonce_for_tick(ctx, action, tick(now_secs, ctx.lifetime_secs))
}

/// True if `nonce` was issued for `action` in the current or previous tick
pub fn verify_nonce(ctx: &NonceContext<'_>, action: &str, nonce: &str, now_secs: i64) -> bool {
    if nonce.len() != NONCE_LEN {
        return false;
    }
    let current = tick(now_secs, ctx.lifetime_secs);
    [current, current - 1]
        .iter()
        .any(|&t| constant_time_eq(nonce_for_tick(ctx, action, t).as_bytes(), nonce.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ========================================
// Passwords
// ========================================

/// Random 16-byte salt as 32 hex characters
pub fn generate_salt() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    constant_time_eq(hash_password(password, salt).as_bytes(), expected_hash.as_bytes())
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = 86_400;

    fn ctx(token: &str) -> NonceContext<'_> {
        NonceContext {
            user_id: 3,
            session_token: token,
            secret: 123456789,
            lifetime_secs: DAY,
        }
    }

    #[test]
    fn test_nonce_valid_same_tick() {
        let now = 1_730_000_000;
        let nonce = create_nonce(&ctx("s1"), MEDIA_NONCE_ACTION, now);
        assert!(verify_nonce(&ctx("s1"), MEDIA_NONCE_ACTION, &nonce, now + 10));
    }

    #[test]
    fn test_nonce_valid_previous_tick() {
        let now = 1_730_000_000;
        let nonce = create_nonce(&ctx("s1"), MEDIA_NONCE_ACTION, now);
        assert!(verify_nonce(&ctx("s1"), MEDIA_NONCE_ACTION, &nonce, now + DAY / 2));
    }

    #[test]
    fn test_nonce_expires_after_two_ticks() {
        let now = 1_730_000_000;
        let nonce = create_nonce(&ctx("s1"), MEDIA_NONCE_ACTION, now);
        assert!(!verify_nonce(&ctx("s1"), MEDIA_NONCE_ACTION, &nonce, now + DAY + DAY / 2));
    }

    #[test]
    fn test_nonce_bound_to_session_and_user() {
        let now = 1_730_000_000;
        let nonce = create_nonce(&ctx("s1"), MEDIA_NONCE_ACTION, now);
        assert!(!verify_nonce(&ctx("s2"), MEDIA_NONCE_ACTION, &nonce, now));

        let other_user = NonceContext { user_id: 4, ..ctx("s1") };
        assert!(!verify_nonce(&other_user, MEDIA_NONCE_ACTION, &nonce, now));
    }

    #[test]
    fn test_nonce_rejects_garbage() {
        let now = 1_730_000_000;
        assert!(!verify_nonce(&ctx("s1"), MEDIA_NONCE_ACTION, "", now));
        assert!(!verify_nonce(&ctx("s1"), MEDIA_NONCE_ACTION, "not-a-nonce", now));
        assert!(!verify_nonce(&ctx("s1"), MEDIA_NONCE_ACTION, "00000000000000000000", now));
    }

    #[test]
    fn test_password_roundtrip() {
        let salt = generate_salt();
        assert_eq!(salt.len(), 32);
        let hash = hash_password("correct horse", &salt);
        assert_eq!(hash.len(), 64);
        assert!(verify_password("correct horse", &salt, &hash));
        assert!(!verify_password("wrong horse", &salt, &hash));
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
