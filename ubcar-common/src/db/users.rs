//! Users and login sessions

use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::auth::{generate_salt, hash_password, verify_password};
use crate::db::models::User;
use crate::{time, Error, Result};

const USER_COLUMNS: &str =
    "id, username, first_name, last_name, password_hash, password_salt, can_edit_pages";

/// Fields for a new account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub can_edit_pages: bool,
}

pub async fn create_user(pool: &SqlitePool, new: NewUser) -> Result<User> {
    let username = new.username.trim().to_string();
    if username.is_empty() {
        return Err(Error::InvalidInput("Username must not be empty".to_string()));
    }
    if new.password.is_empty() {
        return Err(Error::InvalidInput("Password must not be empty".to_string()));
    }

    let salt = generate_salt();
    let hash = hash_password(&new.password, &salt);

    let id = sqlx::query(
        r#"
        INSERT INTO users (username, first_name, last_name, password_hash, password_salt, can_edit_pages)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&username)
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(&hash)
    .bind(&salt)
    .bind(new.can_edit_pages)
    .execute(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Error::InvalidInput(format!("Username already taken: {}", username))
        }
        other => Error::Database(other),
    })?
    .last_insert_rowid();

    info!(user_id = id, username = %username, editor = new.can_edit_pages, "Created user");

    Ok(User {
        id,
        username,
        first_name: new.first_name,
        last_name: new.last_name,
        password_hash: hash,
        password_salt: salt,
        can_edit_pages: new.can_edit_pages,
    })
}

pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let user = sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn find_user_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    let user = sqlx::query_as(&format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS))
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// The user, if the username exists and the password matches
pub async fn verify_credentials(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> Result<Option<User>> {
    let user = match find_user_by_username(pool, username).await? {
        Some(user) => user,
        None => return Ok(None),
    };

    if verify_password(password, &user.password_salt, &user.password_hash) {
        Ok(Some(user))
    } else {
        warn!(username = %username, "Password mismatch");
        Ok(None)
    }
}

// ========================================
// Sessions
// ========================================

/// Start a session and return its token
pub async fn create_session(pool: &SqlitePool, user_id: i64) -> Result<String> {
    let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    sqlx::query("INSERT INTO sessions (token, user_id, last_seen_at) VALUES (?, ?, ?)")
        .bind(&token)
        .bind(user_id)
        .bind(time::now_secs())
        .execute(pool)
        .await?;
    Ok(token)
}

/// Resolve a session token; idle sessions older than `lifetime_secs` are dropped
pub async fn session_user(pool: &SqlitePool, token: &str, lifetime_secs: i64) -> Result<Option<User>> {
    let now = time::now_secs();
    let row: Option<(i64, Option<i64>)> =
        sqlx::query_as("SELECT user_id, last_seen_at FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(pool)
            .await?;

    let (user_id, last_seen) = match row {
        Some(row) => row,
        None => return Ok(None),
    };

    if last_seen.map_or(true, |seen| now - seen > lifetime_secs) {
        delete_session(pool, token).await?;
        return Ok(None);
    }

    sqlx::query("UPDATE sessions SET last_seen_at = ? WHERE token = ?")
        .bind(now)
        .bind(token)
        .execute(pool)
        .await?;

    get_user(pool, user_id).await
}

pub async fn delete_session(pool: &SqlitePool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}
