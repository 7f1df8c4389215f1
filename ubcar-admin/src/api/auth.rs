//! Sessions and request-forgery tokens
//!
//! A session token arrives either as `Authorization: Bearer <token>` or as the
//! `ubcar_session` cookie set by [`login`]. The middleware resolves it to a
//! [`Session`] request extension; handlers that mutate data additionally
//! check a nonce issued by [`issue_nonce`].

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use ubcar_common::api::auth::{create_nonce, verify_nonce, NonceContext, MEDIA_NONCE_ACTION};
use ubcar_common::db::models::User;
use ubcar_common::db::users;
use ubcar_common::time;

use crate::AppState;

pub const SESSION_COOKIE: &str = "ubcar_session";

/// Authenticated caller, inserted by [`session_middleware`]
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub token: String,
}

impl Session {
    fn nonce_context<'a>(&'a self, state: &AppState) -> NonceContext<'a> {
        NonceContext {
            user_id: self.user.id,
            session_token: &self.token,
            secret: state.nonce_secret,
            lifetime_secs: state.settings.nonce_lifetime_secs,
        }
    }

    /// Nonce for the media admin forms, valid for this session only
    pub fn nonce(&self, state: &AppState) -> String {
        create_nonce(&self.nonce_context(state), MEDIA_NONCE_ACTION, time::now_secs())
    }

    pub fn nonce_is_valid(&self, state: &AppState, nonce: &str) -> bool {
        let valid = verify_nonce(
            &self.nonce_context(state),
            MEDIA_NONCE_ACTION,
            nonce,
            time::now_secs(),
        );
        if !valid {
            warn!(user_id = self.user.id, "Rejected request with invalid nonce");
        }
        valid
    }
}

/// Bearer token first, then the session cookie
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Session middleware for protected routes; 401 without a live session
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = session_token(request.headers()).ok_or(AuthError::MissingSession)?;

    let user = users::session_user(&state.db, &token, state.settings.session_lifetime_secs)
        .await
        .map_err(|e| {
            error!("Session lookup failed: {}", e);
            AuthError::Internal(e.to_string())
        })?
        .ok_or(AuthError::InvalidSession)?;

    request.extensions_mut().insert(Session { user, token });
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub display_name: String,
    pub can_edit_pages: bool,
}

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AuthError> {
    let user = users::verify_credentials(&state.db, &req.username, &req.password)
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?
        .ok_or(AuthError::InvalidCredentials)?;

    let token = users::create_session(&state.db, user.id)
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?;

    info!(user_id = user.id, username = %user.username, "User logged in");

    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, state.settings.session_lifetime_secs
    );
    let mut response = Json(LoginResponse {
        token,
        username: user.username.clone(),
        display_name: user.display_name(),
        can_edit_pages: user.can_edit_pages,
    })
    .into_response();
    set_cookie(&mut response, &cookie)?;
    Ok(response)
}

/// POST /api/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Response, AuthError> {
    users::delete_session(&state.db, &session.token)
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?;

    info!(user_id = session.user.id, "User logged out");

    let mut response = Json(json!({ "status": "ok" })).into_response();
    set_cookie(
        &mut response,
        &format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE),
    )?;
    Ok(response)
}

fn set_cookie(response: &mut Response, cookie: &str) -> Result<(), AuthError> {
    let value = HeaderValue::from_str(cookie).map_err(|e| AuthError::Internal(e.to_string()))?;
    response.headers_mut().insert(header::SET_COOKIE, value);
    Ok(())
}

/// GET /api/nonce
pub async fn issue_nonce(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Json<serde_json::Value> {
    Json(json!({ "nonce": session.nonce(&state) }))
}

/// Authentication error types for HTTP responses
#[derive(Debug)]
pub enum AuthError {
    MissingSession,
    InvalidSession,
    InvalidCredentials,
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingSession => (StatusCode::UNAUTHORIZED, "Login required".to_string()),
            AuthError::InvalidSession => {
                (StatusCode::UNAUTHORIZED, "Session expired or unknown".to_string())
            }
            AuthError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid username or password".to_string())
            }
            AuthError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Authentication error: {}", msg),
            ),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
