//! Media admin actions
//!
//! Listing actions return a page of [`MediumView`]s. Delete, edit and
//! edit-submit answer a bad nonce, a missing medium or a caller who is neither
//! the author nor an editor with a bare sentinel (`1` for delete, `0` for the
//! edit actions) and leave all data untouched.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use tracing::{error, info, warn};
use ubcar_common::db::catalog::{ensure_layers_assignable, list_points, visible_layers};
use ubcar_common::db::media::{self, can_modify, MediaQuery};
use ubcar_common::db::models::{normalize_layer_ids, Medium, MediumUpdate, User};
use ubcar_common::Error;

use crate::api::auth::Session;
use crate::pagination::{backward_offset, forward_offset, PAGE_SIZE};
use crate::views::{render_media, render_medium, EditView, EntityRef};
use crate::AppState;

const DELETE_FAILED: u8 = 1;
const EDIT_FAILED: u8 = 0;

fn sentinel(value: u8) -> Response {
    Json(value).into_response()
}

/// Author filter applied to a listing
///
/// Editors see everyone's media unless they name an author; everyone else
/// only ever sees their own.
pub fn listing_author(user: &User, author_name: &str) -> Option<String> {
    if !user.can_edit_pages {
        return Some(user.username.clone());
    }
    let author_name = author_name.trim();
    if author_name.is_empty() {
        None
    } else {
        Some(author_name.to_string())
    }
}

async fn list_page(
    state: &AppState,
    user: &User,
    offset: i64,
    author_name: &str,
) -> Result<Response, MediaError> {
    let query = MediaQuery {
        offset,
        limit: PAGE_SIZE,
        author: listing_author(user, author_name),
    };
    let media = media::list_media(&state.db, &query).await?;
    let views = render_media(&state.db, &media).await?;
    Ok(Json(views).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ListRequest {
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub author_name: String,
}

/// POST /api/media/initial
pub async fn media_initial(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<ListRequest>,
) -> Result<Response, MediaError> {
    list_page(&state, &session.user, 0, &req.author_name).await
}

/// POST /api/media/forward
pub async fn media_forward(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<ListRequest>,
) -> Result<Response, MediaError> {
    list_page(&state, &session.user, forward_offset(req.offset), &req.author_name).await
}

/// POST /api/media/backward
pub async fn media_backward(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<ListRequest>,
) -> Result<Response, MediaError> {
    list_page(&state, &session.user, backward_offset(req.offset), &req.author_name).await
}

/// Load a medium the caller may modify, or None
async fn modifiable_medium(
    state: &AppState,
    user: &User,
    id: i64,
) -> Result<Option<Medium>, MediaError> {
    let medium = match media::get_medium(&state.db, id).await? {
        Some(medium) => medium,
        None => {
            warn!(medium_id = id, user_id = user.id, "Action on unknown medium");
            return Ok(None);
        }
    };
    if !can_modify(user, &medium) {
        warn!(medium_id = id, user_id = user.id, "User may not modify medium");
        return Ok(None);
    }
    Ok(Some(medium))
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub id: i64,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub author_name: String,
}

/// POST /api/media/delete
///
/// Returns the first page of the listing, or `1` on rejection.
pub async fn media_delete(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<DeleteRequest>,
) -> Result<Response, MediaError> {
    if !session.nonce_is_valid(&state, &req.nonce) {
        return Ok(sentinel(DELETE_FAILED));
    }
    if modifiable_medium(&state, &session.user, req.id).await?.is_none() {
        return Ok(sentinel(DELETE_FAILED));
    }

    match media::delete_medium(&state.db, req.id).await {
        Ok(_) => {}
        Err(Error::NotFound(_)) => return Ok(sentinel(DELETE_FAILED)),
        Err(e) => return Err(e.into()),
    }
    info!(medium_id = req.id, user_id = session.user.id, "Medium deleted by user");

    list_page(&state, &session.user, 0, &req.author_name).await
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub id: i64,
    #[serde(default)]
    pub nonce: String,
}

/// POST /api/media/edit
///
/// Returns the medium with every selectable point and layer, or `0`.
pub async fn media_edit(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<EditRequest>,
) -> Result<Response, MediaError> {
    if !session.nonce_is_valid(&state, &req.nonce) {
        return Ok(sentinel(EDIT_FAILED));
    }
    let medium = match modifiable_medium(&state, &session.user, req.id).await? {
        Some(medium) => medium,
        None => return Ok(sentinel(EDIT_FAILED)),
    };

    let all_locations = list_points(&state.db).await?.iter().map(EntityRef::from).collect();
    let all_layers = visible_layers(&state.db, &session.user)
        .await?
        .iter()
        .map(EntityRef::from)
        .collect();

    let view = EditView {
        medium: render_medium(&state.db, &medium).await?,
        all_locations,
        all_layers,
    };
    Ok(Json(view).into_response())
}

/// Accept `true`/`false` or the form strings `"true"`, `"on"`, `"false"`, `"off"`
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Text(text) => matches!(text.as_str(), "true" | "on" | "1"),
    })
}

#[derive(Debug, Deserialize)]
pub struct EditSubmitRequest {
    pub id: i64,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Point id; 0 clears the location
    #[serde(default)]
    pub location: i64,
    #[serde(default)]
    pub layers: Vec<i64>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub hidden: bool,
}

/// POST /api/media/edit-submit
///
/// Returns the updated medium, or `0`.
pub async fn media_edit_submit(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<EditSubmitRequest>,
) -> Result<Response, MediaError> {
    if !session.nonce_is_valid(&state, &req.nonce) {
        return Ok(sentinel(EDIT_FAILED));
    }
    let old = match modifiable_medium(&state, &session.user, req.id).await? {
        Some(medium) => medium,
        None => return Ok(sentinel(EDIT_FAILED)),
    };

    let layer_ids = normalize_layer_ids(&req.layers);
    let added: Vec<i64> = layer_ids
        .iter()
        .copied()
        .filter(|id| !old.layer_ids.contains(id))
        .collect();
    match ensure_layers_assignable(&state.db, &session.user, &added).await {
        Ok(()) => {}
        Err(Error::Unauthorized(msg)) => {
            warn!(medium_id = req.id, user_id = session.user.id, "{}", msg);
            return Ok(sentinel(EDIT_FAILED));
        }
        Err(e) => return Err(e.into()),
    }

    let update = MediumUpdate {
        title: req.title,
        description: req.description,
        location_id: (req.location > 0).then_some(req.location),
        layer_ids,
        hidden: req.hidden,
    };

    let updated = match media::update_medium(&state.db, req.id, update).await {
        Ok(medium) => medium,
        Err(Error::InvalidInput(msg)) | Err(Error::NotFound(msg)) => {
            warn!(medium_id = req.id, "Edit rejected: {}", msg);
            return Ok(sentinel(EDIT_FAILED));
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(render_medium(&state.db, &updated).await?).into_response())
}

/// Media action error types for HTTP responses
#[derive(Debug)]
pub enum MediaError {
    Database(String),
}

impl From<Error> for MediaError {
    fn from(e: Error) -> Self {
        error!("Media action failed: {}", e);
        MediaError::Database(e.to_string())
    }
}

impl IntoResponse for MediaError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            MediaError::Database(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", msg),
            ),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
