//! Multipart medium creation (POST /media)
//!
//! Redirect-after-post: success sends the browser through the redirect page
//! back to the admin page, any rejected input sends it to `/?load=failure`.
//! A bad nonce is refused with 403 before anything is written.

use std::collections::HashMap;

use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;
use tracing::{error, info, warn};
use ubcar_common::db::catalog::{
    create_attachment, delete_attachment, ensure_layers_assignable, get_attachment,
};
use ubcar_common::db::media::{create_medium as insert_medium, validate_targets};
use ubcar_common::db::models::{Attachment, MediaType, NewMedium};
use ubcar_common::Error;

use crate::api::auth::Session;
use crate::uploads::{remove_stored, store_image, UploadError};
use crate::AppState;

pub const SUCCESS_LOCATION: &str = "/redirect?return=/";
pub const FAILURE_LOCATION: &str = "/?load=failure";

/// Description stored for wiki links
const WIKI_DESCRIPTION: &str = "n/a";

/// Fields read from the submitted form
#[derive(Debug, Default)]
pub struct CreateForm {
    fields: HashMap<String, String>,
    pub layers: Vec<i64>,
    pub upload: Option<Vec<u8>>,
}

impl CreateForm {
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.fields.insert(name.to_string(), value.into());
    }

    fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }
}

async fn read_form(mut multipart: Multipart) -> Result<CreateForm, CreateError> {
    let mut form = CreateForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CreateError::Invalid(format!("Malformed form: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "media_upload" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| CreateError::Invalid(format!("Upload failed: {}", e)))?;
                if !bytes.is_empty() {
                    form.upload = Some(bytes.to_vec());
                }
            }
            "layers" | "layers[]" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| CreateError::Invalid(e.to_string()))?;
                let layer_id = text
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| CreateError::Invalid(format!("Invalid layer id: {}", text)))?;
                form.layers.push(layer_id);
            }
            _ => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| CreateError::Invalid(e.to_string()))?;
                form.set(&name, text);
            }
        }
    }
    Ok(form)
}

/// Provider id from a video URL: the text after the last `=`, or all of it
///
/// # Examples
/// ```
/// use ubcar_admin::api::create::video_id;
///
/// assert_eq!(video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), "dQw4w9WgXcQ");
/// assert_eq!(video_id("dQw4w9WgXcQ"), "dQw4w9WgXcQ");
/// ```
pub fn video_id(url: &str) -> String {
    let url = url.trim();
    match url.rfind('=') {
        Some(pos) => url[pos + 1..].to_string(),
        None => url.to_string(),
    }
}

/// True when the text starts with `scheme:` (and not `host:port`)
fn has_scheme(url: &str) -> bool {
    let Some((scheme, rest)) = url.split_once(':') else {
        return false;
    };
    let valid_scheme = scheme
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    let looks_like_port = rest.chars().next().is_some_and(|c| c.is_ascii_digit());
    valid_scheme && !looks_like_port
}

/// Prepend `http://` to links typed without a scheme
pub fn normalize_link(url: &str) -> String {
    let url = url.trim();
    if has_scheme(url) {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

/// `0`, empty or unparsable means no location
pub fn parse_location(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok().filter(|id| *id > 0)
}

/// Translate the form into a new medium, storing the upload if there is one
///
/// The attachment created for an upload is returned so it can be discarded
/// if the medium is not stored.
async fn build_medium(
    state: &AppState,
    session: &Session,
    form: CreateForm,
) -> Result<(NewMedium, Option<Attachment>), CreateError> {
    let requested = form.field("media_type");
    let mut description = form.field("description").to_string();
    let mut audio_type = None;
    let mut video_type = None;
    let mut uploaded = None;

    let (media_type, url) = match requested {
        "image" => {
            let bytes = form.upload.clone().ok_or(UploadError::Empty)?;
            let dir = state.uploads_dir.clone();
            let stored = tokio::task::spawn_blocking(move || store_image(&dir, &bytes))
                .await
                .map_err(|e| CreateError::Internal(e.to_string()))??;
            let attachment = match create_attachment(
                &state.db,
                form.field("title"),
                &stored.file_name,
                &stored.mime_type,
                stored.thumb_file_name.as_deref(),
            )
            .await
            {
                Ok(attachment) => attachment,
                Err(e) => {
                    remove_stored(&state.uploads_dir, &stored.file_name, stored.thumb_file_name.as_deref());
                    return Err(e.into());
                }
            };
            let url = attachment.id.to_string();
            uploaded = Some(attachment);
            (MediaType::Image, url)
        }
        "imagewp" => {
            let attachment_id = form
                .field("wp_image_id")
                .trim()
                .parse::<i64>()
                .map_err(|_| CreateError::Invalid("Invalid attachment id".to_string()))?;
            if get_attachment(&state.db, attachment_id).await?.is_none() {
                return Err(CreateError::Invalid(format!("Unknown attachment: {}", attachment_id)));
            }
            (MediaType::Image, attachment_id.to_string())
        }
        "audio" => {
            audio_type = Some(form.field("audio_type").to_string());
            (MediaType::Audio, form.field("audio_url").trim().to_string())
        }
        "video" => {
            video_type = Some(form.field("video_type").to_string());
            (MediaType::Video, video_id(form.field("video_url")))
        }
        "external" => (MediaType::External, normalize_link(form.field("external_url"))),
        "wiki" => {
            if !session.user.can_edit_pages {
                return Err(CreateError::Denied("Wiki media require editor rights".to_string()));
            }
            description = WIKI_DESCRIPTION.to_string();
            (MediaType::Wiki, normalize_link(form.field("wiki_url")))
        }
        other => return Err(CreateError::Invalid(format!("Unknown media type: {}", other))),
    };

    let new = NewMedium {
        title: form.field("title").to_string(),
        description,
        media_type,
        audio_type,
        video_type,
        url,
        location_id: parse_location(form.field("location")),
        layer_ids: form.layers.clone(),
        hidden: form.has("visibility"),
        author_id: session.user.id,
    };
    Ok((new, uploaded))
}

/// Remove the stored files and attachment row of a rejected upload
async fn discard_upload(state: &AppState, attachment: &Attachment) {
    if let Err(e) = delete_attachment(&state.db, attachment.id).await {
        error!(attachment_id = attachment.id, "Failed to delete attachment: {}", e);
    }
    remove_stored(
        &state.uploads_dir,
        &attachment.file_name,
        attachment.thumb_file_name.as_deref(),
    );
}

/// POST /media
pub async fn create_medium(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    multipart: Multipart,
) -> Response {
    match try_create(&state, &session, multipart).await {
        Ok(()) => see_other(SUCCESS_LOCATION),
        Err(CreateError::Forbidden) => CreateError::Forbidden.into_response(),
        Err(CreateError::Internal(msg)) => CreateError::Internal(msg).into_response(),
        Err(e) => {
            warn!(user_id = session.user.id, "Medium creation rejected: {}", e);
            see_other(FAILURE_LOCATION)
        }
    }
}

async fn try_create(state: &AppState, session: &Session, multipart: Multipart) -> Result<(), CreateError> {
    let form = read_form(multipart).await?;
    if !session.nonce_is_valid(state, form.field("nonce")) {
        return Err(CreateError::Forbidden);
    }

    // Placement checks run before any upload is written
    ensure_layers_assignable(&state.db, &session.user, &form.layers).await?;
    validate_targets(&state.db, parse_location(form.field("location")), &form.layers).await?;

    let (new, uploaded) = build_medium(state, session, form).await?;
    let medium = match insert_medium(&state.db, new).await {
        Ok(medium) => medium,
        Err(e) => {
            if let Some(attachment) = &uploaded {
                discard_upload(state, attachment).await;
            }
            return Err(e.into());
        }
    };

    info!(
        medium_id = medium.id,
        user_id = session.user.id,
        media_type = %medium.media_type,
        "Medium created from form"
    );
    Ok(())
}

fn see_other(location: &str) -> Response {
    (StatusCode::SEE_OTHER, [(header::LOCATION, location.to_string())]).into_response()
}

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("Invalid nonce")]
    Forbidden,

    #[error("{0}")]
    Denied(String),

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<Error> for CreateError {
    fn from(e: Error) -> Self {
        match e {
            Error::Unauthorized(msg) => CreateError::Denied(msg),
            Error::InvalidInput(msg) | Error::NotFound(msg) => CreateError::Invalid(msg),
            other => {
                error!("Medium creation failed: {}", other);
                CreateError::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for CreateError {
    fn into_response(self) -> Response {
        let status = match self {
            CreateError::Forbidden => StatusCode::FORBIDDEN,
            CreateError::Denied(_) => StatusCode::FORBIDDEN,
            CreateError::Invalid(_) | CreateError::Upload(_) => StatusCode::BAD_REQUEST,
            CreateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
