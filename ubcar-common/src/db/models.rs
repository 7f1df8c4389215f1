//! Database models

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Kind of media a medium record points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Attachment id of an uploaded or gallery image
    Image,
    /// Provider track id (see `audio_type`)
    Audio,
    /// Provider video id (see `video_type`)
    Video,
    /// URL of an external web page
    External,
    /// URL of a wiki page to embed
    Wiki,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Audio => "audio",
            MediaType::Video => "video",
            MediaType::External => "external",
            MediaType::Wiki => "wiki",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "image" => Ok(MediaType::Image),
            "audio" => Ok(MediaType::Audio),
            "video" => Ok(MediaType::Video),
            "external" => Ok(MediaType::External),
            "wiki" => Ok(MediaType::Wiki),
            other => Err(Error::InvalidInput(format!("Unknown media type: {}", other))),
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single uploaded or linked media item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medium {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub media_type: MediaType,
    pub audio_type: Option<String>,
    pub video_type: Option<String>,
    /// Attachment id, provider id, or URL depending on `media_type`
    pub url: String,
    pub location_id: Option<i64>,
    /// Ordered, duplicate-free
    pub layer_ids: Vec<i64>,
    pub hidden: bool,
    pub author_id: i64,
    pub created_at: String,
}

/// Fields supplied when creating a medium
#[derive(Debug, Clone, PartialEq)]
pub struct NewMedium {
    pub title: String,
    pub description: String,
    pub media_type: MediaType,
    pub audio_type: Option<String>,
    pub video_type: Option<String>,
    pub url: String,
    pub location_id: Option<i64>,
    pub layer_ids: Vec<i64>,
    pub hidden: bool,
    pub author_id: i64,
}

/// Fields an edit may change
#[derive(Debug, Clone, PartialEq)]
pub struct MediumUpdate {
    pub title: String,
    pub description: String,
    pub location_id: Option<i64>,
    pub layer_ids: Vec<i64>,
    pub hidden: bool,
}

/// Geographic or conceptual location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Point {
    pub id: i64,
    pub title: String,
}

/// Grouping of points and media, optionally password protected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Layer {
    pub id: i64,
    pub title: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl Layer {
    /// Empty or the literal `"false"` means unprotected
    pub fn is_protected(&self) -> bool {
        !(self.password.is_empty() || self.password == "false")
    }
}

/// Admin account
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub password_salt: String,
    /// Elevated capability: manage everyone's media, wiki pages, protected layers
    pub can_edit_pages: bool,
}

impl User {
    /// `"First Last (username)"`
    pub fn display_name(&self) -> String {
        format!("{} {} ({})", self.first_name, self.last_name, self.username)
    }
}

/// Stored upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attachment {
    pub id: i64,
    pub title: String,
    pub file_name: String,
    pub mime_type: String,
    pub thumb_file_name: Option<String>,
    pub created_at: String,
}

/// Drop duplicates while keeping first-seen order
pub fn normalize_layer_ids(layer_ids: &[i64]) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    layer_ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect()
}
