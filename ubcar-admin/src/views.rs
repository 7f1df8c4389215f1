//! JSON rendering of media for the admin page

use serde::Serialize;
use sqlx::SqlitePool;
use ubcar_common::db::catalog::{get_attachment, get_layer, get_point};
use ubcar_common::db::models::{Layer, MediaType, Medium, Point};
use ubcar_common::db::users::get_user;
use ubcar_common::time::format_date;
use ubcar_common::Result;

use crate::uploads::upload_url;

pub const DELETED_LOCATION: &str = "Deleted location";
pub const DELETED_USER: &str = "Deleted user";

/// Entity id, or `"?"` for a reference that no longer resolves
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityId {
    Id(i64),
    Unknown(&'static str),
}

/// `{ "ID": .., "title": .. }` reference to a point or layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRef {
    #[serde(rename = "ID")]
    pub id: EntityId,
    pub title: String,
}

impl EntityRef {
    pub fn deleted_location() -> Self {
        Self {
            id: EntityId::Unknown("?"),
            title: DELETED_LOCATION.to_string(),
        }
    }
}

impl From<&Point> for EntityRef {
    fn from(point: &Point) -> Self {
        Self { id: EntityId::Id(point.id), title: point.title.clone() }
    }
}

impl From<&Layer> for EntityRef {
    fn from(layer: &Layer) -> Self {
        Self { id: EntityId::Id(layer.id), title: layer.title.clone() }
    }
}

/// One row of the media table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediumView {
    #[serde(rename = "ID")]
    pub id: i64,
    /// Thumbnail for images, otherwise the stored provider id or URL
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_size_url: Option<String>,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub uploader: String,
    pub title: String,
    pub date: String,
    pub description: String,
    pub location: EntityRef,
    pub layers: Vec<EntityRef>,
    /// `"on"` or `"off"`
    pub hidden: &'static str,
}

/// Edit form payload: the medium plus every selectable point and layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditView {
    #[serde(flatten)]
    pub medium: MediumView,
    pub all_locations: Vec<EntityRef>,
    pub all_layers: Vec<EntityRef>,
}

pub fn hidden_flag(hidden: bool) -> &'static str {
    if hidden {
        "on"
    } else {
        "off"
    }
}

/// Resolve references and render one medium
pub async fn render_medium(db: &SqlitePool, medium: &Medium) -> Result<MediumView> {
    let (url, full_size_url) = match medium.media_type {
        MediaType::Image => image_urls(db, &medium.url).await?,
        _ => (medium.url.clone(), None),
    };

    let uploader = get_user(db, medium.author_id)
        .await?
        .map(|user| user.display_name())
        .unwrap_or_else(|| DELETED_USER.to_string());

    let location = match medium.location_id {
        Some(point_id) => get_point(db, point_id).await?,
        None => None,
    }
    .map(|point| EntityRef::from(&point))
    .unwrap_or_else(EntityRef::deleted_location);

    let mut layers = Vec::with_capacity(medium.layer_ids.len());
    for &layer_id in &medium.layer_ids {
        if let Some(layer) = get_layer(db, layer_id).await? {
            layers.push(EntityRef::from(&layer));
        }
    }

    Ok(MediumView {
        id: medium.id,
        url,
        full_size_url,
        media_type: medium.media_type,
        uploader,
        title: medium.title.clone(),
        date: format_date(&medium.created_at),
        description: medium.description.clone(),
        location,
        layers,
        hidden: hidden_flag(medium.hidden),
    })
}

/// Thumbnail and original URLs of an image attachment
async fn image_urls(db: &SqlitePool, attachment_ref: &str) -> Result<(String, Option<String>)> {
    let attachment = match attachment_ref.trim().parse::<i64>() {
        Ok(id) => get_attachment(db, id).await?,
        Err(_) => None,
    };

    Ok(match attachment {
        Some(attachment) => {
            let full = upload_url(&attachment.file_name);
            let thumb = attachment
                .thumb_file_name
                .as_deref()
                .map(upload_url)
                .unwrap_or_else(|| full.clone());
            (thumb, Some(full))
        }
        None => (String::new(), None),
    })
}

pub async fn render_media(db: &SqlitePool, media: &[Medium]) -> Result<Vec<MediumView>> {
    let mut views = Vec::with_capacity(media.len());
    for medium in media {
        views.push(render_medium(db, medium).await?);
    }
    Ok(views)
}
