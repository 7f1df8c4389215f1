//! Media repository
//!
//! Every mutation writes the medium row and its reverse-index edits in a
//! single transaction (see [`crate::db::index`]).

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use crate::db::index::{self, Placement};
use crate::db::models::{normalize_layer_ids, MediaType, Medium, MediumUpdate, NewMedium, User};
use crate::{time, Error, Result};

const MEDIUM_COLUMNS: &str = "id, title, description, media_type, audio_type, video_type, url, \
                              location_id, layer_ids, hidden, author_id, created_at";

/// Listing parameters
#[derive(Debug, Clone, Default)]
pub struct MediaQuery {
    pub offset: i64,
    pub limit: i64,
    /// Restrict to media uploaded by this username
    pub author: Option<String>,
}

fn medium_from_row(row: &SqliteRow) -> Result<Medium> {
    let media_type: String = row.try_get("media_type")?;
    let layer_ids: String = row.try_get("layer_ids")?;

    Ok(Medium {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        media_type: MediaType::parse(&media_type)?,
        audio_type: row.try_get("audio_type")?,
        video_type: row.try_get("video_type")?,
        url: row.try_get("url")?,
        location_id: row.try_get("location_id")?,
        layer_ids: serde_json::from_str(&layer_ids)?,
        hidden: row.try_get("hidden")?,
        author_id: row.try_get("author_id")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Author match or elevated capability
pub fn can_modify(user: &User, medium: &Medium) -> bool {
    user.id == medium.author_id || user.can_edit_pages
}

async fn point_exists(tx: &mut Transaction<'_, Sqlite>, point_id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM points WHERE id = ?")
        .bind(point_id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(found.is_some())
}

async fn layer_exists(tx: &mut Transaction<'_, Sqlite>, layer_id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM layers WHERE id = ?")
        .bind(layer_id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(found.is_some())
}

/// Reject placements that reference points or layers that do not exist
async fn ensure_targets_exist(
    tx: &mut Transaction<'_, Sqlite>,
    location_id: Option<i64>,
    layer_ids: &[i64],
) -> Result<()> {
    if let Some(point_id) = location_id {
        if !point_exists(tx, point_id).await? {
            return Err(Error::InvalidInput(format!("Unknown location: {}", point_id)));
        }
    }
    for &layer_id in layer_ids {
        if !layer_exists(tx, layer_id).await? {
            return Err(Error::InvalidInput(format!("Unknown layer: {}", layer_id)));
        }
    }
    Ok(())
}

/// Err(InvalidInput) if the location or any layer does not exist
///
/// Lets callers reject a placement before doing expensive work such as
/// storing an upload. [`create_medium`] repeats the check in its own
/// transaction.
pub async fn validate_targets(pool: &SqlitePool, location_id: Option<i64>, layer_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await?;
    ensure_targets_exist(&mut tx, location_id, layer_ids).await
}

/// The part of a medium's placement whose owners still exist
async fn live_placement(tx: &mut Transaction<'_, Sqlite>, medium: &Medium) -> Result<Placement> {
    let mut location_id = None;
    if let Some(point_id) = medium.location_id {
        if point_exists(tx, point_id).await? {
            location_id = Some(point_id);
        }
    }
    let mut layer_ids = Vec::with_capacity(medium.layer_ids.len());
    for &layer_id in &medium.layer_ids {
        if layer_exists(tx, layer_id).await? {
            layer_ids.push(layer_id);
        }
    }
    Ok(Placement { medium_id: medium.id, location_id, layer_ids })
}

async fn fetch_medium(tx: &mut Transaction<'_, Sqlite>, id: i64) -> Result<Medium> {
    let row = sqlx::query(&format!("SELECT {} FROM media WHERE id = ?", MEDIUM_COLUMNS))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Medium {}", id)))?;
    medium_from_row(&row)
}

/// Store a new medium and place it into its point and layers
pub async fn create_medium(pool: &SqlitePool, new: NewMedium) -> Result<Medium> {
    let layer_ids = normalize_layer_ids(&new.layer_ids);
    let created_at = time::now().to_rfc3339();

    let mut tx = pool.begin().await?;
    ensure_targets_exist(&mut tx, new.location_id, &layer_ids).await?;

    let id = sqlx::query(
        r#"
        INSERT INTO media (
            title, description, media_type, audio_type, video_type, url,
            location_id, layer_ids, hidden, author_id, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&new.title)
    .bind(&new.description)
    .bind(new.media_type.as_str())
    .bind(&new.audio_type)
    .bind(&new.video_type)
    .bind(&new.url)
    .bind(new.location_id)
    .bind(serde_json::to_string(&layer_ids)?)
    .bind(new.hidden)
    .bind(new.author_id)
    .bind(&created_at)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    let medium = Medium {
        id,
        title: new.title,
        description: new.description,
        media_type: new.media_type,
        audio_type: new.audio_type,
        video_type: new.video_type,
        url: new.url,
        location_id: new.location_id,
        layer_ids,
        hidden: new.hidden,
        author_id: new.author_id,
        created_at,
    };

    let plan = index::on_create(&Placement::from(&medium));
    index::apply_plan(&mut tx, &plan).await?;
    tx.commit().await?;

    info!(
        medium_id = medium.id,
        media_type = %medium.media_type,
        location_id = ?medium.location_id,
        layers = medium.layer_ids.len(),
        index_edits = plan.len(),
        "Created medium"
    );
    Ok(medium)
}

/// Apply an edit and migrate the medium's reverse-index entries
pub async fn update_medium(pool: &SqlitePool, id: i64, update: MediumUpdate) -> Result<Medium> {
    let layer_ids = normalize_layer_ids(&update.layer_ids);

    let mut tx = pool.begin().await?;
    let old = fetch_medium(&mut tx, id).await?;

    // Retained references may dangle after their point or layer was deleted
    let changed_location = if update.location_id != old.location_id {
        update.location_id
    } else {
        None
    };
    let added_layers: Vec<i64> = layer_ids
        .iter()
        .copied()
        .filter(|layer_id| !old.layer_ids.contains(layer_id))
        .collect();
    ensure_targets_exist(&mut tx, changed_location, &added_layers).await?;

    sqlx::query(
        r#"
        UPDATE media
        SET title = ?, description = ?, location_id = ?, layer_ids = ?, hidden = ?
        WHERE id = ?
        "#,
    )
    .bind(&update.title)
    .bind(&update.description)
    .bind(update.location_id)
    .bind(serde_json::to_string(&layer_ids)?)
    .bind(update.hidden)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    let new = Medium {
        title: update.title,
        description: update.description,
        location_id: update.location_id,
        layer_ids,
        hidden: update.hidden,
        ..old.clone()
    };

    let old_live = live_placement(&mut tx, &old).await?;
    let new_live = live_placement(&mut tx, &new).await?;
    let plan = index::on_update(&old_live, &new_live);
    index::apply_plan(&mut tx, &plan).await?;
    tx.commit().await?;

    info!(
        medium_id = id,
        old_location = ?old.location_id,
        new_location = ?new.location_id,
        index_edits = plan.len(),
        "Updated medium"
    );
    Ok(new)
}

/// Remove a medium and every reverse-index entry pointing at it
pub async fn delete_medium(pool: &SqlitePool, id: i64) -> Result<Medium> {
    let mut tx = pool.begin().await?;
    let old = fetch_medium(&mut tx, id).await?;

    let plan = index::on_delete(&Placement::from(&old));
    index::apply_plan(&mut tx, &plan).await?;

    sqlx::query("DELETE FROM media WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(medium_id = id, index_edits = plan.len(), "Deleted medium");
    Ok(old)
}

pub async fn get_medium(pool: &SqlitePool, id: i64) -> Result<Option<Medium>> {
    let row = sqlx::query(&format!("SELECT {} FROM media WHERE id = ?", MEDIUM_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(medium_from_row).transpose()
}

/// Newest first, optionally restricted to one author
pub async fn list_media(pool: &SqlitePool, query: &MediaQuery) -> Result<Vec<Medium>> {
    debug!(offset = query.offset, limit = query.limit, author = ?query.author, "Listing media");

    let rows = match &query.author {
        Some(author) => {
            sqlx::query(&format!(
                r#"
                SELECT {} FROM media
                WHERE author_id = (SELECT id FROM users WHERE username = ?)
                ORDER BY id DESC LIMIT ? OFFSET ?
                "#,
                MEDIUM_COLUMNS
            ))
            .bind(author)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(&format!(
                "SELECT {} FROM media ORDER BY id DESC LIMIT ? OFFSET ?",
                MEDIUM_COLUMNS
            ))
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(pool)
            .await?
        }
    };

    rows.iter().map(medium_from_row).collect()
}

/// Placements of every medium, oldest first
pub async fn load_placements(pool: &SqlitePool) -> Result<Vec<Placement>> {
    let rows: Vec<(i64, Option<i64>, String)> =
        sqlx::query_as("SELECT id, location_id, layer_ids FROM media ORDER BY id")
            .fetch_all(pool)
            .await?;

    rows.into_iter()
        .map(|(medium_id, location_id, layer_ids)| {
            Ok(Placement {
                medium_id,
                location_id,
                layer_ids: serde_json::from_str(&layer_ids)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, can_edit_pages: bool) -> User {
        User {
            id,
            username: format!("user{}", id),
            first_name: String::new(),
            last_name: String::new(),
            password_hash: String::new(),
            password_salt: String::new(),
            can_edit_pages,
        }
    }

    fn medium(author_id: i64) -> Medium {
        Medium {
            id: 1,
            title: "t".into(),
            description: String::new(),
            media_type: MediaType::External,
            audio_type: None,
            video_type: None,
            url: "http://example.org".into(),
            location_id: None,
            layer_ids: vec![],
            hidden: false,
            author_id,
            created_at: String::new(),
        }
    }

    #[test]
    fn test_author_can_modify() {
        assert!(can_modify(&user(4, false), &medium(4)));
    }

    #[test]
    fn test_other_contributor_cannot_modify() {
        assert!(!can_modify(&user(5, false), &medium(4)));
    }

    #[test]
    fn test_editor_can_modify_anything() {
        assert!(can_modify(&user(5, true), &medium(4)));
    }
}
