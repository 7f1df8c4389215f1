//! Points, layers and attachments
//!
//! Deleting a point or layer cascades to its reverse-index rows; media that
//! still reference it render with placeholder values.

use sqlx::SqlitePool;
use tracing::info;

use crate::db::models::{Attachment, Layer, Point, User};
use crate::{time, Error, Result};

// ========================================
// Points
// ========================================

pub async fn create_point(pool: &SqlitePool, title: &str) -> Result<Point> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::InvalidInput("Point title must not be empty".to_string()));
    }
    let id = sqlx::query("INSERT INTO points (title) VALUES (?)")
        .bind(title)
        .execute(pool)
        .await?
        .last_insert_rowid();

    info!(point_id = id, "Created point");
    Ok(Point { id, title: title.to_string() })
}

pub async fn get_point(pool: &SqlitePool, id: i64) -> Result<Option<Point>> {
    let point = sqlx::query_as("SELECT id, title FROM points WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(point)
}

/// All points, ascending id
pub async fn list_points(pool: &SqlitePool) -> Result<Vec<Point>> {
    let points = sqlx::query_as("SELECT id, title FROM points ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(points)
}

/// Returns false when no such point existed
pub async fn delete_point(pool: &SqlitePool, id: i64) -> Result<bool> {
    let deleted = sqlx::query("DELETE FROM points WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
    if deleted > 0 {
        info!(point_id = id, "Deleted point");
    }
    Ok(deleted > 0)
}

// ========================================
// Layers
// ========================================

pub async fn create_layer(pool: &SqlitePool, title: &str, password: Option<&str>) -> Result<Layer> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::InvalidInput("Layer title must not be empty".to_string()));
    }
    let password = password.unwrap_or("").to_string();
    let id = sqlx::query("INSERT INTO layers (title, password) VALUES (?, ?)")
        .bind(title)
        .bind(&password)
        .execute(pool)
        .await?
        .last_insert_rowid();

    info!(layer_id = id, protected = !password.is_empty(), "Created layer");
    Ok(Layer { id, title: title.to_string(), password })
}

pub async fn get_layer(pool: &SqlitePool, id: i64) -> Result<Option<Layer>> {
    let layer = sqlx::query_as("SELECT id, title, password FROM layers WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(layer)
}

/// All layers, ascending id
pub async fn list_layers(pool: &SqlitePool) -> Result<Vec<Layer>> {
    let layers = sqlx::query_as("SELECT id, title, password FROM layers ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(layers)
}

/// Layers this user may place media into; protected layers need `can_edit_pages`
pub async fn visible_layers(pool: &SqlitePool, user: &User) -> Result<Vec<Layer>> {
    let layers = list_layers(pool).await?;
    Ok(layers
        .into_iter()
        .filter(|layer| user.can_edit_pages || !layer.is_protected())
        .collect())
}

/// Err(Unauthorized) if any of `layer_ids` is protected and the user lacks the capability
pub async fn ensure_layers_assignable(pool: &SqlitePool, user: &User, layer_ids: &[i64]) -> Result<()> {
    if user.can_edit_pages {
        return Ok(());
    }
    for &layer_id in layer_ids {
        if let Some(layer) = get_layer(pool, layer_id).await? {
            if layer.is_protected() {
                return Err(Error::Unauthorized(format!(
                    "Layer {} is protected",
                    layer_id
                )));
            }
        }
    }
    Ok(())
}

pub async fn delete_layer(pool: &SqlitePool, id: i64) -> Result<bool> {
    let deleted = sqlx::query("DELETE FROM layers WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
    if deleted > 0 {
        info!(layer_id = id, "Deleted layer");
    }
    Ok(deleted > 0)
}

// ========================================
// Attachments
// ========================================

pub async fn create_attachment(
    pool: &SqlitePool,
    title: &str,
    file_name: &str,
    mime_type: &str,
    thumb_file_name: Option<&str>,
) -> Result<Attachment> {
    let created_at = time::now().to_rfc3339();
    let id = sqlx::query(
        r#"
        INSERT INTO attachments (title, file_name, mime_type, thumb_file_name, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(title)
    .bind(file_name)
    .bind(mime_type)
    .bind(thumb_file_name)
    .bind(&created_at)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(Attachment {
        id,
        title: title.to_string(),
        file_name: file_name.to_string(),
        mime_type: mime_type.to_string(),
        thumb_file_name: thumb_file_name.map(str::to_string),
        created_at,
    })
}

/// Returns false when no such attachment existed
pub async fn delete_attachment(pool: &SqlitePool, id: i64) -> Result<bool> {
    let deleted = sqlx::query("DELETE FROM attachments WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(deleted > 0)
}

pub async fn get_attachment(pool: &SqlitePool, id: i64) -> Result<Option<Attachment>> {
    let attachment = sqlx::query_as(
        "SELECT id, title, file_name, mime_type, thumb_file_name, created_at FROM attachments WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(attachment)
}
