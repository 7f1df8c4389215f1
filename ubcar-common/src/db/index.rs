//! Reverse-index maintenance for media placement
//!
//! Three denormalized indexes make "what is in this layer" and "what is at
//! this point" cheap to answer:
//!
//! - `point_media`: point -> media located there
//! - `layer_media`: layer -> media placed in it
//! - `layer_points`: layer -> one `(medium, point)` tuple per medium in it
//!
//! Every change to a medium's placement goes through a two step protocol:
//! [`on_create`] / [`on_update`] / [`on_delete`] compute an [`IndexPlan`]
//! without touching storage, then [`apply_plan`] runs the edits inside the
//! caller's transaction, next to the write of the medium row itself. Either
//! the medium and all of its index edits commit, or none of them do.
//!
//! All edits are idempotent: adding an entry that is already present or
//! removing one that is absent is a no-op.

use std::collections::BTreeSet;

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;

use crate::db::models::Medium;
use crate::Result;

/// The parts of a medium the reverse indexes depend on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub medium_id: i64,
    pub location_id: Option<i64>,
    pub layer_ids: Vec<i64>,
}

impl From<&Medium> for Placement {
    fn from(medium: &Medium) -> Self {
        Self {
            medium_id: medium.id,
            location_id: medium.location_id,
            layer_ids: medium.layer_ids.clone(),
        }
    }
}

/// A single change to one reverse index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexEdit {
    AddPointMedium { point_id: i64, medium_id: i64 },
    RemovePointMedium { point_id: i64, medium_id: i64 },
    AddLayerMedium { layer_id: i64, medium_id: i64 },
    RemoveLayerMedium { layer_id: i64, medium_id: i64 },
    AddLayerPoint { layer_id: i64, medium_id: i64, point_id: i64 },
    RemoveLayerPoint { layer_id: i64, medium_id: i64 },
    /// Rewrite the medium's tuple in place, keeping its position in the list
    MoveLayerPoint { layer_id: i64, medium_id: i64, point_id: i64 },
}

/// Ordered list of index edits for one medium operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexPlan {
    edits: Vec<IndexEdit>,
}

impl IndexPlan {
    pub fn edits(&self) -> &[IndexEdit] {
        &self.edits
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    fn push(&mut self, edit: IndexEdit) {
        self.edits.push(edit);
    }
}

/// Edits that place a new medium into its point and layers
pub fn on_create(placement: &Placement) -> IndexPlan {
    let mut plan = IndexPlan::default();
    let medium_id = placement.medium_id;

    for &layer_id in &placement.layer_ids {
        plan.push(IndexEdit::AddLayerMedium { layer_id, medium_id });
        if let Some(point_id) = placement.location_id {
            plan.push(IndexEdit::AddLayerPoint { layer_id, medium_id, point_id });
        }
    }
    if let Some(point_id) = placement.location_id {
        plan.push(IndexEdit::AddPointMedium { point_id, medium_id });
    }
    plan
}

/// Edits that remove a medium from every index it appears in
pub fn on_delete(placement: &Placement) -> IndexPlan {
    let mut plan = IndexPlan::default();
    let medium_id = placement.medium_id;

    if let Some(point_id) = placement.location_id {
        plan.push(IndexEdit::RemovePointMedium { point_id, medium_id });
    }
    for &layer_id in &placement.layer_ids {
        plan.push(IndexEdit::RemoveLayerMedium { layer_id, medium_id });
        plan.push(IndexEdit::RemoveLayerPoint { layer_id, medium_id });
    }
    plan
}

/// Edits that migrate a medium from its old placement to its new one
///
/// Layers present in both placements keep their `layer_media` entry; their
/// `layer_points` tuple is rewritten in place when the location changes.
pub fn on_update(old: &Placement, new: &Placement) -> IndexPlan {
    debug_assert_eq!(old.medium_id, new.medium_id);

    let mut plan = IndexPlan::default();
    let medium_id = old.medium_id;
    let old_layers: BTreeSet<i64> = old.layer_ids.iter().copied().collect();
    let new_layers: BTreeSet<i64> = new.layer_ids.iter().copied().collect();

    // Added layers
    for &layer_id in new.layer_ids.iter().filter(|id| !old_layers.contains(id)) {
        plan.push(IndexEdit::AddLayerMedium { layer_id, medium_id });
        if let Some(point_id) = new.location_id {
            plan.push(IndexEdit::AddLayerPoint { layer_id, medium_id, point_id });
        }
    }

    // Removed layers
    for &layer_id in old.layer_ids.iter().filter(|id| !new_layers.contains(id)) {
        plan.push(IndexEdit::RemoveLayerMedium { layer_id, medium_id });
        plan.push(IndexEdit::RemoveLayerPoint { layer_id, medium_id });
    }

    if old.location_id != new.location_id {
        if let Some(point_id) = new.location_id {
            plan.push(IndexEdit::AddPointMedium { point_id, medium_id });
        }
        if let Some(point_id) = old.location_id {
            plan.push(IndexEdit::RemovePointMedium { point_id, medium_id });
        }

        for &layer_id in new.layer_ids.iter().filter(|id| old_layers.contains(id)) {
            match new.location_id {
                Some(point_id) => {
                    plan.push(IndexEdit::MoveLayerPoint { layer_id, medium_id, point_id })
                }
                None => plan.push(IndexEdit::RemoveLayerPoint { layer_id, medium_id }),
            }
        }
    }

    plan
}

/// Apply a plan inside the caller's transaction
pub async fn apply_plan(tx: &mut Transaction<'_, Sqlite>, plan: &IndexPlan) -> Result<()> {
    for edit in plan.edits() {
        debug!(edit = ?edit, "Applying index edit");
        apply_edit(tx, edit).await?;
    }
    Ok(())
}

async fn apply_edit(tx: &mut Transaction<'_, Sqlite>, edit: &IndexEdit) -> Result<()> {
    match *edit {
        IndexEdit::AddPointMedium { point_id, medium_id } => {
            sqlx::query("INSERT OR IGNORE INTO point_media (point_id, medium_id) VALUES (?, ?)")
                .bind(point_id)
                .bind(medium_id)
                .execute(&mut **tx)
                .await?;
        }
        IndexEdit::RemovePointMedium { point_id, medium_id } => {
            sqlx::query("DELETE FROM point_media WHERE point_id = ? AND medium_id = ?")
                .bind(point_id)
                .bind(medium_id)
                .execute(&mut **tx)
                .await?;
        }
        IndexEdit::AddLayerMedium { layer_id, medium_id } => {
            sqlx::query("INSERT OR IGNORE INTO layer_media (layer_id, medium_id) VALUES (?, ?)")
                .bind(layer_id)
                .bind(medium_id)
                .execute(&mut **tx)
                .await?;
        }
        IndexEdit::RemoveLayerMedium { layer_id, medium_id } => {
            sqlx::query("DELETE FROM layer_media WHERE layer_id = ? AND medium_id = ?")
                .bind(layer_id)
                .bind(medium_id)
                .execute(&mut **tx)
                .await?;
        }
        IndexEdit::AddLayerPoint { layer_id, medium_id, point_id } => {
            sqlx::query(
                "INSERT OR IGNORE INTO layer_points (layer_id, medium_id, point_id) VALUES (?, ?, ?)",
            )
            .bind(layer_id)
            .bind(medium_id)
            .bind(point_id)
            .execute(&mut **tx)
            .await?;
        }
        IndexEdit::RemoveLayerPoint { layer_id, medium_id } => {
            sqlx::query("DELETE FROM layer_points WHERE layer_id = ? AND medium_id = ?")
                .bind(layer_id)
                .bind(medium_id)
                .execute(&mut **tx)
                .await?;
        }
        IndexEdit::MoveLayerPoint { layer_id, medium_id, point_id } => {
            // Upsert: an existing row is updated in place and keeps its rowid
            sqlx::query(
                r#"
                INSERT INTO layer_points (layer_id, medium_id, point_id) VALUES (?, ?, ?)
                ON CONFLICT (layer_id, medium_id) DO UPDATE SET point_id = excluded.point_id
                "#,
            )
            .bind(layer_id)
            .bind(medium_id)
            .bind(point_id)
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

// ========================================
// Lookups
// ========================================

/// Media located at a point, in the order they were added
pub async fn point_media(pool: &SqlitePool, point_id: i64) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar("SELECT medium_id FROM point_media WHERE point_id = ? ORDER BY rowid")
        .bind(point_id)
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

/// Media placed in a layer, in the order they were added
pub async fn layer_media(pool: &SqlitePool, layer_id: i64) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar("SELECT medium_id FROM layer_media WHERE layer_id = ? ORDER BY rowid")
        .bind(layer_id)
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

/// `(medium_id, point_id)` tuples of a layer, in the order they were added
pub async fn layer_points(pool: &SqlitePool, layer_id: i64) -> Result<Vec<(i64, i64)>> {
    let tuples = sqlx::query_as(
        "SELECT medium_id, point_id FROM layer_points WHERE layer_id = ? ORDER BY rowid",
    )
    .bind(layer_id)
    .fetch_all(pool)
    .await?;
    Ok(tuples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(medium_id: i64, location_id: Option<i64>, layer_ids: &[i64]) -> Placement {
        Placement {
            medium_id,
            location_id,
            layer_ids: layer_ids.to_vec(),
        }
    }

    #[test]
    fn test_on_create_places_into_point_and_layers() {
        let plan = on_create(&placement(7, Some(5), &[10, 11]));
        assert_eq!(
            plan.edits(),
            &[
                IndexEdit::AddLayerMedium { layer_id: 10, medium_id: 7 },
                IndexEdit::AddLayerPoint { layer_id: 10, medium_id: 7, point_id: 5 },
                IndexEdit::AddLayerMedium { layer_id: 11, medium_id: 7 },
                IndexEdit::AddLayerPoint { layer_id: 11, medium_id: 7, point_id: 5 },
                IndexEdit::AddPointMedium { point_id: 5, medium_id: 7 },
            ]
        );
    }

    #[test]
    fn test_on_create_without_location_skips_point_entries() {
        let plan = on_create(&placement(7, None, &[10]));
        assert_eq!(plan.edits(), &[IndexEdit::AddLayerMedium { layer_id: 10, medium_id: 7 }]);
    }

    #[test]
    fn test_on_create_no_layers_no_location_is_empty() {
        assert!(on_create(&placement(7, None, &[])).is_empty());
    }

    #[test]
    fn test_on_delete_removes_everything() {
        let plan = on_delete(&placement(7, Some(5), &[10]));
        assert_eq!(
            plan.edits(),
            &[
                IndexEdit::RemovePointMedium { point_id: 5, medium_id: 7 },
                IndexEdit::RemoveLayerMedium { layer_id: 10, medium_id: 7 },
                IndexEdit::RemoveLayerPoint { layer_id: 10, medium_id: 7 },
            ]
        );
    }

    #[test]
    fn test_on_update_unchanged_is_empty() {
        let p = placement(7, Some(5), &[10, 11]);
        assert!(on_update(&p, &p).is_empty());
    }

    #[test]
    fn test_on_update_layer_diff() {
        let old = placement(7, Some(5), &[10, 11]);
        let new = placement(7, Some(5), &[11, 12]);
        assert_eq!(
            on_update(&old, &new).edits(),
            &[
                IndexEdit::AddLayerMedium { layer_id: 12, medium_id: 7 },
                IndexEdit::AddLayerPoint { layer_id: 12, medium_id: 7, point_id: 5 },
                IndexEdit::RemoveLayerMedium { layer_id: 10, medium_id: 7 },
                IndexEdit::RemoveLayerPoint { layer_id: 10, medium_id: 7 },
            ]
        );
    }

    #[test]
    fn test_on_update_location_change_moves_retained_tuples() {
        let old = placement(7, Some(5), &[10, 11]);
        let new = placement(7, Some(6), &[10, 12]);
        assert_eq!(
            on_update(&old, &new).edits(),
            &[
                IndexEdit::AddLayerMedium { layer_id: 12, medium_id: 7 },
                IndexEdit::AddLayerPoint { layer_id: 12, medium_id: 7, point_id: 6 },
                IndexEdit::RemoveLayerMedium { layer_id: 11, medium_id: 7 },
                IndexEdit::RemoveLayerPoint { layer_id: 11, medium_id: 7 },
                IndexEdit::AddPointMedium { point_id: 6, medium_id: 7 },
                IndexEdit::RemovePointMedium { point_id: 5, medium_id: 7 },
                IndexEdit::MoveLayerPoint { layer_id: 10, medium_id: 7, point_id: 6 },
            ]
        );
    }

    #[test]
    fn test_on_update_location_cleared_drops_tuples() {
        let old = placement(7, Some(5), &[10]);
        let new = placement(7, None, &[10]);
        assert_eq!(
            on_update(&old, &new).edits(),
            &[
                IndexEdit::RemovePointMedium { point_id: 5, medium_id: 7 },
                IndexEdit::RemoveLayerPoint { layer_id: 10, medium_id: 7 },
            ]
        );
    }

    #[test]
    fn test_on_update_location_set_adds_tuples() {
        let old = placement(7, None, &[10]);
        let new = placement(7, Some(5), &[10]);
        assert_eq!(
            on_update(&old, &new).edits(),
            &[
                IndexEdit::AddPointMedium { point_id: 5, medium_id: 7 },
                IndexEdit::MoveLayerPoint { layer_id: 10, medium_id: 7, point_id: 5 },
            ]
        );
    }
}
