//! Reverse-index audit and repair
//!
//! Recomputes the reverse indexes implied by the `media` table and compares
//! them with what is stored. Owner rows that no longer exist (deleted points
//! or layers) are excluded from the expected set, matching the cascade on the
//! index tables.

use std::collections::BTreeSet;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::index::{self, Placement};
use crate::db::media::load_placements;
use crate::Result;

/// Snapshot of all three reverse indexes as sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReverseIndexes {
    /// `(point_id, medium_id)`
    pub point_media: BTreeSet<(i64, i64)>,
    /// `(layer_id, medium_id)`
    pub layer_media: BTreeSet<(i64, i64)>,
    /// `(layer_id, medium_id, point_id)`
    pub layer_points: BTreeSet<(i64, i64, i64)>,
}

impl ReverseIndexes {
    pub fn is_empty(&self) -> bool {
        self.point_media.is_empty() && self.layer_media.is_empty() && self.layer_points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.point_media.len() + self.layer_media.len() + self.layer_points.len()
    }

    fn difference(&self, other: &ReverseIndexes) -> ReverseIndexes {
        ReverseIndexes {
            point_media: self.point_media.difference(&other.point_media).copied().collect(),
            layer_media: self.layer_media.difference(&other.layer_media).copied().collect(),
            layer_points: self.layer_points.difference(&other.layer_points).copied().collect(),
        }
    }
}

/// Result of comparing expected and stored reverse indexes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Expected but absent from storage
    pub missing: ReverseIndexes,
    /// Stored but not implied by any medium
    pub stray: ReverseIndexes,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.stray.is_empty()
    }
}

/// Reverse indexes implied by the given placements
pub fn expected_indexes(
    placements: &[Placement],
    existing_points: &BTreeSet<i64>,
    existing_layers: &BTreeSet<i64>,
) -> ReverseIndexes {
    let mut expected = ReverseIndexes::default();

    for placement in placements {
        let point = placement
            .location_id
            .filter(|point_id| existing_points.contains(point_id));

        if let Some(point_id) = point {
            expected.point_media.insert((point_id, placement.medium_id));
        }
        for &layer_id in placement.layer_ids.iter().filter(|id| existing_layers.contains(id)) {
            expected.layer_media.insert((layer_id, placement.medium_id));
            if let Some(point_id) = point {
                expected.layer_points.insert((layer_id, placement.medium_id, point_id));
            }
        }
    }
    expected
}

/// Compare two snapshots
pub fn diff(expected: &ReverseIndexes, actual: &ReverseIndexes) -> AuditReport {
    AuditReport {
        missing: expected.difference(actual),
        stray: actual.difference(expected),
    }
}

/// Read the stored reverse indexes
pub async fn load_indexes(pool: &SqlitePool) -> Result<ReverseIndexes> {
    let point_media: Vec<(i64, i64)> = sqlx::query_as("SELECT point_id, medium_id FROM point_media")
        .fetch_all(pool)
        .await?;
    let layer_media: Vec<(i64, i64)> = sqlx::query_as("SELECT layer_id, medium_id FROM layer_media")
        .fetch_all(pool)
        .await?;
    let layer_points: Vec<(i64, i64, i64)> =
        sqlx::query_as("SELECT layer_id, medium_id, point_id FROM layer_points")
            .fetch_all(pool)
            .await?;

    Ok(ReverseIndexes {
        point_media: point_media.into_iter().collect(),
        layer_media: layer_media.into_iter().collect(),
        layer_points: layer_points.into_iter().collect(),
    })
}

async fn existing_ids(pool: &SqlitePool, table: &str) -> Result<BTreeSet<i64>> {
    let ids: Vec<i64> = sqlx::query_scalar(&format!("SELECT id FROM {}", table))
        .fetch_all(pool)
        .await?;
    Ok(ids.into_iter().collect())
}

/// Compare stored reverse indexes with those implied by the media table
pub async fn audit(pool: &SqlitePool) -> Result<AuditReport> {
    let placements = load_placements(pool).await?;
    let points = existing_ids(pool, "points").await?;
    let layers = existing_ids(pool, "layers").await?;

    let expected = expected_indexes(&placements, &points, &layers);
    let actual = load_indexes(pool).await?;
    let report = diff(&expected, &actual);

    if report.is_clean() {
        info!(entries = expected.len(), "Reverse indexes consistent");
    } else {
        warn!(
            missing = report.missing.len(),
            stray = report.stray.len(),
            "Reverse indexes out of sync with media"
        );
    }
    Ok(report)
}

/// Rebuild all reverse indexes from the media table in one transaction
///
/// Returns the audit taken before the rebuild.
pub async fn repair(pool: &SqlitePool) -> Result<AuditReport> {
    let report = audit(pool).await?;
    if report.is_clean() {
        return Ok(report);
    }

    let placements = load_placements(pool).await?;
    let points = existing_ids(pool, "points").await?;
    let layers = existing_ids(pool, "layers").await?;

    let mut tx = pool.begin().await?;
    for table in ["point_media", "layer_media", "layer_points"] {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *tx)
            .await?;
    }

    // Media are replayed oldest first so list order follows creation order
    for placement in &placements {
        let live = Placement {
            medium_id: placement.medium_id,
            location_id: placement.location_id.filter(|id| points.contains(id)),
            layer_ids: placement
                .layer_ids
                .iter()
                .copied()
                .filter(|id| layers.contains(id))
                .collect(),
        };
        index::apply_plan(&mut tx, &index::on_create(&live)).await?;
    }
    tx.commit().await?;

    info!(
        media = placements.len(),
        missing = report.missing.len(),
        stray = report.stray.len(),
        "Reverse indexes rebuilt"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set<T: Ord + Copy>(items: &[T]) -> BTreeSet<T> {
        items.iter().copied().collect()
    }

    #[test]
    fn test_expected_indexes_basic() {
        let placements = vec![Placement { medium_id: 1, location_id: Some(5), layer_ids: vec![10, 11] }];
        let expected = expected_indexes(&placements, &set(&[5]), &set(&[10, 11]));

        assert_eq!(expected.point_media, set(&[(5, 1)]));
        assert_eq!(expected.layer_media, set(&[(10, 1), (11, 1)]));
        assert_eq!(expected.layer_points, set(&[(10, 1, 5), (11, 1, 5)]));
    }

    #[test]
    fn test_expected_indexes_skip_deleted_owners() {
        let placements = vec![Placement { medium_id: 1, location_id: Some(5), layer_ids: vec![10, 11] }];
        let expected = expected_indexes(&placements, &set(&[]), &set(&[11]));

        assert!(expected.point_media.is_empty());
        assert_eq!(expected.layer_media, set(&[(11, 1)]));
        assert!(expected.layer_points.is_empty());
    }

    #[test]
    fn test_diff_reports_both_directions() {
        let expected = ReverseIndexes {
            point_media: set(&[(5, 1)]),
            layer_media: set(&[(10, 1)]),
            layer_points: set(&[(10, 1, 5)]),
        };
        let actual = ReverseIndexes {
            point_media: set(&[(5, 1), (5, 2)]),
            layer_media: set(&[]),
            layer_points: set(&[(10, 1, 5)]),
        };

        let report = diff(&expected, &actual);
        assert!(!report.is_clean());
        assert_eq!(report.missing.layer_media, set(&[(10, 1)]));
        assert_eq!(report.stray.point_media, set(&[(5, 2)]));
        assert!(report.missing.layer_points.is_empty());
        assert_eq!(report.missing.len() + report.stray.len(), 2);
    }

    #[test]
    fn test_diff_identical_is_clean() {
        let snapshot = ReverseIndexes {
            point_media: set(&[(5, 1)]),
            layer_media: set(&[(10, 1)]),
            layer_points: set(&[(10, 1, 5)]),
        };
        assert!(diff(&snapshot, &snapshot).is_clean());
    }
}
