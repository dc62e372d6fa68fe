//! Batch membership
//!
//! A batch is not a stored entity: it is the set of crops sharing
//! `(recipe_id, planting_at)`, computed at operation time. Stage and
//! watering mutations fan out across the whole batch so sibling trays
//! never diverge.

use sqlx::{PgPool, Postgres, Transaction};

use crate::error::AppResult;
use crate::services::crop::{CropRow, CROP_COLUMNS};
use shared::Crop;

/// Resolves batch membership for a crop
#[derive(Clone)]
pub struct BatchCoordinator {
    db: PgPool,
}

impl BatchCoordinator {
    /// Create a new BatchCoordinator instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// All crops sharing `(recipe_id, planting_at)` with the given crop,
    /// including itself. A crop without a planting time is a batch of one.
    pub async fn members_of(&self, crop: &Crop) -> AppResult<Vec<Crop>> {
        let Some(planting_at) = crop.planting_at else {
            return Ok(vec![crop.clone()]);
        };

        let rows = sqlx::query_as::<_, CropRow>(&format!(
            r#"
            SELECT {CROP_COLUMNS}
            FROM crops
            WHERE recipe_id = $1 AND planting_at = $2
            ORDER BY tray_number
            "#,
        ))
        .bind(crop.recipe_id)
        .bind(planting_at)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Crop::from).collect())
    }

    /// Batch members locked for the duration of the surrounding
    /// transaction. Used by mutations that must apply to every member
    /// as a single atomic unit of work.
    pub async fn members_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        crop: &Crop,
    ) -> AppResult<Vec<Crop>> {
        let rows = match crop.planting_at {
            Some(planting_at) => {
                sqlx::query_as::<_, CropRow>(&format!(
                    r#"
                    SELECT {CROP_COLUMNS}
                    FROM crops
                    WHERE recipe_id = $1 AND planting_at = $2
                    ORDER BY tray_number
                    FOR UPDATE
                    "#,
                ))
                .bind(crop.recipe_id)
                .bind(planting_at)
                .fetch_all(&mut **tx)
                .await?
            }
            None => {
                sqlx::query_as::<_, CropRow>(&format!(
                    "SELECT {CROP_COLUMNS} FROM crops WHERE id = $1 FOR UPDATE",
                ))
                .bind(crop.id)
                .fetch_all(&mut **tx)
                .await?
            }
        };

        Ok(rows.into_iter().map(Crop::from).collect())
    }
}
