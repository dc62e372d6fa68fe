//! Crop lifecycle service
//!
//! Owns stage transition logic: advancing a crop to its next applicable
//! stage, resetting backward, expected harvest dates, and watering
//! suspension. Advancing and watering changes always fan out to the
//! whole batch inside a single transaction, so sibling trays either all
//! move or none do.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::batch::BatchCoordinator;
use crate::services::crop::fetch_crop;
use crate::services::recipe::RecipeService;
use crate::services::task::deactivate_tasks;
use shared::{validate_timestamp_sequence, Crop, Stage};

/// Lifecycle service for crop stage transitions and watering state
#[derive(Clone)]
pub struct CropLifecycleService {
    db: PgPool,
}

impl CropLifecycleService {
    /// Create a new CropLifecycleService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Advance a crop (and every batch sibling) to its next applicable
    /// stage, skipping stages whose recipe duration is zero. Advancing a
    /// harvested crop is a no-op and returns the batch unchanged.
    ///
    /// Every member's pending tasks are cancelled in the same
    /// transaction as the stage write, so a task targeting the stage the
    /// batch just passed can never survive a partial failure. Callers
    /// reschedule the remaining future events afterwards.
    ///
    /// `at` is the transition instant; defaults to now.
    pub async fn advance_stage(
        &self,
        crop_id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Crop>> {
        let crop = fetch_crop(&self.db, crop_id).await?;
        let recipe = RecipeService::new(self.db.clone())
            .get_recipe(crop.recipe_id)
            .await?;
        let coordinator = BatchCoordinator::new(self.db.clone());

        let current = crop.stage_timestamps().calculate_stage();
        if current.is_terminal() {
            tracing::debug!(crop_id = %crop_id, "crop already harvested, advance is a no-op");
            return coordinator.members_of(&crop).await;
        }

        let next = recipe
            .next_applicable_stage(current)
            .ok_or_else(|| AppError::Internal("No stage after a non-terminal stage".to_string()))?;
        let at = at.unwrap_or_else(Utc::now);

        let mut tx = self.db.begin().await?;
        let members = coordinator.members_for_update(&mut tx, &crop).await?;

        let mut updated = Vec::with_capacity(members.len());
        for mut member in members {
            let mut timestamps = member.stage_timestamps();
            timestamps.set(next, Some(at));

            let errors = validate_timestamp_sequence(&timestamps);
            if !errors.is_empty() {
                // Dropping the transaction rolls back every member
                return Err(AppError::SequenceViolation(errors));
            }

            member.apply_stage_timestamps(timestamps);
            member.update_current_stage();
            persist_stage_state(&mut tx, &member).await?;
            // Tasks aimed at the stage this member just passed are stale
            deactivate_tasks(&mut *tx, member.id).await?;
            updated.push(member);
        }
        tx.commit().await?;

        tracing::info!(
            crop_id = %crop_id,
            stage = next.as_str(),
            members = updated.len(),
            "advanced crop batch"
        );
        Ok(updated)
    }

    /// Reset a crop backward to `target`: nulls every stage timestamp
    /// later than the target, leaving earlier ones intact. Used for
    /// operator corrections.
    pub async fn reset_to_stage(&self, crop_id: Uuid, target: Stage) -> AppResult<Crop> {
        let mut crop = fetch_crop(&self.db, crop_id).await?;

        let mut timestamps = crop.stage_timestamps();
        timestamps.clear_after(target);
        crop.apply_stage_timestamps(timestamps);
        crop.current_stage = target.as_str().to_string();

        persist_stage_state_pool(&self.db, &crop).await?;

        tracing::info!(crop_id = %crop_id, stage = target.as_str(), "reset crop stage");
        Ok(crop)
    }

    /// Expected harvest instant: planting plus the maturity override, or
    /// the sum of configured stage days. None without a recipe or a
    /// planting time.
    pub async fn expected_harvest_at(&self, crop: &Crop) -> AppResult<Option<DateTime<Utc>>> {
        let recipe = match RecipeService::new(self.db.clone())
            .get_recipe(crop.recipe_id)
            .await
        {
            Ok(recipe) => recipe,
            Err(AppError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(crop.planting_at.map(|at| recipe.expected_harvest_at(at)))
    }

    /// Suspend watering for a crop and its whole batch
    pub async fn suspend_watering(
        &self,
        crop_id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Crop>> {
        self.set_watering_suspended(crop_id, Some(at.unwrap_or_else(Utc::now)))
            .await
    }

    /// Resume watering for a crop and its whole batch
    pub async fn resume_watering(&self, crop_id: Uuid) -> AppResult<Vec<Crop>> {
        self.set_watering_suspended(crop_id, None).await
    }

    async fn set_watering_suspended(
        &self,
        crop_id: Uuid,
        suspended_at: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Crop>> {
        let crop = fetch_crop(&self.db, crop_id).await?;
        let coordinator = BatchCoordinator::new(self.db.clone());

        let mut tx = self.db.begin().await?;
        let members = coordinator.members_for_update(&mut tx, &crop).await?;

        let mut updated = Vec::with_capacity(members.len());
        for mut member in members {
            member.watering_suspended_at = suspended_at;
            sqlx::query(
                "UPDATE crops SET watering_suspended_at = $1, updated_at = NOW() WHERE id = $2",
            )
            .bind(suspended_at)
            .bind(member.id)
            .execute(&mut *tx)
            .await?;
            updated.push(member);
        }
        tx.commit().await?;

        tracing::info!(
            crop_id = %crop_id,
            suspended = suspended_at.is_some(),
            members = updated.len(),
            "updated batch watering state"
        );
        Ok(updated)
    }
}

/// Write a crop's stage timestamps and current stage inside a transaction
async fn persist_stage_state(
    tx: &mut Transaction<'_, Postgres>,
    crop: &Crop,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE crops
        SET soaking_at = $1, germination_at = $2, blackout_at = $3,
            light_at = $4, harvested_at = $5, current_stage = $6,
            updated_at = NOW()
        WHERE id = $7
        "#,
    )
    .bind(crop.soaking_at)
    .bind(crop.germination_at)
    .bind(crop.blackout_at)
    .bind(crop.light_at)
    .bind(crop.harvested_at)
    .bind(&crop.current_stage)
    .bind(crop.id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn persist_stage_state_pool(db: &PgPool, crop: &Crop) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE crops
        SET soaking_at = $1, germination_at = $2, blackout_at = $3,
            light_at = $4, harvested_at = $5, current_stage = $6,
            updated_at = NOW()
        WHERE id = $7
        "#,
    )
    .bind(crop.soaking_at)
    .bind(crop.germination_at)
    .bind(crop.blackout_at)
    .bind(crop.light_at)
    .bind(crop.harvested_at)
    .bind(&crop.current_stage)
    .bind(crop.id)
    .execute(db)
    .await?;
    Ok(())
}
