//! Crop management service
//!
//! Gates every crop mutation behind validation, initializes defaults for
//! newly planted trays, and keeps the task table consistent with crop
//! state: deleting a crop or moving it out of band always cancels its
//! pending tasks in the same unit of work.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::lifecycle::CropLifecycleService;
use crate::services::recipe::RecipeService;
use crate::services::task::{deactivate_tasks, TaskFactory};
use shared::{
    validate_crop_fields, validate_timestamp_sequence, Crop, CropView, Recipe, Stage,
    StageTimestamps,
};

/// Crop service for planting, harvesting, and corrections
#[derive(Clone)]
pub struct CropService {
    db: PgPool,
}

pub(crate) const CROP_COLUMNS: &str = "id, recipe_id, tray_number, tray_count, planting_at, \
     soaking_at, germination_at, blackout_at, light_at, harvested_at, \
     current_stage, watering_suspended_at, harvest_weight_grams, created_at, updated_at";

/// Database row for a crop
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CropRow {
    pub id: Uuid,
    pub recipe_id: Uuid,
    pub tray_number: String,
    pub tray_count: i32,
    pub planting_at: Option<DateTime<Utc>>,
    pub soaking_at: Option<DateTime<Utc>>,
    pub germination_at: Option<DateTime<Utc>>,
    pub blackout_at: Option<DateTime<Utc>>,
    pub light_at: Option<DateTime<Utc>>,
    pub harvested_at: Option<DateTime<Utc>>,
    pub current_stage: String,
    pub watering_suspended_at: Option<DateTime<Utc>>,
    pub harvest_weight_grams: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CropRow> for Crop {
    fn from(row: CropRow) -> Self {
        Crop {
            id: row.id,
            recipe_id: row.recipe_id,
            tray_number: row.tray_number,
            tray_count: row.tray_count,
            planting_at: row.planting_at,
            soaking_at: row.soaking_at,
            germination_at: row.germination_at,
            blackout_at: row.blackout_at,
            light_at: row.light_at,
            harvested_at: row.harvested_at,
            current_stage: row.current_stage,
            watering_suspended_at: row.watering_suspended_at,
            harvest_weight_grams: row.harvest_weight_grams,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Fetch a crop by ID
pub(crate) async fn fetch_crop(db: &PgPool, crop_id: Uuid) -> AppResult<Crop> {
    let row = sqlx::query_as::<_, CropRow>(&format!(
        "SELECT {CROP_COLUMNS} FROM crops WHERE id = $1",
    ))
    .bind(crop_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound("Crop".to_string()))?;

    Ok(row.into())
}

/// Input for planting a crop
#[derive(Debug, Deserialize)]
pub struct PlantCropInput {
    pub recipe_id: Uuid,
    pub tray_number: String,
    pub tray_count: Option<i32>,
    /// Defaults to now; trays planted together share this instant and
    /// form a batch
    pub planting_at: Option<DateTime<Utc>>,
}

/// Input for recording a harvest
#[derive(Debug, Deserialize)]
pub struct RecordHarvestInput {
    pub weight_grams: Decimal,
    pub harvested_at: Option<DateTime<Utc>>,
}

/// Input for correcting a crop's planting time
#[derive(Debug, Deserialize)]
pub struct RescheduleCropInput {
    pub new_planting_at: DateTime<Utc>,
}

/// Defaults for a newly planted crop: planting defaults to now,
/// germination begins at planting, and the current stage is derived
/// from the timestamps
fn initialize_new_crop(
    planting_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, StageTimestamps, Stage) {
    let planting_at = planting_at.unwrap_or(now);
    let timestamps = StageTimestamps {
        germination_at: Some(planting_at),
        ..Default::default()
    };
    let stage = timestamps.calculate_stage();
    (planting_at, timestamps, stage)
}

impl CropService {
    /// Create a new CropService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Plant a new crop tray. Validates the recipe, gates on seed lot
    /// availability, initializes defaults, persists, and schedules every
    /// future stage task.
    pub async fn plant_crop(&self, input: PlantCropInput) -> AppResult<CropView> {
        let recipes = RecipeService::new(self.db.clone());
        let recipe = recipes.get_recipe(input.recipe_id).await?;
        recipe.validate().map_err(|msg| AppError::Validation {
            field: "recipe_id".to_string(),
            message: msg.to_string(),
        })?;

        // A depleted seed lot blocks planting
        if let Some(lot_id) = recipe.lot_id {
            if recipes.is_lot_depleted(lot_id).await? {
                return Err(AppError::LotDepleted(lot_id.to_string()));
            }
        }

        if input.tray_number.trim().is_empty() {
            return Err(AppError::Validation {
                field: "tray_number".to_string(),
                message: "Tray number cannot be empty".to_string(),
            });
        }

        let now = Utc::now();
        let (planting_at, timestamps, stage) = initialize_new_crop(input.planting_at, now);
        let tray_count = input.tray_count.unwrap_or(1);

        let errors = validate_crop_fields(tray_count, stage.as_str(), None);
        if !errors.is_empty() {
            return Err(AppError::ValidationErrors(errors));
        }

        let row = sqlx::query_as::<_, CropRow>(&format!(
            r#"
            INSERT INTO crops (recipe_id, tray_number, tray_count, planting_at,
                               soaking_at, germination_at, blackout_at, light_at,
                               harvested_at, current_stage)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {CROP_COLUMNS}
            "#,
        ))
        .bind(input.recipe_id)
        .bind(&input.tray_number)
        .bind(tray_count)
        .bind(planting_at)
        .bind(timestamps.soaking_at)
        .bind(timestamps.germination_at)
        .bind(timestamps.blackout_at)
        .bind(timestamps.light_at)
        .bind(timestamps.harvested_at)
        .bind(stage.as_str())
        .fetch_one(&self.db)
        .await?;

        let crop: Crop = row.into();
        tracing::info!(crop_id = %crop.id, tray = %crop.tray_number, variety = %recipe.name, "planted crop");

        TaskFactory::new(self.db.clone())
            .schedule_all_stage_tasks(crop.id)
            .await?;

        Ok(CropView::build(crop, Some(&recipe), now))
    }

    /// Get a crop with its derived display fields
    pub async fn get_crop(&self, crop_id: Uuid) -> AppResult<CropView> {
        let crop = fetch_crop(&self.db, crop_id).await?;
        let recipe = RecipeService::new(self.db.clone())
            .get_recipe(crop.recipe_id)
            .await
            .ok();
        Ok(CropView::build(crop, recipe.as_ref(), Utc::now()))
    }

    /// List all crops with derived display fields
    pub async fn get_crops(&self) -> AppResult<Vec<CropView>> {
        let rows = sqlx::query_as::<_, CropWithRecipeRow>(
            r#"
            SELECT c.id, c.recipe_id, c.tray_number, c.tray_count, c.planting_at,
                   c.soaking_at, c.germination_at, c.blackout_at, c.light_at,
                   c.harvested_at, c.current_stage, c.watering_suspended_at,
                   c.harvest_weight_grams, c.created_at, c.updated_at,
                   r.name AS recipe_name, r.germination_days, r.blackout_days,
                   r.light_days, r.seed_soak_hours, r.suspend_water_hours,
                   r.days_to_maturity, r.lot_id
            FROM crops c
            JOIN recipes r ON r.id = c.recipe_id
            ORDER BY c.planting_at DESC, c.tray_number
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let now = Utc::now();
        Ok(rows
            .into_iter()
            .map(|row| {
                let (crop, recipe) = row.split();
                CropView::build(crop, Some(&recipe), now)
            })
            .collect())
    }

    /// Run every crop-level rule: counts, weights, recipe and stage
    /// references, and timestamp chronology. Returns all violations.
    pub async fn validate_crop(&self, crop: &Crop) -> AppResult<Vec<String>> {
        let mut errors = validate_crop_fields(
            crop.tray_count,
            &crop.current_stage,
            crop.harvest_weight_grams,
        );

        let recipes = RecipeService::new(self.db.clone());
        if !recipes.recipe_exists(crop.recipe_id).await? {
            errors.push(format!("Recipe {} does not exist", crop.recipe_id));
        }

        if crop.stage().is_some() {
            let known = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM crop_stages WHERE code = $1",
            )
            .bind(&crop.current_stage)
            .fetch_one(&self.db)
            .await?;
            if known == 0 {
                errors.push(format!(
                    "Stage {} is not present in the stage registry",
                    crop.current_stage
                ));
            }
        }

        errors.extend(validate_timestamp_sequence(&crop.stage_timestamps()));
        Ok(errors)
    }

    /// Advance a crop out of band (operator action). The whole batch
    /// moves, with each member's stale tasks cancelled in the same
    /// transaction as the stage write; only the convergent rescheduling
    /// of the remaining future events happens afterwards.
    pub async fn advance_crop(
        &self,
        crop_id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Crop>> {
        let members = CropLifecycleService::new(self.db.clone())
            .advance_stage(crop_id, at)
            .await?;

        let tasks = TaskFactory::new(self.db.clone());
        for member in &members {
            tasks.schedule_all_stage_tasks(member.id).await?;
        }
        Ok(members)
    }

    /// Record a harvest: stamps the terminal timestamp and weight, and
    /// cancels the crop's outstanding tasks in the same transaction
    pub async fn record_harvest(
        &self,
        crop_id: Uuid,
        input: RecordHarvestInput,
    ) -> AppResult<Crop> {
        if input.weight_grams < Decimal::ZERO {
            return Err(AppError::Validation {
                field: "weight_grams".to_string(),
                message: "Harvest weight cannot be negative".to_string(),
            });
        }

        let mut crop = fetch_crop(&self.db, crop_id).await?;
        let harvested_at = input.harvested_at.unwrap_or_else(Utc::now);

        let mut timestamps = crop.stage_timestamps();
        timestamps.set(Stage::Harvested, Some(harvested_at));
        let errors = validate_timestamp_sequence(&timestamps);
        if !errors.is_empty() {
            return Err(AppError::SequenceViolation(errors));
        }

        crop.apply_stage_timestamps(timestamps);
        crop.update_current_stage();
        crop.harvest_weight_grams = Some(input.weight_grams);

        let violations = self.validate_crop(&crop).await?;
        if !violations.is_empty() {
            return Err(AppError::ValidationErrors(violations));
        }

        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"
            UPDATE crops
            SET harvested_at = $1, current_stage = $2, harvest_weight_grams = $3,
                updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(crop.harvested_at)
        .bind(&crop.current_stage)
        .bind(crop.harvest_weight_grams)
        .bind(crop.id)
        .execute(&mut *tx)
        .await?;

        // The crop reached its terminal stage; pending tasks are stale
        deactivate_tasks(&mut *tx, crop.id).await?;
        tx.commit().await?;

        tracing::info!(crop_id = %crop_id, weight = %input.weight_grams, "recorded harvest");
        Ok(crop)
    }

    /// Correct a crop's planting time. Every set stage timestamp shifts
    /// by the same delta, preserving its relative offset from planting;
    /// tasks are cancelled and rescheduled at the shifted instants.
    pub async fn reschedule_crop(
        &self,
        crop_id: Uuid,
        input: RescheduleCropInput,
    ) -> AppResult<Crop> {
        let mut crop = fetch_crop(&self.db, crop_id).await?;

        let mut timestamps = crop.stage_timestamps();
        if let Some(previous) = crop.planting_at {
            timestamps.shift(input.new_planting_at - previous);
        }
        let errors = validate_timestamp_sequence(&timestamps);
        if !errors.is_empty() {
            return Err(AppError::SequenceViolation(errors));
        }

        crop.apply_stage_timestamps(timestamps);
        crop.planting_at = Some(input.new_planting_at);

        let violations = self.validate_crop(&crop).await?;
        if !violations.is_empty() {
            return Err(AppError::ValidationErrors(violations));
        }

        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"
            UPDATE crops
            SET planting_at = $1, soaking_at = $2, germination_at = $3,
                blackout_at = $4, light_at = $5, harvested_at = $6,
                updated_at = NOW()
            WHERE id = $7
            "#,
        )
        .bind(crop.planting_at)
        .bind(crop.soaking_at)
        .bind(crop.germination_at)
        .bind(crop.blackout_at)
        .bind(crop.light_at)
        .bind(crop.harvested_at)
        .bind(crop.id)
        .execute(&mut *tx)
        .await?;

        // Old task instants no longer match the shifted timeline
        deactivate_tasks(&mut *tx, crop.id).await?;
        tx.commit().await?;

        TaskFactory::new(self.db.clone())
            .schedule_all_stage_tasks(crop.id)
            .await?;

        tracing::info!(crop_id = %crop_id, planting_at = %input.new_planting_at, "rescheduled crop");
        Ok(crop)
    }

    /// Delete a crop. Its outstanding tasks are cancelled in the same
    /// transaction so no orphan task can fire afterwards.
    pub async fn delete_crop(&self, crop_id: Uuid) -> AppResult<()> {
        // Ensure the crop exists before mutating anything
        fetch_crop(&self.db, crop_id).await?;

        let mut tx = self.db.begin().await?;
        deactivate_tasks(&mut *tx, crop_id).await?;
        sqlx::query("DELETE FROM crops WHERE id = $1")
            .bind(crop_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(crop_id = %crop_id, "deleted crop");
        Ok(())
    }
}

/// Joined crop + recipe row for list views
#[derive(Debug, sqlx::FromRow)]
struct CropWithRecipeRow {
    id: Uuid,
    recipe_id: Uuid,
    tray_number: String,
    tray_count: i32,
    planting_at: Option<DateTime<Utc>>,
    soaking_at: Option<DateTime<Utc>>,
    germination_at: Option<DateTime<Utc>>,
    blackout_at: Option<DateTime<Utc>>,
    light_at: Option<DateTime<Utc>>,
    harvested_at: Option<DateTime<Utc>>,
    current_stage: String,
    watering_suspended_at: Option<DateTime<Utc>>,
    harvest_weight_grams: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    recipe_name: String,
    germination_days: Decimal,
    blackout_days: Decimal,
    light_days: Decimal,
    seed_soak_hours: Decimal,
    suspend_water_hours: Decimal,
    days_to_maturity: Option<Decimal>,
    lot_id: Option<Uuid>,
}

impl CropWithRecipeRow {
    fn split(self) -> (Crop, Recipe) {
        let recipe = Recipe {
            id: self.recipe_id,
            name: self.recipe_name,
            germination_days: self.germination_days,
            blackout_days: self.blackout_days,
            light_days: self.light_days,
            seed_soak_hours: self.seed_soak_hours,
            suspend_water_hours: self.suspend_water_hours,
            days_to_maturity: self.days_to_maturity,
            lot_id: self.lot_id,
        };
        let crop = Crop {
            id: self.id,
            recipe_id: self.recipe_id,
            tray_number: self.tray_number,
            tray_count: self.tray_count,
            planting_at: self.planting_at,
            soaking_at: self.soaking_at,
            germination_at: self.germination_at,
            blackout_at: self.blackout_at,
            light_at: self.light_at,
            harvested_at: self.harvested_at,
            current_stage: self.current_stage,
            watering_suspended_at: self.watering_suspended_at,
            harvest_weight_grams: self.harvest_weight_grams,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        (crop, recipe)
    }
}
