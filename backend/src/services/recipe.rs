//! Recipe read model and seed lot availability check
//!
//! Recipes and lots are managed by their own admin screens; the growth
//! engine only reads them. Lot depletion accounting happens elsewhere,
//! this service just answers "is this lot still usable?".

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::Recipe;

/// Read-only access to growing recipes and seed lots
#[derive(Clone)]
pub struct RecipeService {
    db: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct RecipeRow {
    id: Uuid,
    name: String,
    germination_days: Decimal,
    blackout_days: Decimal,
    light_days: Decimal,
    seed_soak_hours: Decimal,
    suspend_water_hours: Decimal,
    days_to_maturity: Option<Decimal>,
    lot_id: Option<Uuid>,
}

impl From<RecipeRow> for Recipe {
    fn from(row: RecipeRow) -> Self {
        Recipe {
            id: row.id,
            name: row.name,
            germination_days: row.germination_days,
            blackout_days: row.blackout_days,
            light_days: row.light_days,
            seed_soak_hours: row.seed_soak_hours,
            suspend_water_hours: row.suspend_water_hours,
            days_to_maturity: row.days_to_maturity,
            lot_id: row.lot_id,
        }
    }
}

impl RecipeService {
    /// Create a new RecipeService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Get a recipe by ID
    pub async fn get_recipe(&self, recipe_id: Uuid) -> AppResult<Recipe> {
        let row = sqlx::query_as::<_, RecipeRow>(
            r#"
            SELECT id, name, germination_days, blackout_days, light_days,
                   seed_soak_hours, suspend_water_hours, days_to_maturity, lot_id
            FROM recipes
            WHERE id = $1
            "#,
        )
        .bind(recipe_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Recipe".to_string()))?;

        Ok(row.into())
    }

    /// Check whether a recipe exists
    pub async fn recipe_exists(&self, recipe_id: Uuid) -> AppResult<bool> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM recipes WHERE id = $1")
            .bind(recipe_id)
            .fetch_one(&self.db)
            .await?;
        Ok(count > 0)
    }

    /// Check whether a seed lot is depleted. Consulted before planting
    /// against a recipe whose lot is exhausted.
    pub async fn is_lot_depleted(&self, lot_id: Uuid) -> AppResult<bool> {
        let depleted = sqlx::query_scalar::<_, bool>(
            "SELECT is_depleted FROM lots WHERE id = $1",
        )
        .bind(lot_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Lot".to_string()))?;

        Ok(depleted)
    }
}
