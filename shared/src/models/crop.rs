//! Crop models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::recipe::Recipe;
use super::stage::{Stage, StageTimestamps};

/// A planted tray (or group of trays) under management
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crop {
    pub id: Uuid,
    pub recipe_id: Uuid,
    /// Free-text tray label, e.g. "A-14"
    pub tray_number: String,
    pub tray_count: i32,
    /// Batch key together with recipe_id
    pub planting_at: Option<DateTime<Utc>>,
    pub soaking_at: Option<DateTime<Utc>>,
    pub germination_at: Option<DateTime<Utc>>,
    pub blackout_at: Option<DateTime<Utc>>,
    pub light_at: Option<DateTime<Utc>>,
    pub harvested_at: Option<DateTime<Utc>>,
    /// Stage code referencing the crop_stages registry
    pub current_stage: String,
    pub watering_suspended_at: Option<DateTime<Utc>>,
    pub harvest_weight_grams: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Crop {
    pub fn stage_timestamps(&self) -> StageTimestamps {
        StageTimestamps {
            soaking_at: self.soaking_at,
            germination_at: self.germination_at,
            blackout_at: self.blackout_at,
            light_at: self.light_at,
            harvested_at: self.harvested_at,
        }
    }

    pub fn apply_stage_timestamps(&mut self, ts: StageTimestamps) {
        self.soaking_at = ts.soaking_at;
        self.germination_at = ts.germination_at;
        self.blackout_at = ts.blackout_at;
        self.light_at = ts.light_at;
        self.harvested_at = ts.harvested_at;
    }

    pub fn stage(&self) -> Option<Stage> {
        Stage::from_str(&self.current_stage)
    }

    /// Recompute current_stage from the timestamps; returns whether the
    /// stored value changed. Callers use the flag to decide whether to
    /// fire follow-on effects.
    pub fn update_current_stage(&mut self) -> bool {
        let derived = self.stage_timestamps().calculate_stage();
        if self.current_stage != derived.as_str() {
            self.current_stage = derived.as_str().to_string();
            true
        } else {
            false
        }
    }

    /// Whole days spent in the current stage as of `now`; 0 when the
    /// current stage has no timestamp
    pub fn days_in_current_stage(&self, now: DateTime<Utc>) -> i64 {
        let Some(stage) = self.stage() else {
            return 0;
        };
        match self.stage_timestamps().get(stage) {
            Some(entered) => (now - entered).num_days().max(0),
            None => 0,
        }
    }
}

/// Read-side projection of a crop with derived display fields,
/// recomputed against an explicit `now`
#[derive(Debug, Clone, Serialize)]
pub struct CropView {
    #[serde(flatten)]
    pub crop: Crop,
    pub stage_age_minutes: i64,
    pub time_to_next_stage_minutes: Option<i64>,
    pub stage_age_display: String,
    pub expected_harvest_at: Option<DateTime<Utc>>,
}

impl CropView {
    pub fn build(crop: Crop, recipe: Option<&Recipe>, now: DateTime<Utc>) -> Self {
        let stage = crop.stage();
        let entered_at = stage.and_then(|s| crop.stage_timestamps().get(s));

        let stage_age_minutes = entered_at
            .map(|at| (now - at).num_minutes().max(0))
            .unwrap_or(0);

        let time_to_next_stage_minutes = match (stage, entered_at, recipe) {
            (Some(stage), Some(entered), Some(recipe)) if !stage.is_terminal() => {
                let boundary = entered + recipe.stage_duration(stage);
                Some((boundary - now).num_minutes())
            }
            _ => None,
        };

        let expected_harvest_at = match (recipe, crop.planting_at) {
            (Some(recipe), Some(planted)) => Some(recipe.expected_harvest_at(planted)),
            _ => None,
        };

        CropView {
            stage_age_minutes,
            time_to_next_stage_minutes,
            stage_age_display: format_minutes(stage_age_minutes),
            expected_harvest_at,
            crop,
        }
    }
}

/// Render a minute count as "2d 4h" / "3h 10m" / "45m"
pub fn format_minutes(total: i64) -> String {
    let total = total.max(0);
    let days = total / 1440;
    let hours = (total % 1440) / 60;
    let minutes = total % 60;
    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn crop_at_germination() -> Crop {
        let planted = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
        Crop {
            id: Uuid::new_v4(),
            recipe_id: Uuid::new_v4(),
            tray_number: "A-1".to_string(),
            tray_count: 1,
            planting_at: Some(planted),
            soaking_at: None,
            germination_at: Some(planted),
            blackout_at: None,
            light_at: None,
            harvested_at: None,
            current_stage: "germination".to_string(),
            watering_suspended_at: None,
            harvest_weight_grams: None,
            created_at: planted,
            updated_at: planted,
        }
    }

    #[test]
    fn test_update_current_stage_reports_change() {
        let mut crop = crop_at_germination();
        assert!(!crop.update_current_stage());

        crop.blackout_at = Some(crop.germination_at.unwrap() + chrono::Duration::days(3));
        assert!(crop.update_current_stage());
        assert_eq!(crop.current_stage, "blackout");
    }

    #[test]
    fn test_days_in_current_stage() {
        let crop = crop_at_germination();
        let now = crop.germination_at.unwrap() + chrono::Duration::days(2)
            + chrono::Duration::hours(5);
        assert_eq!(crop.days_in_current_stage(now), 2);
    }

    #[test]
    fn test_days_in_current_stage_unset_timestamp() {
        let mut crop = crop_at_germination();
        crop.germination_at = None;
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 6, 0, 0).unwrap();
        assert_eq!(crop.days_in_current_stage(now), 0);
    }

    #[test]
    fn test_view_derives_age_and_next_boundary() {
        let crop = crop_at_germination();
        let recipe = Recipe {
            id: crop.recipe_id,
            name: "Sunflower".to_string(),
            germination_days: Decimal::from(3),
            blackout_days: Decimal::from(2),
            light_days: Decimal::from(7),
            seed_soak_hours: Decimal::ZERO,
            suspend_water_hours: Decimal::from(24),
            days_to_maturity: None,
            lot_id: None,
        };
        let now = crop.germination_at.unwrap() + chrono::Duration::days(1);
        let view = CropView::build(crop, Some(&recipe), now);
        assert_eq!(view.stage_age_minutes, 1440);
        assert_eq!(view.time_to_next_stage_minutes, Some(2 * 1440));
        assert_eq!(view.stage_age_display, "1d 0h");
        assert!(view.expected_harvest_at.is_some());
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(45), "45m");
        assert_eq!(format_minutes(190), "3h 10m");
        assert_eq!(format_minutes(2 * 1440 + 4 * 60), "2d 4h");
    }
}
