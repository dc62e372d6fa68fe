//! Growing recipe read model
//!
//! Recipes are managed by the recipe-administration screens; the growth
//! engine reads them for stage durations and the seed lot reference.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stage::Stage;

/// Per-run growth parameters for a crop variety
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: Uuid,
    /// Variety name, e.g. "Sunflower" or "Pea Shoots"
    pub name: String,
    pub germination_days: Decimal,
    pub blackout_days: Decimal,
    pub light_days: Decimal,
    pub seed_soak_hours: Decimal,
    /// Offset before expected harvest at which watering stops
    pub suspend_water_hours: Decimal,
    /// Optional override of the sum of stage days
    pub days_to_maturity: Option<Decimal>,
    /// Seed lot consumed when planting against this recipe
    pub lot_id: Option<Uuid>,
}

/// Convert a fractional quantity of days/hours to whole minutes,
/// clamping below zero to zero
fn to_minutes(value: Decimal, minutes_per_unit: i64) -> i64 {
    (value * Decimal::from(minutes_per_unit))
        .round()
        .to_i64()
        .unwrap_or(0)
        .max(0)
}

impl Recipe {
    /// Validate recipe durations: no duration field may be negative
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.germination_days < Decimal::ZERO
            || self.blackout_days < Decimal::ZERO
            || self.light_days < Decimal::ZERO
        {
            return Err("Stage day fields cannot be negative");
        }
        if self.seed_soak_hours < Decimal::ZERO {
            return Err("Seed soak hours cannot be negative");
        }
        if self.suspend_water_hours < Decimal::ZERO {
            return Err("Suspend water hours cannot be negative");
        }
        if matches!(self.days_to_maturity, Some(d) if d < Decimal::ZERO) {
            return Err("Days to maturity cannot be negative");
        }
        Ok(())
    }

    /// Configured duration of a single stage. The terminal stage has no
    /// duration of its own.
    pub fn stage_duration(&self, stage: Stage) -> Duration {
        let minutes = match stage {
            Stage::Soaking => to_minutes(self.seed_soak_hours, 60),
            Stage::Germination => to_minutes(self.germination_days, 1440),
            Stage::Blackout => to_minutes(self.blackout_days, 1440),
            Stage::Light => to_minutes(self.light_days, 1440),
            Stage::Harvested => 0,
        };
        Duration::minutes(minutes)
    }

    /// Time from planting to expected harvest: the maturity override if
    /// set, otherwise the sum of the three growing stages
    pub fn total_grow_duration(&self) -> Duration {
        if let Some(maturity) = self.days_to_maturity {
            return Duration::minutes(to_minutes(maturity, 1440));
        }
        self.stage_duration(Stage::Germination)
            + self.stage_duration(Stage::Blackout)
            + self.stage_duration(Stage::Light)
    }

    pub fn expected_harvest_at(&self, planting_at: DateTime<Utc>) -> DateTime<Utc> {
        planting_at + self.total_grow_duration()
    }

    /// The next stage a crop at `current` should advance into, skipping
    /// any stage whose configured duration is zero. The terminal stage is
    /// never skipped. Returns None when already at the terminal stage.
    pub fn next_applicable_stage(&self, current: Stage) -> Option<Stage> {
        let mut stage = current.next()?;
        loop {
            if stage.is_terminal() || self.stage_duration(stage) > Duration::zero() {
                return Some(stage);
            }
            stage = stage.next()?;
        }
    }

    /// Absolute offset from planting at which a stage begins. Only stages
    /// that start after planting have one; soaking happens before
    /// planting and germination begins at planting.
    pub fn stage_start_offset(&self, stage: Stage) -> Option<Duration> {
        match stage {
            Stage::Soaking | Stage::Germination => None,
            Stage::Blackout => Some(self.stage_duration(Stage::Germination)),
            Stage::Light => Some(
                self.stage_duration(Stage::Germination) + self.stage_duration(Stage::Blackout),
            ),
            Stage::Harvested => Some(self.total_grow_duration()),
        }
    }

    /// Instant at which watering should stop, or None when the recipe
    /// does not suspend watering
    pub fn suspend_watering_at(&self, planting_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let offset = to_minutes(self.suspend_water_hours, 60);
        if offset <= 0 {
            return None;
        }
        Some(self.expected_harvest_at(planting_at) - Duration::minutes(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn recipe(germination: i64, blackout: i64, light: i64) -> Recipe {
        Recipe {
            id: Uuid::new_v4(),
            name: "Sunflower".to_string(),
            germination_days: Decimal::from(germination),
            blackout_days: Decimal::from(blackout),
            light_days: Decimal::from(light),
            seed_soak_hours: Decimal::from(8),
            suspend_water_hours: Decimal::from(24),
            days_to_maturity: None,
            lot_id: None,
        }
    }

    #[test]
    fn test_next_applicable_stage_skips_zero_duration() {
        let r = recipe(3, 0, 7);
        assert_eq!(r.next_applicable_stage(Stage::Germination), Some(Stage::Light));
    }

    #[test]
    fn test_next_applicable_stage_terminal_is_none() {
        let r = recipe(3, 2, 7);
        assert_eq!(r.next_applicable_stage(Stage::Harvested), None);
    }

    #[test]
    fn test_next_applicable_stage_never_skips_harvest() {
        // Even with a zero light stage, harvest remains reachable
        let r = recipe(3, 0, 0);
        assert_eq!(r.next_applicable_stage(Stage::Germination), Some(Stage::Harvested));
    }

    #[test]
    fn test_total_grow_duration_sums_stages() {
        let r = recipe(3, 2, 7);
        assert_eq!(r.total_grow_duration(), Duration::days(12));
    }

    #[test]
    fn test_maturity_override() {
        let mut r = recipe(3, 2, 7);
        r.days_to_maturity = Some(Decimal::from(10));
        assert_eq!(r.total_grow_duration(), Duration::days(10));
    }

    #[test]
    fn test_fractional_days() {
        let mut r = recipe(0, 0, 0);
        r.germination_days = Decimal::new(25, 1); // 2.5 days
        assert_eq!(r.stage_duration(Stage::Germination), Duration::hours(60));
    }

    #[test]
    fn test_suspend_watering_offset() {
        let r = recipe(3, 2, 7);
        let planted = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
        let suspend = r.suspend_watering_at(planted).unwrap();
        assert_eq!(suspend, r.expected_harvest_at(planted) - Duration::hours(24));
    }

    #[test]
    fn test_suspend_watering_disabled_when_zero() {
        let mut r = recipe(3, 2, 7);
        r.suspend_water_hours = Decimal::ZERO;
        let planted = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
        assert_eq!(r.suspend_watering_at(planted), None);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let mut r = recipe(3, 2, 7);
        r.blackout_days = Decimal::from(-1);
        assert!(r.validate().is_err());
        // Defensive: a negative value that slipped through behaves like zero
        assert_eq!(r.stage_duration(Stage::Blackout), Duration::zero());
    }
}
