//! Growth stages and stage derivation
//!
//! A crop's current stage is not stored as an independent state machine;
//! it is derived from which per-stage timestamps are populated. The
//! highest-order stage with a set timestamp wins.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Growth stage of a crop, totally ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Soaking,
    Germination,
    Blackout,
    Light,
    Harvested,
}

impl Stage {
    /// All stages in ascending growth order
    pub const ORDERED: [Stage; 5] = [
        Stage::Soaking,
        Stage::Germination,
        Stage::Blackout,
        Stage::Light,
        Stage::Harvested,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Soaking => "soaking",
            Stage::Germination => "germination",
            Stage::Blackout => "blackout",
            Stage::Light => "light",
            Stage::Harvested => "harvested",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "soaking" => Some(Stage::Soaking),
            "germination" => Some(Stage::Germination),
            "blackout" => Some(Stage::Blackout),
            "light" => Some(Stage::Light),
            "harvested" => Some(Stage::Harvested),
            _ => None,
        }
    }

    /// Human-readable stage name, as seeded in the crop_stages lookup table
    pub fn display_name(&self) -> &'static str {
        match self {
            Stage::Soaking => "Soaking",
            Stage::Germination => "Germination",
            Stage::Blackout => "Blackout",
            Stage::Light => "Light",
            Stage::Harvested => "Harvested",
        }
    }

    /// Position in the growth order
    pub fn sort_order(&self) -> i32 {
        match self {
            Stage::Soaking => 1,
            Stage::Germination => 2,
            Stage::Blackout => 3,
            Stage::Light => 4,
            Stage::Harvested => 5,
        }
    }

    /// The stage immediately after this one, ignoring recipe durations
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Soaking => Some(Stage::Germination),
            Stage::Germination => Some(Stage::Blackout),
            Stage::Blackout => Some(Stage::Light),
            Stage::Light => Some(Stage::Harvested),
            Stage::Harvested => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Harvested)
    }
}

/// The five nullable per-stage instants carried by a crop
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimestamps {
    pub soaking_at: Option<DateTime<Utc>>,
    pub germination_at: Option<DateTime<Utc>>,
    pub blackout_at: Option<DateTime<Utc>>,
    pub light_at: Option<DateTime<Utc>>,
    pub harvested_at: Option<DateTime<Utc>>,
}

impl StageTimestamps {
    pub fn get(&self, stage: Stage) -> Option<DateTime<Utc>> {
        match stage {
            Stage::Soaking => self.soaking_at,
            Stage::Germination => self.germination_at,
            Stage::Blackout => self.blackout_at,
            Stage::Light => self.light_at,
            Stage::Harvested => self.harvested_at,
        }
    }

    pub fn set(&mut self, stage: Stage, at: Option<DateTime<Utc>>) {
        match stage {
            Stage::Soaking => self.soaking_at = at,
            Stage::Germination => self.germination_at = at,
            Stage::Blackout => self.blackout_at = at,
            Stage::Light => self.light_at = at,
            Stage::Harvested => self.harvested_at = at,
        }
    }

    /// Derive the current stage: the highest-order stage with a set
    /// timestamp. A crop with no timestamps is assumed to have been
    /// planted the moment it exists, so the default is germination.
    pub fn calculate_stage(&self) -> Stage {
        for stage in Stage::ORDERED.iter().rev() {
            if self.get(*stage).is_some() {
                return *stage;
            }
        }
        Stage::Germination
    }

    /// Null every timestamp for stages after `target`, keeping earlier
    /// ones intact. Used when resetting a crop backward.
    pub fn clear_after(&mut self, target: Stage) {
        for stage in Stage::ORDERED {
            if stage.sort_order() > target.sort_order() {
                self.set(stage, None);
            }
        }
    }

    /// Shift every set timestamp by `delta`, preserving each stage's
    /// relative offset from planting. Unset timestamps stay unset.
    pub fn shift(&mut self, delta: Duration) {
        for stage in Stage::ORDERED {
            if let Some(at) = self.get(stage) {
                self.set(stage, Some(at + delta));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 6, 0, 0).unwrap()
    }

    #[test]
    fn test_stage_order_is_total() {
        let orders: Vec<i32> = Stage::ORDERED.iter().map(|s| s.sort_order()).collect();
        for pair in orders.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_calculate_stage_defaults_to_germination() {
        let ts = StageTimestamps::default();
        assert_eq!(ts.calculate_stage(), Stage::Germination);
    }

    #[test]
    fn test_calculate_stage_single_timestamp() {
        for stage in Stage::ORDERED {
            let mut ts = StageTimestamps::default();
            ts.set(stage, Some(at(1)));
            assert_eq!(ts.calculate_stage(), stage);
        }
    }

    #[test]
    fn test_calculate_stage_highest_order_wins() {
        let ts = StageTimestamps {
            germination_at: Some(at(1)),
            blackout_at: Some(at(4)),
            ..Default::default()
        };
        assert_eq!(ts.calculate_stage(), Stage::Blackout);
    }

    #[test]
    fn test_clear_after_preserves_earlier_stages() {
        let mut ts = StageTimestamps {
            germination_at: Some(at(1)),
            blackout_at: Some(at(4)),
            light_at: Some(at(6)),
            harvested_at: Some(at(13)),
            ..Default::default()
        };
        ts.clear_after(Stage::Blackout);
        assert_eq!(ts.germination_at, Some(at(1)));
        assert_eq!(ts.blackout_at, Some(at(4)));
        assert_eq!(ts.light_at, None);
        assert_eq!(ts.harvested_at, None);
    }

    #[test]
    fn test_shift_moves_only_set_timestamps() {
        let mut ts = StageTimestamps {
            germination_at: Some(at(1)),
            blackout_at: Some(at(4)),
            ..Default::default()
        };
        ts.shift(Duration::days(2));
        assert_eq!(ts.germination_at, Some(at(3)));
        assert_eq!(ts.blackout_at, Some(at(6)));
        assert_eq!(ts.light_at, None);
    }

    #[test]
    fn test_stage_roundtrip() {
        for stage in Stage::ORDERED {
            assert_eq!(Stage::from_str(stage.as_str()), Some(stage));
        }
        assert_eq!(Stage::from_str("parchment"), None);
    }
}
