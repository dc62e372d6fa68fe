//! Validation rules for the crop growth engine
//!
//! Every rule runs before a value is persisted; a violation is a hard
//! validation failure, never a silent correction. Rule functions return
//! every violated rule, not just the first.

use rust_decimal::Decimal;

use crate::models::stage::{Stage, StageTimestamps};

/// Check that stage timestamps are chronologically consistent with the
/// stage order: for every pair of stages A before B where both are set,
/// A's timestamp must not be after B's. Each violation names both
/// offending stages.
pub fn validate_timestamp_sequence(timestamps: &StageTimestamps) -> Vec<String> {
    let mut errors = Vec::new();
    for (i, earlier) in Stage::ORDERED.iter().enumerate() {
        let Some(earlier_at) = timestamps.get(*earlier) else {
            continue;
        };
        for later in &Stage::ORDERED[i + 1..] {
            if let Some(later_at) = timestamps.get(*later) {
                if earlier_at > later_at {
                    errors.push(format!(
                        "{} timestamp is after {} timestamp",
                        earlier.display_name(),
                        later.display_name()
                    ));
                }
            }
        }
    }
    errors
}

/// Field-level crop rules that need no database access. Reference checks
/// (recipe exists, stage code exists) live in the crop service.
pub fn validate_crop_fields(
    tray_count: i32,
    current_stage: &str,
    harvest_weight_grams: Option<Decimal>,
) -> Vec<String> {
    let mut errors = Vec::new();
    if tray_count <= 0 {
        errors.push("Tray count must be greater than 0".to_string());
    }
    if Stage::from_str(current_stage).is_none() {
        errors.push(format!("Unknown stage code: {}", current_stage));
    }
    if matches!(harvest_weight_grams, Some(w) if w < Decimal::ZERO) {
        errors.push("Harvest weight cannot be negative".to_string());
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 6, 0, 0).unwrap()
    }

    #[test]
    fn test_monotonic_sequence_is_valid() {
        let ts = StageTimestamps {
            soaking_at: Some(at(1)),
            germination_at: Some(at(1)),
            blackout_at: Some(at(4)),
            light_at: Some(at(6)),
            harvested_at: Some(at(13)),
        };
        assert!(validate_timestamp_sequence(&ts).is_empty());
    }

    #[test]
    fn test_out_of_order_names_both_stages() {
        let ts = StageTimestamps {
            germination_at: Some(at(5)),
            blackout_at: Some(at(2)),
            ..Default::default()
        };
        let errors = validate_timestamp_sequence(&ts);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Germination"));
        assert!(errors[0].contains("Blackout"));
    }

    #[test]
    fn test_all_violations_reported() {
        let ts = StageTimestamps {
            germination_at: Some(at(10)),
            blackout_at: Some(at(2)),
            light_at: Some(at(4)),
            ..Default::default()
        };
        // germination > blackout and germination > light
        assert_eq!(validate_timestamp_sequence(&ts).len(), 2);
    }

    #[test]
    fn test_equal_timestamps_allowed() {
        let ts = StageTimestamps {
            soaking_at: Some(at(1)),
            germination_at: Some(at(1)),
            ..Default::default()
        };
        assert!(validate_timestamp_sequence(&ts).is_empty());
    }

    #[test]
    fn test_crop_field_rules_accumulate() {
        let errors = validate_crop_fields(0, "sprouting", Some(Decimal::from(-5)));
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_crop_field_rules_pass() {
        assert!(validate_crop_fields(2, "light", Some(Decimal::from(180))).is_empty());
    }
}
