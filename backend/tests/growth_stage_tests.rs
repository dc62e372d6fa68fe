//! Growth stage derivation and timestamp chronology tests
//!
//! Covers:
//! - Stage derivation from timestamp presence (highest order wins)
//! - Timestamp sequence validation naming both offending stages
//! - Planting-date shifts preserving relative offsets

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use shared::{validate_timestamp_sequence, Stage, StageTimestamps};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[test]
fn test_no_timestamps_defaults_to_germination() {
    assert_eq!(StageTimestamps::default().calculate_stage(), Stage::Germination);
}

#[test]
fn test_single_timestamp_returns_matching_stage() {
    for stage in Stage::ORDERED {
        let mut ts = StageTimestamps::default();
        ts.set(stage, Some(base()));
        assert_eq!(ts.calculate_stage(), stage, "stage {:?}", stage);
    }
}

#[test]
fn test_multiple_timestamps_highest_order_wins() {
    let ts = StageTimestamps {
        germination_at: Some(base()),
        blackout_at: Some(base() + Duration::days(3)),
        ..Default::default()
    };
    assert_eq!(ts.calculate_stage(), Stage::Blackout);

    let ts = StageTimestamps {
        soaking_at: Some(base()),
        germination_at: Some(base()),
        light_at: Some(base() + Duration::days(5)),
        ..Default::default()
    };
    assert_eq!(ts.calculate_stage(), Stage::Light);
}

#[test]
fn test_blackout_before_germination_is_flagged() {
    let ts = StageTimestamps {
        germination_at: Some(base() + Duration::days(2)),
        blackout_at: Some(base()),
        ..Default::default()
    };
    let errors = validate_timestamp_sequence(&ts);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Germination"));
    assert!(errors[0].contains("Blackout"));
}

#[test]
fn test_monotonic_sequence_has_no_errors() {
    let ts = StageTimestamps {
        soaking_at: Some(base() - Duration::hours(8)),
        germination_at: Some(base()),
        blackout_at: Some(base() + Duration::days(3)),
        light_at: Some(base() + Duration::days(5)),
        harvested_at: Some(base() + Duration::days(12)),
    };
    assert!(validate_timestamp_sequence(&ts).is_empty());
}

#[test]
fn test_shift_forward_two_days() {
    let mut ts = StageTimestamps {
        germination_at: Some(base()),
        blackout_at: Some(base() + Duration::days(3)),
        ..Default::default()
    };
    ts.shift(Duration::days(2));
    assert_eq!(ts.germination_at, Some(base() + Duration::days(2)));
    assert_eq!(ts.blackout_at, Some(base() + Duration::days(5)));
    assert_eq!(ts.light_at, None);
    assert_eq!(ts.harvested_at, None);
}

// ============================================================================
// Property Tests
// ============================================================================

prop_compose! {
    /// Arbitrary subset of stages with increasing timestamps
    fn increasing_timestamps()(mask in 1u8..32) -> StageTimestamps {
        let mut ts = StageTimestamps::default();
        for (i, stage) in Stage::ORDERED.iter().enumerate() {
            if mask & (1 << i) != 0 {
                ts.set(*stage, Some(base() + Duration::days(i as i64)));
            }
        }
        ts
    }
}

proptest! {
    #[test]
    fn prop_increasing_timestamps_always_validate(ts in increasing_timestamps()) {
        prop_assert!(validate_timestamp_sequence(&ts).is_empty());
    }

    #[test]
    fn prop_derived_stage_has_a_timestamp(ts in increasing_timestamps()) {
        let stage = ts.calculate_stage();
        prop_assert!(ts.get(stage).is_some());
    }

    #[test]
    fn prop_no_later_stage_has_a_timestamp(ts in increasing_timestamps()) {
        let stage = ts.calculate_stage();
        for later in Stage::ORDERED {
            if later.sort_order() > stage.sort_order() {
                prop_assert!(ts.get(later).is_none());
            }
        }
    }

    #[test]
    fn prop_shift_preserves_relative_offsets(
        ts in increasing_timestamps(),
        delta_hours in -96i64..96,
    ) {
        let delta = Duration::hours(delta_hours);
        let mut shifted = ts;
        shifted.shift(delta);
        for stage in Stage::ORDERED {
            match (ts.get(stage), shifted.get(stage)) {
                (Some(before), Some(after)) => prop_assert_eq!(after - before, delta),
                (None, None) => {}
                _ => prop_assert!(false, "shift changed which timestamps are set"),
            }
        }
    }

    #[test]
    fn prop_shift_never_introduces_violations(
        ts in increasing_timestamps(),
        delta_hours in -96i64..96,
    ) {
        let mut shifted = ts;
        shifted.shift(Duration::hours(delta_hours));
        prop_assert!(validate_timestamp_sequence(&shifted).is_empty());
    }
}
