//! Integration tests for the proximity path
//!
//! Tests: pairing-time rssi → derived threshold → TrustRecord → ProximityEngine → report

use proxlock::core::{derive_threshold, ProximityEngine};
use proxlock::types::{required_count, ProximityState, ReasonCode, Reading, SignalQuality, TrustRecord};
use pretty_assertions::assert_eq;

fn record_paired_at(rssi: i32) -> TrustRecord {
    TrustRecord {
        device_address: Some("AA:BB:CC:DD:EE:FF".to_string()),
        device_name: Some("iPhone".to_string()),
        rssi_threshold: derive_threshold(Some(rssi)),
        paired_rssi: Some(rssi),
        ..Default::default()
    }
}

/// Test the full path from a paired record to a lock decision
#[test]
fn test_full_path_to_lock() {
    let record = record_paired_at(-55);
    assert_eq!(record.rssi_threshold, -70);
    assert_eq!(record.required_count(), 3);

    let mut engine = ProximityEngine::from_record(&record);
    let readings = [Reading::Seen(-58), Reading::Seen(-72), Reading::NotSeen, Reading::Seen(-70)];
    let reports: Vec<_> = readings.iter().map(|r| engine.update(*r)).collect();

    assert_eq!(reports[0].state, ProximityState::Near);
    assert_eq!(reports[1].far_count, 1);
    assert_eq!(reports[2].far_count, 2);
    assert!(!reports[2].lock_triggered);
    assert!(reports[3].lock_triggered);
    assert_eq!(reports[3].state, ProximityState::Locked);
}

/// Strong samples forever never lock
#[test]
fn test_all_strong_never_locks() {
    let mut engine = ProximityEngine::new(-70, 1);
    for rssi in [-40, -69, -55, -61, -50].iter().cycle().take(200) {
        let report = engine.update(Reading::Seen(*rssi));
        assert_eq!(report.far_count, 0);
        assert!(!report.lock_triggered);
    }
    assert_eq!(engine.sample_count(), 200);
}

/// Lock lands exactly on the required count, for several counts
#[test]
fn test_lock_on_exact_count() {
    for required in 1..=6u32 {
        let mut engine = ProximityEngine::new(-70, required);
        for i in 1..=required {
            let report = engine.update(Reading::Seen(-85));
            assert_eq!(report.lock_triggered, i == required, "required={} i={}", required, i);
        }
    }
}

/// One strong sample in a run of weak ones restarts the count
#[test]
fn test_interrupted_run_needs_full_count_again() {
    let mut engine = ProximityEngine::new(-70, 3);
    engine.update(Reading::NotSeen);
    engine.update(Reading::NotSeen);
    let reset = engine.update(Reading::Seen(-60));
    assert_eq!(reset.reason, ReasonCode::R101_NEAR_COUNTER_RESET);

    assert!(!engine.update(Reading::Unknown).lock_triggered);
    assert!(!engine.update(Reading::ScanFailed).lock_triggered);
    assert!(engine.update(Reading::NotSeen).lock_triggered);
}

/// Reports carry observability fields that do not affect the decision
#[test]
fn test_reports_carry_quality_and_distance() {
    let mut engine = ProximityEngine::new(-90, 5);
    let report = engine.update(Reading::Seen(-85));
    assert_eq!(report.state, ProximityState::Near);
    assert_eq!(report.quality, SignalQuality::VeryWeak);
    assert_eq!(report.distance, "Very Far (>20m)");

    let report = engine.update(Reading::NotSeen);
    assert_eq!(report.quality, SignalQuality::Unknown);
    assert_eq!(report.reason, ReasonCode::R102_FAR_NOT_SEEN);
}

#[test]
fn test_required_count_examples() {
    assert_eq!(required_count(10, 3), 3);
    assert_eq!(required_count(4, 10), 1);
    assert_eq!(required_count(10, 5), 2);
    assert_eq!(required_count(60, 1), 60);
}

#[test]
fn test_parseable_output_shape() {
    let mut engine = ProximityEngine::new(-70, 3);
    let report = engine.update(Reading::Seen(-75));
    assert_eq!(
        report.to_parseable_string(),
        "seq=1 | rssi=-75 | quality=WEAK | state=FAR | far=1/3 | reason=R102_FAR_WEAK_SIGNAL"
    );
}
