//! Proximity Engine: debounced NEAR/FAR state machine
//!
//! State transitions:
//! - any → NEAR: rssi > threshold (counter reset to 0, no partial decay)
//! - any → FAR: rssi <= threshold, no rssi, not seen, or scan failure (counter + 1)
//! - FAR → LOCKED: counter >= required_count (terminal, reported once)

use crate::types::{ProximityState, ReasonCode, Reading, SampleReport, TrustRecord};

/// Proximity state machine engine
#[derive(Debug, Clone)]
pub struct ProximityEngine {
    /// Current state
    state: ProximityState,
    /// Readings at or below this are far
    threshold: i32,
    /// Far samples needed to lock
    required_count: u32,
    /// Consecutive far samples
    far_count: u32,
    /// Last known signal strength
    last_rssi: Option<i32>,
    /// Number of samples processed
    sample_count: u64,
    /// Last reason emitted
    last_reason: ReasonCode,
    /// Last reading processed
    last_reading: Reading,
}

impl ProximityEngine {
    /// Create new engine; `required_count` is raised to at least 1
    pub fn new(threshold: i32, required_count: u32) -> Self {
        Self {
            state: ProximityState::Near,
            threshold,
            required_count: required_count.max(1),
            far_count: 0,
            last_rssi: None,
            sample_count: 0,
            last_reason: ReasonCode::R101_NEAR,
            last_reading: Reading::NotSeen,
        }
    }

    /// Engine configured from a trust record
    pub fn from_record(record: &TrustRecord) -> Self {
        Self::new(record.rssi_threshold, record.required_count())
    }

    /// Update with a new reading, return the report for this sample
    pub fn update(&mut self, reading: Reading) -> SampleReport {
        self.sample_count += 1;
        self.last_reading = reading;

        if self.state == ProximityState::Locked {
            self.last_reason = ReasonCode::R103_ALREADY_LOCKED;
            return self.report();
        }

        if let Some(rssi) = reading.rssi() {
            self.last_rssi = Some(rssi);
        }

        let reason = match reading {
            Reading::Seen(rssi) if rssi > self.threshold => {
                let reason = if self.far_count > 0 {
                    ReasonCode::R101_NEAR_COUNTER_RESET
                } else {
                    ReasonCode::R101_NEAR
                };
                self.far_count = 0;
                self.state = ProximityState::Near;
                reason
            }
            _ => {
                self.far_count += 1;
                self.state = ProximityState::Far;
                match reading {
                    Reading::Seen(_) => ReasonCode::R102_FAR_WEAK_SIGNAL,
                    Reading::Unknown => ReasonCode::R102_FAR_NO_RSSI,
                    Reading::NotSeen => ReasonCode::R102_FAR_NOT_SEEN,
                    Reading::ScanFailed => ReasonCode::R102_FAR_SCAN_FAILED,
                }
            }
        };

        self.last_reason = if self.far_count >= self.required_count {
            self.state = ProximityState::Locked;
            ReasonCode::R103_LOCK_TRIGGERED
        } else {
            reason
        };

        self.report()
    }

    fn report(&self) -> SampleReport {
        SampleReport::new(
            self.sample_count,
            self.last_reading,
            self.state,
            self.far_count,
            self.required_count,
            self.last_reason,
        )
    }

    /// Get current state
    pub fn state(&self) -> ProximityState {
        self.state
    }

    /// Get the far threshold
    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    /// Get consecutive far samples
    pub fn far_count(&self) -> u32 {
        self.far_count
    }

    /// Get far samples needed to lock
    pub fn required_count(&self) -> u32 {
        self.required_count
    }

    /// Get last known signal strength
    pub fn last_rssi(&self) -> Option<i32> {
        self.last_rssi
    }

    /// Get sample count
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Has the lock decision been emitted?
    pub fn is_locked(&self) -> bool {
        self.state == ProximityState::Locked
    }

    /// Get current output without updating
    pub fn current_output(&self) -> SampleReport {
        self.report()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_near() {
        let engine = ProximityEngine::new(-70, 3);
        assert_eq!(engine.state(), ProximityState::Near);
        assert_eq!(engine.far_count(), 0);
        assert!(!engine.is_locked());
    }

    #[test]
    fn test_threshold_is_inclusive_far() {
        let mut engine = ProximityEngine::new(-70, 3);
        let output = engine.update(Reading::Seen(-70));
        assert_eq!(output.state, ProximityState::Far);
        assert_eq!(output.far_count, 1);

        let output = engine.update(Reading::Seen(-69));
        assert_eq!(output.state, ProximityState::Near);
        assert_eq!(output.far_count, 0);
    }

    #[test]
    fn test_locks_on_required_count_not_before() {
        let mut engine = ProximityEngine::new(-70, 3);
        assert!(!engine.update(Reading::Seen(-75)).lock_triggered);
        assert!(!engine.update(Reading::NotSeen).lock_triggered);

        let output = engine.update(Reading::Unknown);
        assert!(output.lock_triggered);
        assert_eq!(output.state, ProximityState::Locked);
        assert_eq!(output.reason, ReasonCode::R103_LOCK_TRIGGERED);
    }

    #[test]
    fn test_strong_sample_resets_counter() {
        let mut engine = ProximityEngine::new(-70, 3);
        engine.update(Reading::NotSeen);
        engine.update(Reading::NotSeen);

        let output = engine.update(Reading::Seen(-50));
        assert_eq!(output.far_count, 0);
        assert_eq!(output.reason, ReasonCode::R101_NEAR_COUNTER_RESET);

        // Needs a full run again
        engine.update(Reading::NotSeen);
        engine.update(Reading::NotSeen);
        assert!(!engine.is_locked());
    }

    #[test]
    fn test_scan_failure_counts_as_far() {
        let mut engine = ProximityEngine::new(-70, 1);
        let output = engine.update(Reading::ScanFailed);
        assert!(output.lock_triggered);
    }

    #[test]
    fn test_lock_reported_once() {
        let mut engine = ProximityEngine::new(-70, 1);
        assert!(engine.update(Reading::NotSeen).lock_triggered);

        let output = engine.update(Reading::NotSeen);
        assert!(!output.lock_triggered);
        assert_eq!(output.reason, ReasonCode::R103_ALREADY_LOCKED);
        assert_eq!(engine.sample_count(), 2);
    }

    #[test]
    fn test_zero_required_count_raised_to_one() {
        let engine = ProximityEngine::new(-70, 0);
        assert_eq!(engine.required_count(), 1);
    }

    #[test]
    fn test_last_rssi_tracks_known_readings_only() {
        let mut engine = ProximityEngine::new(-70, 5);
        engine.update(Reading::Seen(-61));
        engine.update(Reading::NotSeen);
        assert_eq!(engine.last_rssi(), Some(-61));
    }
}
