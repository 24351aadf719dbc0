//! Reason codes attached to every sample report

use serde::{Deserialize, Serialize};

/// Why the engine is in its current state after a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum ReasonCode {
    // =========================================================================
    // R101: Near
    // =========================================================================
    /// Signal above threshold
    R101_NEAR,
    /// Signal above threshold after a far run, counter reset
    R101_NEAR_COUNTER_RESET,

    // =========================================================================
    // R102: Far
    // =========================================================================
    /// Signal at or below threshold
    R102_FAR_WEAK_SIGNAL,
    /// Device seen without signal strength
    R102_FAR_NO_RSSI,
    /// Device not observed this cycle
    R102_FAR_NOT_SEEN,
    /// Scanner failed, treated as not seen
    R102_FAR_SCAN_FAILED,

    // =========================================================================
    // R103: Lock
    // =========================================================================
    /// Far run reached the required count
    R103_LOCK_TRIGGERED,
    /// Engine already locked, sample ignored
    R103_ALREADY_LOCKED,
}

impl ReasonCode {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::R101_NEAR => "R101_NEAR",
            Self::R101_NEAR_COUNTER_RESET => "R101_NEAR_COUNTER_RESET",
            Self::R102_FAR_WEAK_SIGNAL => "R102_FAR_WEAK_SIGNAL",
            Self::R102_FAR_NO_RSSI => "R102_FAR_NO_RSSI",
            Self::R102_FAR_NOT_SEEN => "R102_FAR_NOT_SEEN",
            Self::R102_FAR_SCAN_FAILED => "R102_FAR_SCAN_FAILED",
            Self::R103_LOCK_TRIGGERED => "R103_LOCK_TRIGGERED",
            Self::R103_ALREADY_LOCKED => "R103_ALREADY_LOCKED",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::R101_NEAR => "Device nearby",
            Self::R101_NEAR_COUNTER_RESET => "Device back in range, counter reset",
            Self::R102_FAR_WEAK_SIGNAL => "Signal at or below threshold",
            Self::R102_FAR_NO_RSSI => "Device seen without signal strength",
            Self::R102_FAR_NOT_SEEN => "Device not found",
            Self::R102_FAR_SCAN_FAILED => "Scan failed, counted as not found",
            Self::R103_LOCK_TRIGGERED => "Device consistently away, locking",
            Self::R103_ALREADY_LOCKED => "Already locked",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}
