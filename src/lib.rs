//! proxlock: lock the host when the paired phone walks away
//!
//! Pairing → TrustRecord → ProximityEngine ← SampleSource; ProximityEngine → LockActuator

pub mod core;
pub mod error;
pub mod types;

pub use error::{ProxlockError, Result};

// =============================================================================
// THRESHOLDS [C] - dBm, more negative = weaker
// =============================================================================

/// Margin subtracted from the pairing-time signal to derive the lock threshold
pub const THRESHOLD_MARGIN_DBM: i32 = 15;

/// Derived thresholds never go below this floor
pub const THRESHOLD_FLOOR_DBM: i32 = -80;

/// Weakest threshold accepted by a settings update
pub const THRESHOLD_MIN_DBM: i32 = -100;

/// Strongest threshold accepted by a settings update
pub const THRESHOLD_MAX_DBM: i32 = -30;

/// Threshold used when the paired device reported no signal strength
pub const DEFAULT_RSSI_THRESHOLD: i32 = -70;

// =============================================================================
// SIGNAL QUALITY CUTOFFS [C] - observability only, never gate the lock
// =============================================================================

pub const QUALITY_EXCELLENT_DBM: i32 = -50;
pub const QUALITY_GOOD_DBM: i32 = -60;
pub const QUALITY_FAIR_DBM: i32 = -70;
pub const QUALITY_WEAK_DBM: i32 = -80;

// =============================================================================
// TIMING [C]
// =============================================================================

/// Sustained absence required before locking (seconds)
pub const DEFAULT_LOCK_DELAY_SECS: u64 = 10;

/// Nominal spacing between samples (seconds)
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 3;

/// Longest a single sample may listen for the target (milliseconds)
pub const SAMPLE_WINDOW_MS: u64 = 2000;

/// Discovery window used by `setup` (seconds)
pub const DISCOVERY_WINDOW_SECS: u64 = 10;

/// Pairing handshake deadline from entry into AWAITING_CONFIRMATION (seconds)
pub const PAIRING_TIMEOUT_SECS: u64 = 300;

/// Upper bound on a single lock attempt (milliseconds)
pub const LOCK_TIMEOUT_MS: u64 = 5000;

/// Lock delay bounds for settings updates (seconds)
pub const LOCK_DELAY_MIN_SECS: u64 = 5;
pub const LOCK_DELAY_MAX_SECS: u64 = 60;

/// Scan interval bounds for settings updates (seconds)
pub const SCAN_INTERVAL_MIN_SECS: u64 = 1;
pub const SCAN_INTERVAL_MAX_SECS: u64 = 60;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
