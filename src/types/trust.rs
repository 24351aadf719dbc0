//! Trust record: the persisted outcome of pairing

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::error::{ProxlockError, Result};
use crate::{
    DEFAULT_RSSI_THRESHOLD, DEFAULT_LOCK_DELAY_SECS, DEFAULT_SCAN_INTERVAL_SECS,
    THRESHOLD_MIN_DBM, THRESHOLD_MAX_DBM,
    LOCK_DELAY_MIN_SECS, LOCK_DELAY_MAX_SECS,
    SCAN_INTERVAL_MIN_SECS, SCAN_INTERVAL_MAX_SECS,
};

/// Which device is trusted, and how far it may go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustRecord {
    /// Stable identifier of the trusted device; `None` before pairing
    pub device_address: Option<String>,
    /// Display label, best-effort
    pub device_name: Option<String>,
    /// Readings at or below this count as far (dBm)
    pub rssi_threshold: i32,
    /// Sustained absence before locking
    pub lock_delay_seconds: u64,
    /// Spacing between samples
    pub scan_interval_seconds: u64,
    /// When false the lock decision is reported but the host stays unlocked
    pub auto_lock_enabled: bool,
    /// Signal strength seen when pairing completed
    pub paired_rssi: Option<i32>,
    pub paired_at: Option<DateTime<Utc>>,
}

impl Default for TrustRecord {
    fn default() -> Self {
        Self {
            device_address: None,
            device_name: None,
            rssi_threshold: DEFAULT_RSSI_THRESHOLD,
            lock_delay_seconds: DEFAULT_LOCK_DELAY_SECS,
            scan_interval_seconds: DEFAULT_SCAN_INTERVAL_SECS,
            auto_lock_enabled: true,
            paired_rssi: None,
            paired_at: None,
        }
    }
}

impl TrustRecord {
    pub fn is_paired(&self) -> bool {
        self.device_address.is_some()
    }

    /// Address of the trusted device, or `NotPaired`
    pub fn address(&self) -> Result<&str> {
        self.device_address.as_deref().ok_or(ProxlockError::NotPaired)
    }

    pub fn display_name(&self) -> &str {
        self.device_name.as_deref().unwrap_or("Unknown Device")
    }

    /// Consecutive far samples needed before locking
    pub fn required_count(&self) -> u32 {
        required_count(self.lock_delay_seconds, self.scan_interval_seconds)
    }

    /// Apply a validated settings change; the record is untouched on error
    pub fn apply(&mut self, update: &SettingsUpdate) -> Result<()> {
        if let Some(threshold) = update.rssi_threshold {
            if !(THRESHOLD_MIN_DBM..=THRESHOLD_MAX_DBM).contains(&threshold) {
                return Err(ProxlockError::InvalidSetting {
                    field: "rssi_threshold",
                    reason: format!(
                        "{} dBm outside {}..={}",
                        threshold, THRESHOLD_MIN_DBM, THRESHOLD_MAX_DBM
                    ),
                });
            }
        }
        if let Some(delay) = update.lock_delay_seconds {
            if !(LOCK_DELAY_MIN_SECS..=LOCK_DELAY_MAX_SECS).contains(&delay) {
                return Err(ProxlockError::InvalidSetting {
                    field: "lock_delay_seconds",
                    reason: format!(
                        "{}s outside {}..={}",
                        delay, LOCK_DELAY_MIN_SECS, LOCK_DELAY_MAX_SECS
                    ),
                });
            }
        }
        if let Some(interval) = update.scan_interval_seconds {
            if !(SCAN_INTERVAL_MIN_SECS..=SCAN_INTERVAL_MAX_SECS).contains(&interval) {
                return Err(ProxlockError::InvalidSetting {
                    field: "scan_interval_seconds",
                    reason: format!(
                        "{}s outside {}..={}",
                        interval, SCAN_INTERVAL_MIN_SECS, SCAN_INTERVAL_MAX_SECS
                    ),
                });
            }
        }

        if let Some(threshold) = update.rssi_threshold {
            self.rssi_threshold = threshold;
        }
        if let Some(delay) = update.lock_delay_seconds {
            self.lock_delay_seconds = delay;
        }
        if let Some(interval) = update.scan_interval_seconds {
            self.scan_interval_seconds = interval;
        }
        if let Some(enabled) = update.auto_lock_enabled {
            self.auto_lock_enabled = enabled;
        }
        Ok(())
    }
}

/// `max(1, lock_delay / scan_interval)`; a zero interval is treated as 1s
pub fn required_count(lock_delay_seconds: u64, scan_interval_seconds: u64) -> u32 {
    let ratio = lock_delay_seconds / scan_interval_seconds.max(1);
    ratio.clamp(1, u32::MAX as u64) as u32
}

/// Partial settings change after pairing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub rssi_threshold: Option<i32>,
    #[serde(alias = "lock_delay")]
    pub lock_delay_seconds: Option<u64>,
    #[serde(alias = "scan_interval")]
    pub scan_interval_seconds: Option<u64>,
    pub auto_lock_enabled: Option<bool>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.rssi_threshold.is_none()
            && self.lock_delay_seconds.is_none()
            && self.scan_interval_seconds.is_none()
            && self.auto_lock_enabled.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_required_count_examples() {
        assert_eq!(required_count(10, 3), 3);
        assert_eq!(required_count(4, 10), 1);
        assert_eq!(required_count(10, 5), 2);
        assert_eq!(required_count(10, 0), 10);
    }

    #[test]
    fn test_defaults_before_pairing() {
        let record = TrustRecord::default();
        assert!(!record.is_paired());
        assert!(matches!(record.address(), Err(ProxlockError::NotPaired)));
        assert_eq!(record.rssi_threshold, -70);
        assert_eq!(record.required_count(), 3);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let record: TrustRecord =
            serde_json::from_str(r#"{"device_address": "AA:BB:CC:DD:EE:FF"}"#).unwrap();
        assert_eq!(record.device_address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(record.lock_delay_seconds, 10);
        assert_eq!(record.scan_interval_seconds, 3);
        assert!(record.auto_lock_enabled);
    }

    #[test]
    fn test_apply_rejects_out_of_range_without_partial_change() {
        let mut record = TrustRecord::default();
        let update = SettingsUpdate {
            rssi_threshold: Some(-75),
            lock_delay_seconds: Some(120),
            ..Default::default()
        };
        let err = record.apply(&update).unwrap_err();
        assert!(matches!(err, ProxlockError::InvalidSetting { field: "lock_delay_seconds", .. }));
        assert_eq!(record, TrustRecord::default());
    }

    #[test]
    fn test_apply_updates_fields() {
        let mut record = TrustRecord::default();
        record
            .apply(&SettingsUpdate {
                rssi_threshold: Some(-85),
                scan_interval_seconds: Some(5),
                auto_lock_enabled: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(record.rssi_threshold, -85);
        assert_eq!(record.scan_interval_seconds, 5);
        assert!(!record.auto_lock_enabled);
        assert_eq!(record.required_count(), 2);
    }
}
