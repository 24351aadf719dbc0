//! Pairing Selector: picks the trusted device and derives its lock parameters
//!
//! - one candidate → selected unconditionally
//! - several → strongest rssi, missing rssi weakest, ties keep input order
//! - threshold = max(rssi - 15, -80), or -70 when rssi is unknown

use chrono::Utc;
use tracing::info;

use crate::core::TrustStore;
use crate::error::{ProxlockError, Result};
use crate::types::{CandidateDevice, Confirmation, TrustRecord};
use crate::{
    DEFAULT_RSSI_THRESHOLD, DEFAULT_LOCK_DELAY_SECS, DEFAULT_SCAN_INTERVAL_SECS,
    THRESHOLD_MARGIN_DBM, THRESHOLD_FLOOR_DBM,
};

/// Chooses a candidate and persists the resulting trust record
#[derive(Debug, Clone)]
pub struct PairingSelector {
    store: TrustStore,
}

impl PairingSelector {
    pub fn new(store: TrustStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &TrustStore {
        &self.store
    }

    /// Select, derive, persist. Nothing is kept if the write fails.
    pub fn select(
        &self,
        candidates: &[CandidateDevice],
        confirmation: &Confirmation,
    ) -> Result<TrustRecord> {
        let selected = choose_candidate(candidates).ok_or(ProxlockError::NoCandidates)?;

        // auto-lock is a user preference; it survives re-pairing
        let auto_lock_enabled = self
            .store
            .load()
            .map(|previous| previous.auto_lock_enabled)
            .unwrap_or(true);

        let record = TrustRecord {
            device_address: Some(selected.address.clone()),
            device_name: Some(selected.display_name().to_string()),
            rssi_threshold: derive_threshold(selected.rssi),
            lock_delay_seconds: DEFAULT_LOCK_DELAY_SECS,
            scan_interval_seconds: DEFAULT_SCAN_INTERVAL_SECS,
            auto_lock_enabled,
            paired_rssi: selected.rssi,
            paired_at: Some(Utc::now()),
        };

        self.store.save(&record)?;

        info!(
            address = %selected.address,
            name = selected.display_name(),
            rssi = ?selected.rssi,
            threshold = record.rssi_threshold,
            candidates = candidates.len(),
            client = confirmation.remote_addr.as_deref().unwrap_or("unknown"),
            user_agent = confirmation.user_agent.as_deref().unwrap_or("-"),
            "Paired with device"
        );
        Ok(record)
    }
}

/// Deterministic pick; `None` only for an empty set
pub fn choose_candidate(candidates: &[CandidateDevice]) -> Option<&CandidateDevice> {
    if let [only] = candidates {
        return Some(only);
    }
    // max_by returns the last maximum; fold keeps the first
    candidates.iter().fold(None, |best: Option<&CandidateDevice>, candidate| match best {
        Some(current) if candidate.signal_cmp(current).is_le() => Some(current),
        _ => Some(candidate),
    })
}

/// Lock threshold derived from the signal seen at pairing time
pub fn derive_threshold(observed_rssi: Option<i32>) -> i32 {
    match observed_rssi {
        Some(rssi) => rssi.saturating_sub(THRESHOLD_MARGIN_DBM).max(THRESHOLD_FLOOR_DBM),
        None => DEFAULT_RSSI_THRESHOLD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_threshold_examples() {
        assert_eq!(derive_threshold(Some(-55)), -70);
        assert_eq!(derive_threshold(Some(-68)), -80);
        assert_eq!(derive_threshold(Some(-90)), -80);
        assert_eq!(derive_threshold(None), -70);
    }

    #[test]
    fn test_threshold_follows_close_pairing() {
        // no upper cap: a phone right next to the host keeps the full margin
        for rssi in [-10, -20, -40, -44] {
            assert_eq!(derive_threshold(Some(rssi)), (rssi - 15).max(-80));
        }
        assert_eq!(derive_threshold(Some(-10)), -25);
        assert_eq!(derive_threshold(Some(-65)), -80);
    }

    #[test]
    fn test_single_candidate_without_rssi_selected() {
        let candidates = vec![CandidateDevice::new("AA:AA:AA:AA:AA:AA", None, None)];
        let chosen = choose_candidate(&candidates).unwrap();
        assert_eq!(chosen.address, "AA:AA:AA:AA:AA:AA");
    }

    #[test]
    fn test_strongest_wins_and_unknown_is_last() {
        let candidates = vec![
            CandidateDevice::new("AA:AA:AA:AA:AA:AA", None, None),
            CandidateDevice::new("BB:BB:BB:BB:BB:BB", None, Some(-90)),
            CandidateDevice::new("CC:CC:CC:CC:CC:CC", None, Some(-60)),
        ];
        assert_eq!(choose_candidate(&candidates).unwrap().address, "CC:CC:CC:CC:CC:CC");

        let all_unknown_but_one = vec![
            CandidateDevice::new("AA:AA:AA:AA:AA:AA", None, None),
            CandidateDevice::new("BB:BB:BB:BB:BB:BB", None, Some(-99)),
        ];
        assert_eq!(
            choose_candidate(&all_unknown_but_one).unwrap().address,
            "BB:BB:BB:BB:BB:BB"
        );
    }

    #[test]
    fn test_ties_keep_first() {
        let candidates = vec![
            CandidateDevice::new("AA:AA:AA:AA:AA:AA", None, Some(-60)),
            CandidateDevice::new("BB:BB:BB:BB:BB:BB", None, Some(-60)),
        ];
        assert_eq!(choose_candidate(&candidates).unwrap().address, "AA:AA:AA:AA:AA:AA");
    }

    #[test]
    fn test_empty_set_fails() {
        let dir = tempdir().unwrap();
        let selector = PairingSelector::new(TrustStore::new(dir.path().join("trust.json")));
        let err = selector.select(&[], &Confirmation::default()).unwrap_err();
        assert!(matches!(err, ProxlockError::NoCandidates));
        assert!(!selector.store().path().exists());
    }

    #[test]
    fn test_select_persists_record() {
        let dir = tempdir().unwrap();
        let selector = PairingSelector::new(TrustStore::new(dir.path().join("trust.json")));
        let candidates = vec![CandidateDevice::new("AA:AA:AA:AA:AA:AA", Some("iPhone"), Some(-55))];

        let record = selector.select(&candidates, &Confirmation::default()).unwrap();
        assert_eq!(record.rssi_threshold, -70);
        assert_eq!(record.lock_delay_seconds, 10);
        assert_eq!(record.scan_interval_seconds, 3);
        assert_eq!(record.paired_rssi, Some(-55));

        let stored = selector.store().load().unwrap();
        assert_eq!(stored, record);
    }

    #[test]
    fn test_auto_lock_preference_survives_repair() {
        let dir = tempdir().unwrap();
        let store = TrustStore::new(dir.path().join("trust.json"));
        store
            .save(&TrustRecord { auto_lock_enabled: false, ..Default::default() })
            .unwrap();

        let selector = PairingSelector::new(store);
        let candidates = vec![CandidateDevice::new("AA:AA:AA:AA:AA:AA", None, Some(-50))];
        let record = selector.select(&candidates, &Confirmation::default()).unwrap();
        assert!(!record.auto_lock_enabled);
    }
}
