//! Candidate devices found during discovery

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A device observed during a discovery window, not yet trusted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDevice {
    pub address: String,
    pub name: Option<String>,
    pub rssi: Option<i32>,
}

impl CandidateDevice {
    pub fn new(address: impl Into<String>, name: Option<&str>, rssi: Option<i32>) -> Self {
        Self {
            address: address.into(),
            name: name.map(str::to_string),
            rssi,
        }
    }

    /// Name for display, with a placeholder for silent advertisers
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown Device")
    }

    /// Order by signal strength; a missing reading is weaker than any value
    pub fn signal_cmp(&self, other: &Self) -> Ordering {
        compare_rssi(self.rssi, other.rssi)
    }
}

/// `None` sorts below every `Some`
pub fn compare_rssi(a: Option<i32>, b: Option<i32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Fold repeated sightings into one candidate per address
///
/// Keeps the strongest reading, fills in a name if any sighting had one, and
/// returns candidates strongest first. Addresses compare case-insensitively.
pub fn merge_sightings<I>(sightings: I) -> Vec<CandidateDevice>
where
    I: IntoIterator<Item = CandidateDevice>,
{
    let mut order: Vec<String> = Vec::new();
    let mut by_address: HashMap<String, CandidateDevice> = HashMap::new();

    for sighting in sightings {
        let key = sighting.address.to_ascii_uppercase();
        match by_address.get_mut(&key) {
            Some(existing) => {
                if existing.name.is_none() {
                    existing.name = sighting.name.clone();
                }
                if sighting.signal_cmp(existing) == Ordering::Greater {
                    existing.rssi = sighting.rssi;
                }
            }
            None => {
                order.push(key.clone());
                by_address.insert(key, sighting);
            }
        }
    }

    let mut merged: Vec<CandidateDevice> = order
        .into_iter()
        .filter_map(|key| by_address.remove(&key))
        .collect();
    // stable: equal signals keep first-seen order
    merged.sort_by(|a, b| b.signal_cmp(a));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_rssi_is_weakest() {
        assert_eq!(compare_rssi(Some(-99), None), Ordering::Greater);
        assert_eq!(compare_rssi(None, Some(-99)), Ordering::Less);
        assert_eq!(compare_rssi(None, None), Ordering::Equal);
    }

    #[test]
    fn test_merge_keeps_strongest_and_sorts() {
        let merged = merge_sightings(vec![
            CandidateDevice::new("aa:aa:aa:aa:aa:aa", None, Some(-80)),
            CandidateDevice::new("BB:BB:BB:BB:BB:BB", Some("Watch"), None),
            CandidateDevice::new("AA:AA:AA:AA:AA:AA", Some("iPhone"), Some(-55)),
            CandidateDevice::new("CC:CC:CC:CC:CC:CC", None, Some(-70)),
        ]);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].address, "aa:aa:aa:aa:aa:aa");
        assert_eq!(merged[0].rssi, Some(-55));
        assert_eq!(merged[0].display_name(), "iPhone");
        assert_eq!(merged[1].address, "CC:CC:CC:CC:CC:CC");
        assert_eq!(merged[2].display_name(), "Watch");
    }

    #[test]
    fn test_merge_does_not_replace_reading_with_unknown() {
        let merged = merge_sightings(vec![
            CandidateDevice::new("AA:AA:AA:AA:AA:AA", None, Some(-66)),
            CandidateDevice::new("AA:AA:AA:AA:AA:AA", None, None),
        ]);
        assert_eq!(merged[0].rssi, Some(-66));
    }
}
