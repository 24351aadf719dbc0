//! Signal observations and quality buckets

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::{QUALITY_EXCELLENT_DBM, QUALITY_GOOD_DBM, QUALITY_FAIR_DBM, QUALITY_WEAK_DBM};

/// One sighting of a device by the scanner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub address: String,
    pub name: Option<String>,
    /// dBm, absent when the advertisement carried no RSSI
    pub rssi: Option<i32>,
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(address: impl Into<String>, name: Option<String>, rssi: Option<i32>) -> Self {
        Self {
            address: address.into(),
            name,
            rssi,
            observed_at: Utc::now(),
        }
    }
}

/// What the monitor learned from one sample cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rssi", rename_all = "snake_case")]
pub enum Reading {
    /// Target seen with a signal strength
    Seen(i32),
    /// Target seen but no RSSI reported
    Unknown,
    /// Target not observed this cycle
    NotSeen,
    /// Scanner failed; counts as not seen
    ScanFailed,
}

impl Reading {
    pub fn rssi(&self) -> Option<i32> {
        match self {
            Reading::Seen(rssi) => Some(*rssi),
            _ => None,
        }
    }

    pub fn from_observation(observation: Option<&Observation>) -> Self {
        match observation {
            Some(obs) => match obs.rssi {
                Some(rssi) => Reading::Seen(rssi),
                None => Reading::Unknown,
            },
            None => Reading::NotSeen,
        }
    }
}

/// Discrete signal-quality bucket (observability only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalQuality {
    Excellent,
    Good,
    Fair,
    Weak,
    VeryWeak,
    Unknown,
}

impl SignalQuality {
    pub fn classify(rssi: Option<i32>) -> Self {
        match rssi {
            None => SignalQuality::Unknown,
            Some(r) if r >= QUALITY_EXCELLENT_DBM => SignalQuality::Excellent,
            Some(r) if r >= QUALITY_GOOD_DBM => SignalQuality::Good,
            Some(r) if r >= QUALITY_FAIR_DBM => SignalQuality::Fair,
            Some(r) if r >= QUALITY_WEAK_DBM => SignalQuality::Weak,
            Some(_) => SignalQuality::VeryWeak,
        }
    }

    /// Rough distance label for the bucket
    pub fn distance_label(&self) -> &'static str {
        match self {
            SignalQuality::Excellent => "Very Close (<1m)",
            SignalQuality::Good => "Close (1-3m)",
            SignalQuality::Fair => "Moderate (3-10m)",
            SignalQuality::Weak => "Far (10-20m)",
            SignalQuality::VeryWeak => "Very Far (>20m)",
            SignalQuality::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for SignalQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SignalQuality::Excellent => "EXCELLENT",
            SignalQuality::Good => "GOOD",
            SignalQuality::Fair => "FAIR",
            SignalQuality::Weak => "WEAK",
            SignalQuality::VeryWeak => "VERY_WEAK",
            SignalQuality::Unknown => "UNKNOWN",
        };
        f.pad(name)
    }
}
