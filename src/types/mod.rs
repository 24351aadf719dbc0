//! Core types for proxlock

mod state;
mod signals;
mod output;
mod reason;
mod device;
mod trust;
mod pairing;

pub use state::ProximityState;
pub use signals::{Observation, Reading, SignalQuality};
pub use output::SampleReport;
pub use reason::ReasonCode;
pub use device::{CandidateDevice, compare_rssi, merge_sightings};
pub use trust::{TrustRecord, SettingsUpdate, required_count};
pub use pairing::{PairingPhase, Confirmation};
