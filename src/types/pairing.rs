//! Pairing handshake phases and confirmation metadata

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// Phase of a pairing exchange
///
/// `AWAITING_DISCOVERY → AWAITING_CONFIRMATION → COMPLETED`, or one of the
/// terminal `TIMED_OUT` / `CANCELLED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PairingPhase {
    AwaitingDiscovery,
    AwaitingConfirmation,
    Completed,
    TimedOut,
    Cancelled,
}

impl PairingPhase {
    /// No further transitions except an explicit reset
    pub fn is_terminal(&self) -> bool {
        matches!(self, PairingPhase::TimedOut | PairingPhase::Cancelled)
    }
}

impl std::fmt::Display for PairingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PairingPhase::AwaitingDiscovery => "AWAITING_DISCOVERY",
            PairingPhase::AwaitingConfirmation => "AWAITING_CONFIRMATION",
            PairingPhase::Completed => "COMPLETED",
            PairingPhase::TimedOut => "TIMED_OUT",
            PairingPhase::Cancelled => "CANCELLED",
        };
        write!(f, "{}", name)
    }
}

/// Opaque metadata sent by the confirming client
///
/// Logged for the audit trail; never used to pick a device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Confirmation {
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Filled in by the transport, not the client
    #[serde(skip_deserializing)]
    pub remote_addr: Option<String>,
}
