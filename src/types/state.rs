//! Proximity state definitions

use serde::{Deserialize, Serialize};

/// Where the trusted device is judged to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProximityState {
    /// Initial, optimistic default; last reading was above threshold
    Near,
    /// Last reading was at/below threshold or missing, debounce running
    Far,
    /// Sustained absence confirmed, lock decision emitted (terminal)
    Locked,
}

impl ProximityState {
    /// Get ANSI color code for terminal display
    pub fn color_code(&self) -> &'static str {
        match self {
            ProximityState::Near => "\x1b[32m",   // Green
            ProximityState::Far => "\x1b[33m",    // Orange/Yellow
            ProximityState::Locked => "\x1b[31m", // Red
        }
    }

    /// Reset ANSI color
    pub fn color_reset() -> &'static str {
        "\x1b[0m"
    }

    /// Get emoji for state
    pub fn emoji(&self) -> &'static str {
        match self {
            ProximityState::Near => "📱",
            ProximityState::Far => "📶",
            ProximityState::Locked => "🔒",
        }
    }
}

impl std::fmt::Display for ProximityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProximityState::Near => "NEAR",
            ProximityState::Far => "FAR",
            ProximityState::Locked => "LOCKED",
        };
        write!(f, "{}", name)
    }
}
