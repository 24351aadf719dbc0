//! Output structures for terminal display

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::types::{ProximityState, ReasonCode, Reading, SignalQuality};

/// Output structure for each processed sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleReport {
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// 1-based sample number within the run
    pub sequence: u64,
    /// What the scanner reported
    pub reading: Reading,
    /// Signal-quality bucket
    pub quality: SignalQuality,
    /// Rough distance label
    pub distance: String,
    /// State after this sample
    pub state: ProximityState,
    /// Consecutive far samples so far
    pub far_count: u32,
    /// Far samples needed to lock
    pub required_count: u32,
    /// Reason for current state
    pub reason: ReasonCode,
    /// Did this sample trigger the lock decision?
    pub lock_triggered: bool,
}

impl SampleReport {
    /// Create new report
    pub fn new(
        sequence: u64,
        reading: Reading,
        state: ProximityState,
        far_count: u32,
        required_count: u32,
        reason: ReasonCode,
    ) -> Self {
        let quality = SignalQuality::classify(reading.rssi());
        Self {
            timestamp: Utc::now(),
            sequence,
            reading,
            quality,
            distance: quality.distance_label().to_string(),
            state,
            far_count,
            required_count,
            reason,
            lock_triggered: reason == ReasonCode::R103_LOCK_TRIGGERED,
        }
    }

    fn rssi_field(&self) -> String {
        match self.reading {
            Reading::Seen(rssi) => format!("{:4} dBm", rssi),
            Reading::Unknown => "  ?? dBm".to_string(),
            Reading::NotSeen => "NOT FOUND".to_string(),
            Reading::ScanFailed => "SCAN ERR".to_string(),
        }
    }

    fn counter_field(&self) -> String {
        if self.far_count == 0 {
            String::new()
        } else {
            format!(" ({}/{})", self.far_count, self.required_count)
        }
    }

    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        let color = self.state.color_code();
        let reset = ProximityState::color_reset();
        let emoji = self.state.emoji();

        format!(
            "{}{} #{:04} | {} | {:9} | {:16} | {}{} | {}{}",
            color,
            emoji,
            self.sequence,
            self.rssi_field(),
            self.quality,
            self.distance,
            self.state,
            self.counter_field(),
            self.reason.code(),
            reset
        )
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        format!(
            "seq={} | rssi={} | quality={} | state={} | far={}/{} | reason={}",
            self.sequence,
            self.reading
                .rssi()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "none".to_string()),
            self.quality,
            self.state,
            self.far_count,
            self.required_count,
            self.reason.code()
        )
    }
}
