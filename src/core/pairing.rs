//! Pairing Exchange Protocol: single-writer handshake state
//!
//! AWAITING_DISCOVERY → AWAITING_CONFIRMATION → COMPLETED, or TIMED_OUT /
//! CANCELLED. The timeout clock starts on entry into AWAITING_CONFIRMATION and
//! is checked at the top of every operation.

use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::core::{PairingSelector, TrustStore};
use crate::error::{ProxlockError, Result};
use crate::types::{merge_sightings, CandidateDevice, Confirmation, PairingPhase, TrustRecord};
use crate::PAIRING_TIMEOUT_SECS;

/// One pairing attempt, from discovery to a terminal phase
#[derive(Debug)]
pub struct PairingSession {
    id: String,
    phase: PairingPhase,
    candidates: Vec<CandidateDevice>,
    selector: PairingSelector,
    timeout: Duration,
    /// Set on entry into AWAITING_CONFIRMATION
    deadline: Option<Instant>,
    record: Option<TrustRecord>,
    monitor_requested: bool,
}

impl PairingSession {
    pub fn new(selector: PairingSelector) -> Self {
        Self::with_timeout(selector, Duration::from_secs(PAIRING_TIMEOUT_SECS))
    }

    pub fn with_timeout(selector: PairingSelector, timeout: Duration) -> Self {
        Self {
            id: session_fingerprint(selector.store().path().to_string_lossy().as_bytes()),
            phase: PairingPhase::AwaitingDiscovery,
            candidates: Vec::new(),
            selector,
            timeout,
            deadline: None,
            record: None,
            monitor_requested: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> &TrustStore {
        self.selector.store()
    }

    pub fn phase(&self) -> PairingPhase {
        self.phase
    }

    /// Read-only view of the candidate set
    pub fn candidates(&self) -> &[CandidateDevice] {
        &self.candidates
    }

    /// Record written by a successful confirmation
    pub fn record(&self) -> Option<&TrustRecord> {
        self.record.as_ref()
    }

    pub fn monitor_requested(&self) -> bool {
        self.monitor_requested
    }

    /// Time left before the handshake expires, if the clock is running
    pub fn remaining(&self) -> Option<Duration> {
        match self.phase {
            PairingPhase::AwaitingConfirmation => self
                .deadline
                .map(|deadline| deadline.saturating_duration_since(Instant::now())),
            _ => None,
        }
    }

    /// Move to TIMED_OUT if the deadline passed; returns the current phase
    pub fn expire_if_due(&mut self) -> PairingPhase {
        if self.phase == PairingPhase::AwaitingConfirmation {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    warn!(session = %self.id, timeout_secs = self.timeout.as_secs(), "Pairing timed out");
                    self.phase = PairingPhase::TimedOut;
                }
            }
        }
        self.phase
    }

    /// Add discovered devices; the first non-empty offer starts the clock
    pub fn offer_candidates(&mut self, discovered: Vec<CandidateDevice>) -> Result<()> {
        match self.expire_if_due() {
            PairingPhase::AwaitingDiscovery | PairingPhase::AwaitingConfirmation => {}
            PairingPhase::TimedOut => return Err(ProxlockError::TimedOut),
            phase => return Err(ProxlockError::InvalidState { phase }),
        }

        let combined = std::mem::take(&mut self.candidates)
            .into_iter()
            .chain(discovered);
        self.candidates = merge_sightings(combined);

        if self.candidates.is_empty() {
            return Err(ProxlockError::NoCandidates);
        }

        if self.phase == PairingPhase::AwaitingDiscovery {
            self.phase = PairingPhase::AwaitingConfirmation;
            self.deadline = Some(Instant::now() + self.timeout);
            info!(
                session = %self.id,
                candidates = self.candidates.len(),
                "Awaiting confirmation"
            );
        }
        Ok(())
    }

    /// The single accepted confirmation; later ones fail with `AlreadyPaired`
    pub fn confirm(&mut self, confirmation: &Confirmation) -> Result<TrustRecord> {
        match self.expire_if_due() {
            PairingPhase::AwaitingConfirmation => {}
            PairingPhase::Completed => return Err(ProxlockError::AlreadyPaired),
            PairingPhase::TimedOut => return Err(ProxlockError::TimedOut),
            phase => return Err(ProxlockError::InvalidState { phase }),
        }

        let record = self.selector.select(&self.candidates, confirmation)?;
        self.record = Some(record.clone());
        self.phase = PairingPhase::Completed;
        self.deadline = None;
        Ok(record)
    }

    /// Accepted once COMPLETED; tells the launcher to start monitoring
    pub fn begin_monitoring(&mut self) -> Result<TrustRecord> {
        if self.expire_if_due() == PairingPhase::TimedOut {
            return Err(ProxlockError::TimedOut);
        }
        let record = match (self.phase, &self.record) {
            (PairingPhase::Completed, Some(record)) => record.clone(),
            _ => return Err(ProxlockError::NotPaired),
        };
        self.monitor_requested = true;
        Ok(record)
    }

    /// Abandon the attempt; no-op on a terminal or completed session
    pub fn cancel(&mut self) -> PairingPhase {
        if matches!(
            self.phase,
            PairingPhase::AwaitingDiscovery | PairingPhase::AwaitingConfirmation
        ) {
            info!(session = %self.id, "Pairing cancelled");
            self.phase = PairingPhase::Cancelled;
            self.deadline = None;
        }
        self.phase
    }

    /// Start over so a fresh pairing can happen
    pub fn reset(&mut self) {
        self.phase = PairingPhase::AwaitingDiscovery;
        self.candidates.clear();
        self.deadline = None;
        self.record = None;
        self.monitor_requested = false;
        self.id = session_fingerprint(self.selector.store().path().to_string_lossy().as_bytes());
    }
}

/// Short hex id over start time and a caller-provided salt
fn session_fingerprint(salt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(salt);
    let digest: [u8; 32] = hasher.finalize().into();
    digest[..6].iter().map(|b| format!("{:02x}", b)).collect()
}
