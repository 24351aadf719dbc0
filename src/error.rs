//! Error types for proxlock
//!
//! Protocol and persistence errors surface to the caller as-is. Scan errors are
//! absorbed by the monitor loop as "not seen" and only appear here so sources
//! can report them.

use std::path::PathBuf;

use axum::http::StatusCode;

use crate::types::PairingPhase;

pub type Result<T> = std::result::Result<T, ProxlockError>;

#[derive(Debug, thiserror::Error)]
pub enum ProxlockError {
    // ─────────────────────────────────────────────────────────────────────
    // Pairing
    // ─────────────────────────────────────────────────────────────────────
    #[error("No candidate devices discovered")]
    NoCandidates,

    #[error("Pairing already completed for this session")]
    AlreadyPaired,

    #[error("Operation not allowed while pairing is {phase}")]
    InvalidState { phase: PairingPhase },

    #[error("No device paired yet")]
    NotPaired,

    #[error("Pairing session timed out")]
    TimedOut,

    // ─────────────────────────────────────────────────────────────────────
    // Trust record
    // ─────────────────────────────────────────────────────────────────────
    #[error("Trust record write failed: {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Trust record malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    // ─────────────────────────────────────────────────────────────────────
    // Monitoring
    // ─────────────────────────────────────────────────────────────────────
    #[error("Already monitoring {address}")]
    AlreadyMonitoring { address: String },

    #[error("Scan failed: {0}")]
    Scan(String),

    #[error("Lock failed: {0}")]
    LockActuator(String),

    // ─────────────────────────────────────────────────────────────────────
    // I/O
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProxlockError {
    /// HTTP status for the pairing transport
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoCandidates => StatusCode::NOT_FOUND,
            Self::AlreadyPaired | Self::InvalidState { .. } | Self::AlreadyMonitoring { .. } => {
                StatusCode::CONFLICT
            }
            Self::NotPaired => StatusCode::PRECONDITION_FAILED,
            Self::TimedOut => StatusCode::GONE,
            Self::InvalidSetting { .. } => StatusCode::BAD_REQUEST,
            Self::Persistence { .. }
            | Self::ConfigMalformed { .. }
            | Self::Scan(_)
            | Self::LockActuator(_)
            | Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_misuse_maps_to_conflict() {
        assert_eq!(ProxlockError::AlreadyPaired.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ProxlockError::InvalidState { phase: PairingPhase::AwaitingDiscovery }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(ProxlockError::NotPaired.status_code(), StatusCode::PRECONDITION_FAILED);
    }

    #[test]
    fn test_messages_are_single_line() {
        let errors = [
            ProxlockError::NoCandidates,
            ProxlockError::TimedOut,
            ProxlockError::AlreadyMonitoring { address: "AA:BB".into() },
            ProxlockError::LockActuator("loginctl exited with 1".into()),
        ];
        for err in errors {
            assert!(!err.to_string().contains('\n'), "{err}");
        }
    }
}
