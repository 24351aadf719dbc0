//! Monitor run loop: drives the proximity engine from a sample source
//!
//! One sample per tick of `scan_interval_seconds`. Cancellation is checked
//! before every tick and raced against every sample, so a stop between
//! samples never reaches the actuator. The actuator is called at most once
//! per run and never retried.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::{LockActuator, LockMethod, ProximityEngine, SampleSource, ScanHandle};
use crate::error::{ProxlockError, Result};
use crate::types::{Reading, SampleReport, TrustRecord};
use crate::SAMPLE_WINDOW_MS;

/// How a monitoring run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MonitorOutcome {
    Locked { samples: u64, method: LockMethod },
    LockFailed { samples: u64, reason: String },
    Stopped { samples: u64 },
}

impl MonitorOutcome {
    pub fn samples(&self) -> u64 {
        match self {
            MonitorOutcome::Locked { samples, .. }
            | MonitorOutcome::LockFailed { samples, .. }
            | MonitorOutcome::Stopped { samples } => *samples,
        }
    }
}

/// Addresses currently being monitored in this process
#[derive(Debug, Clone, Default)]
pub struct MonitorRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `address`; the claim is released when the guard drops
    pub fn acquire(&self, address: &str) -> Result<MonitorGuard> {
        let key = address.to_ascii_uppercase();
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(key.clone()) {
            return Err(ProxlockError::AlreadyMonitoring {
                address: address.to_string(),
            });
        }
        Ok(MonitorGuard {
            address: key,
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_active(&self, address: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&address.to_ascii_uppercase())
    }
}

/// RAII claim on one monitored address
#[derive(Debug)]
pub struct MonitorGuard {
    address: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl MonitorGuard {
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Drop for MonitorGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.address);
    }
}

/// Runs monitoring sessions and publishes their reports
#[derive(Debug, Clone)]
pub struct Monitor {
    registry: MonitorRegistry,
    reports: broadcast::Sender<SampleReport>,
}

impl Monitor {
    pub fn new(registry: MonitorRegistry, reports: broadcast::Sender<SampleReport>) -> Self {
        Self { registry, reports }
    }

    pub fn registry(&self) -> &MonitorRegistry {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SampleReport> {
        self.reports.subscribe()
    }

    /// Monitor the record's device until lock or cancellation
    pub async fn run<S, A>(
        &self,
        record: &TrustRecord,
        source: &mut S,
        actuator: &A,
        cancel: CancellationToken,
    ) -> Result<MonitorOutcome>
    where
        S: SampleSource,
        A: LockActuator,
    {
        let address = record.address()?.to_string();
        let _guard = self.registry.acquire(&address)?;

        let mut engine = ProximityEngine::from_record(record);
        let interval = Duration::from_secs(record.scan_interval_seconds.max(1));
        let window = interval.min(Duration::from_millis(SAMPLE_WINDOW_MS));

        info!(
            address = %address,
            threshold = engine.threshold(),
            required = engine.required_count(),
            interval_secs = interval.as_secs(),
            "Monitoring started"
        );

        let handle = source.begin_scan(&address)?;
        let outcome = self
            .poll(&mut engine, source, &handle, actuator, interval, window, &cancel)
            .await;
        source.end_scan(handle);

        info!(address = %address, outcome = ?outcome, "Monitoring ended");
        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    async fn poll<S, A>(
        &self,
        engine: &mut ProximityEngine,
        source: &mut S,
        handle: &ScanHandle,
        actuator: &A,
        interval: Duration,
        window: Duration,
        cancel: &CancellationToken,
    ) -> MonitorOutcome
    where
        S: SampleSource,
        A: LockActuator,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return MonitorOutcome::Stopped { samples: engine.sample_count() };
                }
                _ = ticker.tick() => {}
            }

            let sampled = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return MonitorOutcome::Stopped { samples: engine.sample_count() };
                }
                result = source.sample(handle, window) => result,
            };

            let reading = match sampled {
                Ok(observation) => Reading::from_observation(observation.as_ref()),
                Err(e) => {
                    warn!(error = %e, "Sample failed, treating as not seen");
                    Reading::ScanFailed
                }
            };

            let report = engine.update(reading);
            debug!(
                seq = report.sequence,
                rssi = ?report.reading.rssi(),
                state = %report.state,
                far = report.far_count,
                reason = report.reason.code(),
                "Sample"
            );
            // no subscribers is fine
            let _ = self.reports.send(report.clone());

            if report.lock_triggered {
                let samples = engine.sample_count();
                return match actuator.lock().await {
                    Ok(method) => MonitorOutcome::Locked { samples, method },
                    Err(e) => {
                        error!(error = %e, "Lock failed, monitoring ends without retry");
                        MonitorOutcome::LockFailed {
                            samples,
                            reason: e.to_string(),
                        }
                    }
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_rejects_duplicate_until_dropped() {
        let registry = MonitorRegistry::new();
        let guard = registry.acquire("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(guard.address(), "AA:BB:CC:DD:EE:FF");

        let err = registry.acquire("AA:BB:CC:DD:EE:FF").unwrap_err();
        assert!(matches!(err, ProxlockError::AlreadyMonitoring { .. }));

        drop(guard);
        assert!(!registry.is_active("AA:BB:CC:DD:EE:FF"));
        assert!(registry.acquire("AA:BB:CC:DD:EE:FF").is_ok());
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let outcome = MonitorOutcome::Stopped { samples: 4 };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "stopped");
        assert_eq!(json["samples"], 4);
        assert_eq!(outcome.samples(), 4);
    }
}
