//! Ports for the wireless scanning backend.
//!
//! The monitor pulls one sample per tick through [`SampleSource`]; pairing
//! pulls a candidate list through [`DeviceDiscovery`]. "Target not present" is
//! `Ok(None)`, never an error.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use crate::error::{ProxlockError, Result};
use crate::types::{CandidateDevice, Observation};

/// Token for an open scan against one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanHandle {
    target: String,
}

impl ScanHandle {
    pub fn new(target: impl Into<String>) -> Self {
        Self { target: target.into() }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Case-insensitive address match
    pub fn matches(&self, address: &str) -> bool {
        self.target.eq_ignore_ascii_case(address)
    }
}

/// Pull-based signal sample source for a single target
pub trait SampleSource: Send {
    fn begin_scan(&mut self, target: &str) -> Result<ScanHandle>;

    /// One observation of the target within `window`, or `None` if not seen
    fn sample(
        &mut self,
        handle: &ScanHandle,
        window: Duration,
    ) -> impl Future<Output = Result<Option<Observation>>> + Send;

    fn end_scan(&mut self, handle: ScanHandle);
}

/// Finds candidate devices for pairing
pub trait DeviceDiscovery: Send + Sync {
    fn discover(&self, window: Duration) -> impl Future<Output = Result<Vec<CandidateDevice>>> + Send;
}

/// One scripted step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptStep {
    Rssi(i32),
    /// Seen without a signal reading
    Silent,
    Absent,
    Fail,
}

impl ScriptStep {
    /// Parse `-62`, `none`/`absent`, `silent`, `fail`
    pub fn parse(token: &str) -> Result<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "none" | "absent" | "-" => Ok(ScriptStep::Absent),
            "silent" | "?" => Ok(ScriptStep::Silent),
            "fail" | "error" => Ok(ScriptStep::Fail),
            other => other.parse::<i32>().map(ScriptStep::Rssi).map_err(|_| {
                ProxlockError::InvalidSetting {
                    field: "simulate",
                    reason: format!("unrecognised step '{}'", token.trim()),
                }
            }),
        }
    }
}

/// Replays a fixed list of steps; once exhausted the target is absent
///
/// Backs `monitor --simulate` and the monitor tests.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    steps: VecDeque<ScriptStep>,
    name: Option<String>,
    began: u32,
    ended: u32,
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Comma separated steps, e.g. `-50,-62,none,-90`
    pub fn parse(script: &str) -> Result<Self> {
        let steps = script
            .split(',')
            .filter(|token| !token.trim().is_empty())
            .map(ScriptStep::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(steps))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }

    /// (begin_scan calls, end_scan calls)
    pub fn scan_calls(&self) -> (u32, u32) {
        (self.began, self.ended)
    }
}

impl SampleSource for ScriptedSource {
    fn begin_scan(&mut self, target: &str) -> Result<ScanHandle> {
        self.began += 1;
        Ok(ScanHandle::new(target))
    }

    async fn sample(&mut self, handle: &ScanHandle, _window: Duration) -> Result<Option<Observation>> {
        let name = self.name.clone();
        match self.steps.pop_front() {
            Some(ScriptStep::Rssi(rssi)) => Ok(Some(Observation::new(handle.target(), name, Some(rssi)))),
            Some(ScriptStep::Silent) => Ok(Some(Observation::new(handle.target(), name, None))),
            Some(ScriptStep::Fail) => Err(ProxlockError::Scan("scripted failure".to_string())),
            Some(ScriptStep::Absent) | None => Ok(None),
        }
    }

    fn end_scan(&mut self, _handle: ScanHandle) {
        self.ended += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_script() {
        let source = ScriptedSource::parse("-50, -62,none,silent,fail").unwrap();
        assert_eq!(
            source.steps.iter().copied().collect::<Vec<_>>(),
            vec![
                ScriptStep::Rssi(-50),
                ScriptStep::Rssi(-62),
                ScriptStep::Absent,
                ScriptStep::Silent,
                ScriptStep::Fail,
            ]
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ScriptedSource::parse("-50,loud").is_err());
    }

    #[test]
    fn test_handle_matches_case_insensitive() {
        let handle = ScanHandle::new("AA:BB:CC:DD:EE:FF");
        assert!(handle.matches("aa:bb:cc:dd:ee:ff"));
        assert!(!handle.matches("aa:bb:cc:dd:ee:00"));
    }

    #[tokio::test]
    async fn test_scripted_source_replays_then_absent() {
        let mut source = ScriptedSource::parse("-61,fail").unwrap();
        let handle = source.begin_scan("AA:BB:CC:DD:EE:FF").unwrap();
        let window = Duration::from_millis(10);

        let first = source.sample(&handle, window).await.unwrap().unwrap();
        assert_eq!(first.rssi, Some(-61));
        assert!(source.sample(&handle, window).await.is_err());
        assert!(source.sample(&handle, window).await.unwrap().is_none());

        source.end_scan(handle);
        assert_eq!(source.scan_calls(), (1, 1));
    }
}
