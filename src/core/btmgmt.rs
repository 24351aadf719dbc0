//! BlueZ scanning backend that shells out to `btmgmt find`
//!
//! Each sample or discovery pass runs `btmgmt --index <adapter> find -l` for
//! the requested window, then kills the child and parses what it printed:
//!
//! ```text
//! hci0 dev_found: 4C:56:9D:12:34:56 type LE Random rssi -62 flags 0x0000
//! AD flags 0x1a
//! name Jan's iPhone
//! ```
//!
//! Needs `CAP_NET_ADMIN` on most distributions.

use std::process::Stdio;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::{DeviceDiscovery, SampleSource, ScanHandle};
use crate::error::{ProxlockError, Result};
use crate::types::{merge_sightings, CandidateDevice, Observation};

lazy_static! {
    static ref RE_DEV_FOUND: Regex = Regex::new(
        r"dev_found:\s+([0-9A-Fa-f]{2}(?::[0-9A-Fa-f]{2}){5})\b"
    ).unwrap();

    static ref RE_RSSI: Regex = Regex::new(r"\brssi\s+(-?\d+)\b").unwrap();

    static ref RE_NAME: Regex = Regex::new(r"^\s*name\s+(.+?)\s*$").unwrap();
}

const PROGRAM: &str = "btmgmt";

/// Scanner for one Bluetooth adapter
#[derive(Debug, Clone)]
pub struct BtmgmtScanner {
    adapter: String,
    program: String,
}

impl BtmgmtScanner {
    /// Scanner for an adapter such as `hci0`
    pub fn new(adapter: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            program: PROGRAM.to_string(),
        }
    }

    /// Use a different executable (wrapper scripts, sudo shims)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    fn index(&self) -> &str {
        self.adapter.strip_prefix("hci").unwrap_or(&self.adapter)
    }

    /// Run one scan for `window` and return every sighting in output order
    pub async fn scan_for(&self, window: Duration) -> Result<Vec<CandidateDevice>> {
        let args = ["--index", self.index(), "find", "-l"];

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProxlockError::Scan(format!("failed to run `{} {}`: {}", self.program, args.join(" "), e))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProxlockError::Scan("scanner stdout not captured".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        let deadline = Instant::now() + window;
        let mut output = String::new();
        let mut exited_early = false;

        loop {
            match tokio::time::timeout_at(deadline, lines.next_line()).await {
                Ok(Ok(Some(line))) => {
                    output.push_str(&line);
                    output.push('\n');
                }
                Ok(Ok(None)) => {
                    exited_early = true;
                    break;
                }
                Ok(Err(e)) => return Err(ProxlockError::Scan(format!("reading scanner output: {}", e))),
                Err(_) => break,
            }
        }

        if exited_early {
            let status = child
                .wait()
                .await
                .map_err(|e| ProxlockError::Scan(format!("waiting for {}: {}", self.program, e)))?;
            if !status.success() {
                return Err(ProxlockError::Scan(format!("{} exited with {}", self.program, status)));
            }
        } else if let Err(e) = child.kill().await {
            warn!(error = %e, "Failed to stop scanner process");
        }

        let sightings = parse_btmgmt_output(&output);
        debug!(adapter = %self.adapter, sightings = sightings.len(), "Scan window closed");
        Ok(sightings)
    }
}

impl Default for BtmgmtScanner {
    fn default() -> Self {
        Self::new("hci0")
    }
}

impl SampleSource for BtmgmtScanner {
    fn begin_scan(&mut self, target: &str) -> Result<ScanHandle> {
        if !RE_DEV_FOUND.is_match(&format!("dev_found: {}", target)) {
            return Err(ProxlockError::Scan(format!("not a device address: {}", target)));
        }
        Ok(ScanHandle::new(target))
    }

    async fn sample(&mut self, handle: &ScanHandle, window: Duration) -> Result<Option<Observation>> {
        let sightings = self.scan_for(window).await?;
        let target = merge_sightings(
            sightings
                .into_iter()
                .filter(|device| handle.matches(&device.address)),
        )
        .into_iter()
        .next();

        Ok(target.map(|device| Observation::new(handle.target(), device.name, device.rssi)))
    }

    fn end_scan(&mut self, handle: ScanHandle) {
        debug!(target = handle.target(), "Scan ended");
    }
}

impl DeviceDiscovery for BtmgmtScanner {
    async fn discover(&self, window: Duration) -> Result<Vec<CandidateDevice>> {
        Ok(merge_sightings(self.scan_for(window).await?))
    }
}

/// Parse `btmgmt find` output into sightings, one per `dev_found` line
///
/// `name` lines attach to the most recent device. Duplicates are kept; use
/// [`merge_sightings`] to collapse them.
pub fn parse_btmgmt_output(output: &str) -> Vec<CandidateDevice> {
    let mut sightings: Vec<CandidateDevice> = Vec::new();

    for line in output.lines() {
        if let Some(caps) = RE_DEV_FOUND.captures(line) {
            let address = caps[1].to_ascii_uppercase();
            let rssi = RE_RSSI
                .captures(line)
                .and_then(|c| c[1].parse::<i32>().ok())
                // btmgmt prints 127 when the controller has no reading
                .filter(|rssi| *rssi != 127);
            sightings.push(CandidateDevice::new(address, None, rssi));
            continue;
        }

        if let Some(caps) = RE_NAME.captures(line) {
            if let Some(last) = sightings.last_mut() {
                if last.name.is_none() {
                    last.name = Some(caps[1].to_string());
                }
            }
        }
    }

    sightings
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "\
Discovery started
hci0 type 6 discovering on
hci0 dev_found: 4c:56:9d:12:34:56 type LE Random rssi -62 flags 0x0000
AD flags 0x1a
name Jan's iPhone
hci0 dev_found: 11:22:33:44:55:66 type LE Public rssi 127 flags 0x0004
hci0 dev_found: 4C:56:9D:12:34:56 type LE Random rssi -55 flags 0x0000
";

    #[test]
    fn test_parse_sample_output() {
        let sightings = parse_btmgmt_output(SAMPLE);
        assert_eq!(sightings.len(), 3);
        assert_eq!(sightings[0].address, "4C:56:9D:12:34:56");
        assert_eq!(sightings[0].name.as_deref(), Some("Jan's iPhone"));
        assert_eq!(sightings[0].rssi, Some(-62));
        assert_eq!(sightings[1].rssi, None);
        assert_eq!(sightings[1].name, None);
    }

    #[test]
    fn test_merged_sightings_keep_strongest() {
        let merged = merge_sightings(parse_btmgmt_output(SAMPLE));
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].address, "4C:56:9D:12:34:56");
        assert_eq!(merged[0].rssi, Some(-55));
        assert_eq!(merged[0].name.as_deref(), Some("Jan's iPhone"));
    }

    #[test]
    fn test_name_before_any_device_is_ignored() {
        let sightings = parse_btmgmt_output("name Orphan\nDiscovery stopped\n");
        assert!(sightings.is_empty());
    }

    #[test]
    fn test_begin_scan_validates_address() {
        let mut scanner = BtmgmtScanner::default();
        assert!(scanner.begin_scan("AA:BB:CC:DD:EE:FF").is_ok());
        assert!(scanner.begin_scan("phone").is_err());
    }

    #[test]
    fn test_index_strips_hci_prefix() {
        assert_eq!(BtmgmtScanner::new("hci1").index(), "1");
        assert_eq!(BtmgmtScanner::new("2").index(), "2");
    }

    #[tokio::test]
    async fn test_missing_program_is_scan_error() {
        let scanner = BtmgmtScanner::default().with_program("/nonexistent/btmgmt");
        let err = scanner.scan_for(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, ProxlockError::Scan(_)));
    }
}
