//! File-backed trust record persistence
//!
//! Saves go through a temp file in the same directory followed by a rename, so
//! a reader sees either the old record or the new one, never a mix.
//!
//! A running monitor holds `<record>.lock` (created exclusively, holding its
//! pid) so a second process refuses to monitor the same record.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs_err as fs;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{ProxlockError, Result};
use crate::types::{SettingsUpdate, TrustRecord};

const CONFIG_DIR: &str = "proxlock";
const CONFIG_FILE: &str = "trust.json";
const LOCK_SUFFIX: &str = ".lock";

/// Location of the trust record on disk
#[derive(Debug, Clone)]
pub struct TrustStore {
    path: PathBuf,
}

impl TrustStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config_dir>/proxlock/trust.json`, falling back to the working directory
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record; a missing file yields defaults
    pub fn load(&self) -> Result<TrustRecord> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No trust record, using defaults");
            return Ok(TrustRecord::default());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| ProxlockError::io("reading trust record", e))?;
        serde_json::from_str(&content).map_err(|e| ProxlockError::ConfigMalformed {
            path: self.path.clone(),
            details: e.to_string(),
        })
    }

    /// Write all fields at once or not at all
    pub fn save(&self, record: &TrustRecord) -> Result<()> {
        let persistence = |source: std::io::Error| ProxlockError::Persistence {
            path: self.path.clone(),
            source,
        };

        let content = serde_json::to_string_pretty(record)
            .map_err(|e| persistence(std::io::Error::other(e)))?;

        let parent_dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent_dir).map_err(persistence)?;

        let mut temp_file = NamedTempFile::new_in(&parent_dir).map_err(persistence)?;
        temp_file.write_all(content.as_bytes()).map_err(persistence)?;
        temp_file.flush().map_err(persistence)?;
        temp_file.as_file().sync_all().map_err(persistence)?;
        temp_file.persist(&self.path).map_err(|e| persistence(e.error))?;

        info!(path = %self.path.display(), "Trust record saved");
        Ok(())
    }

    /// Remove the record; an absent file is not an error
    pub fn reset(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path).map_err(|e| ProxlockError::io("removing trust record", e))?;
        info!(path = %self.path.display(), "Trust record removed");
        Ok(true)
    }

    /// Validated settings change, refused while a monitor holds the record
    pub fn update_settings(&self, update: &SettingsUpdate) -> Result<TrustRecord> {
        let mut record = self.load()?;
        if update.is_empty() {
            return Ok(record);
        }
        if self.monitoring_active() {
            return Err(ProxlockError::AlreadyMonitoring {
                address: record.device_address.unwrap_or_else(|| "-".to_string()),
            });
        }

        record.apply(update)?;
        self.save(&record)?;
        info!(update = ?update, "Settings updated");
        Ok(record)
    }

    /// `<record path>.lock`
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(LOCK_SUFFIX);
        PathBuf::from(name)
    }

    /// Claim the record for one monitor across processes
    ///
    /// A lock left behind by a process that no longer exists is reclaimed.
    pub fn lock_monitoring(&self, address: &str) -> Result<MonitorLock> {
        let path = self.lock_path();
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| ProxlockError::io("creating lock directory", e))?;
        }

        for _ in 0..2 {
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(file, "{}", std::process::id())
                        .map_err(|e| ProxlockError::io("writing monitor lock", e))?;
                    debug!(path = %path.display(), "Monitor lock taken");
                    return Ok(MonitorLock { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if holder_alive(&path) {
                        break;
                    }
                    warn!(path = %path.display(), "Reclaiming stale monitor lock");
                    match fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(ProxlockError::io("removing stale monitor lock", e)),
                    }
                }
                Err(e) => return Err(ProxlockError::io("creating monitor lock", e)),
            }
        }

        Err(ProxlockError::AlreadyMonitoring {
            address: address.to_string(),
        })
    }

    /// Whether some live process holds the monitor lock
    pub fn monitoring_active(&self) -> bool {
        let path = self.lock_path();
        path.exists() && holder_alive(&path)
    }
}

/// Held for the length of a monitoring run; removes the lock file on drop
#[derive(Debug)]
pub struct MonitorLock {
    path: PathBuf,
}

impl MonitorLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MonitorLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(error = %e, "Monitor lock not removed");
        }
    }
}

/// A lock whose pid cannot be read is assumed held (it may be mid-write)
fn holder_alive(lock: &Path) -> bool {
    let pid = fs::read_to_string(lock)
        .ok()
        .and_then(|content| content.trim().parse::<u32>().ok());
    match pid {
        Some(pid) => process_exists(pid),
        None => true,
    }
}

#[cfg(target_os = "linux")]
fn process_exists(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_exists(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn paired_record() -> TrustRecord {
        TrustRecord {
            device_address: Some("AA:BB:CC:DD:EE:FF".to_string()),
            device_name: Some("iPhone".to_string()),
            rssi_threshold: -72,
            paired_rssi: Some(-57),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_missing_returns_defaults() {
        let dir = tempdir().unwrap();
        let store = TrustStore::new(dir.path().join("trust.json"));
        assert_eq!(store.load().unwrap(), TrustRecord::default());
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempdir().unwrap();
        let store = TrustStore::new(dir.path().join("nested").join("trust.json"));
        store.save(&paired_record()).unwrap();
        assert_eq!(store.load().unwrap(), paired_record());
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = TrustStore::new(dir.path().join("trust.json"));
        store.save(&paired_record()).unwrap();
        store.save(&TrustRecord::default()).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_save_into_unwritable_location_fails_with_persistence() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let store = TrustStore::new(blocker.join("trust.json"));
        let err = store.save(&paired_record()).unwrap_err();
        assert!(matches!(err, ProxlockError::Persistence { .. }));
        assert!(!blocker.join("trust.json").exists());
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trust.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let err = TrustStore::new(&path).load().unwrap_err();
        assert!(matches!(err, ProxlockError::ConfigMalformed { .. }));
    }

    #[test]
    fn test_reset_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = TrustStore::new(dir.path().join("trust.json"));
        store.save(&paired_record()).unwrap();
        assert!(store.reset().unwrap());
        assert!(!store.reset().unwrap());
        assert!(!store.load().unwrap().is_paired());
    }

    #[test]
    fn test_monitor_lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let store = TrustStore::new(dir.path().join("trust.json"));
        assert_eq!(store.lock_path(), dir.path().join("trust.json.lock"));

        let held = store.lock_monitoring("AA:BB:CC:DD:EE:FF").unwrap();
        assert!(held.path().exists());
        assert!(store.monitoring_active());

        // a second store on the same file stands in for another process
        let other = TrustStore::new(dir.path().join("trust.json"));
        let err = other.lock_monitoring("AA:BB:CC:DD:EE:FF").unwrap_err();
        assert!(matches!(err, ProxlockError::AlreadyMonitoring { .. }));

        drop(held);
        assert!(!store.lock_path().exists());
        assert!(!store.monitoring_active());
        assert!(other.lock_monitoring("AA:BB:CC:DD:EE:FF").is_ok());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_stale_monitor_lock_is_reclaimed() {
        let dir = tempdir().unwrap();
        let store = TrustStore::new(dir.path().join("trust.json"));
        // above any pid_max, so no such process
        std::fs::write(store.lock_path(), "4294967295\n").unwrap();
        assert!(!store.monitoring_active());

        let lock = store.lock_monitoring("AA:BB:CC:DD:EE:FF").unwrap();
        let content = std::fs::read_to_string(lock.path()).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_settings_refused_while_monitoring() {
        let dir = tempdir().unwrap();
        let store = TrustStore::new(dir.path().join("trust.json"));
        store.save(&paired_record()).unwrap();
        let update = SettingsUpdate {
            lock_delay_seconds: Some(30),
            ..Default::default()
        };

        let lock = store.lock_monitoring("AA:BB:CC:DD:EE:FF").unwrap();
        let err = store.update_settings(&update).unwrap_err();
        assert!(matches!(err, ProxlockError::AlreadyMonitoring { .. }));
        assert_eq!(store.load().unwrap(), paired_record());

        drop(lock);
        let updated = store.update_settings(&update).unwrap();
        assert_eq!(updated.lock_delay_seconds, 30);
        assert_eq!(store.load().unwrap(), updated);
    }
}
