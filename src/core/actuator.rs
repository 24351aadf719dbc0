//! Screen lock actuators
//!
//! `lock()` is awaited inline by the monitor and is bounded in time. Platform
//! fallbacks are tried in order; the first command that exits successfully
//! wins.

use std::fmt;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{ProxlockError, Result};
use crate::LOCK_TIMEOUT_MS;

/// Which mechanism locked the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMethod {
    CgSession,
    ScreenSaver,
    Loginctl,
    XdgScreensaver,
    LockWorkStation,
    /// Lock requested but actuation is switched off
    Skipped,
}

impl fmt::Display for LockMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockMethod::CgSession => "CGSession",
            LockMethod::ScreenSaver => "osascript screen saver",
            LockMethod::Loginctl => "loginctl",
            LockMethod::XdgScreensaver => "xdg-screensaver",
            LockMethod::LockWorkStation => "LockWorkStation",
            LockMethod::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Locks the workstation
pub trait LockActuator: Send + Sync {
    fn lock(&self) -> impl Future<Output = Result<LockMethod>> + Send;
}

/// One command to try
#[derive(Debug, Clone)]
struct LockCommand {
    method: LockMethod,
    program: &'static str,
    args: &'static [&'static str],
}

#[cfg(target_os = "macos")]
const PLATFORM_COMMANDS: &[LockCommand] = &[
    LockCommand {
        method: LockMethod::CgSession,
        program: "/System/Library/CoreServices/Menu Extras/User.menu/Contents/Resources/CGSession",
        args: &["-suspend"],
    },
    LockCommand {
        method: LockMethod::ScreenSaver,
        program: "osascript",
        args: &["-e", r#"tell application "System Events" to start current screen saver"#],
    },
];

#[cfg(target_os = "linux")]
const PLATFORM_COMMANDS: &[LockCommand] = &[
    LockCommand {
        method: LockMethod::Loginctl,
        program: "loginctl",
        args: &["lock-session"],
    },
    LockCommand {
        method: LockMethod::XdgScreensaver,
        program: "xdg-screensaver",
        args: &["lock"],
    },
];

#[cfg(target_os = "windows")]
const PLATFORM_COMMANDS: &[LockCommand] = &[LockCommand {
    method: LockMethod::LockWorkStation,
    program: "rundll32.exe",
    args: &["user32.dll,LockWorkStation"],
}];

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
const PLATFORM_COMMANDS: &[LockCommand] = &[];

/// Locks via the host platform's command-line tools
#[derive(Debug, Clone)]
pub struct SystemLockActuator {
    commands: Vec<LockCommand>,
    timeout: Duration,
}

impl SystemLockActuator {
    pub fn new() -> Self {
        Self {
            commands: PLATFORM_COMMANDS.to_vec(),
            timeout: Duration::from_millis(LOCK_TIMEOUT_MS),
        }
    }

    /// Per-attempt time bound
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn attempt(&self, command: &LockCommand) -> std::result::Result<(), String> {
        let child = Command::new(command.program)
            .args(command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(format!("{} exited with {}", command.program, status)),
            Ok(Err(e)) => Err(format!("{}: {}", command.program, e)),
            Err(_) => Err(format!(
                "{} timed out after {}ms",
                command.program,
                self.timeout.as_millis()
            )),
        }
    }
}

impl Default for SystemLockActuator {
    fn default() -> Self {
        Self::new()
    }
}

impl LockActuator for SystemLockActuator {
    async fn lock(&self) -> Result<LockMethod> {
        let mut failures = Vec::new();

        for command in &self.commands {
            debug!(method = %command.method, "Attempting screen lock");
            match self.attempt(command).await {
                Ok(()) => {
                    info!(method = %command.method, "Screen locked");
                    return Ok(command.method);
                }
                Err(reason) => {
                    warn!(method = %command.method, %reason, "Lock attempt failed");
                    failures.push(reason);
                }
            }
        }

        if failures.is_empty() {
            return Err(ProxlockError::LockActuator(
                "no lock mechanism for this platform".to_string(),
            ));
        }
        Err(ProxlockError::LockActuator(failures.join("; ")))
    }
}

/// Reports the lock decision without touching the session
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledActuator;

impl LockActuator for DisabledActuator {
    async fn lock(&self) -> Result<LockMethod> {
        info!("Auto-lock disabled, not locking");
        Ok(LockMethod::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_actuator_skips() {
        assert_eq!(DisabledActuator.lock().await.unwrap(), LockMethod::Skipped);
    }

    #[tokio::test]
    async fn test_all_commands_failing_is_actuator_error() {
        let actuator = SystemLockActuator {
            commands: vec![
                LockCommand {
                    method: LockMethod::Loginctl,
                    program: "/nonexistent/lock-one",
                    args: &[],
                },
                LockCommand {
                    method: LockMethod::XdgScreensaver,
                    program: "/nonexistent/lock-two",
                    args: &["lock"],
                },
            ],
            timeout: Duration::from_millis(500),
        };

        match actuator.lock().await {
            Err(ProxlockError::LockActuator(reason)) => {
                assert!(reason.contains("lock-one"));
                assert!(reason.contains("lock-two"));
            }
            other => panic!("expected LockActuator error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_commands_is_actuator_error() {
        let actuator = SystemLockActuator {
            commands: Vec::new(),
            timeout: Duration::from_millis(10),
        };
        assert!(matches!(actuator.lock().await, Err(ProxlockError::LockActuator(_))));
    }

    #[test]
    fn test_method_display() {
        assert_eq!(LockMethod::CgSession.to_string(), "CGSession");
        assert_eq!(LockMethod::Skipped.to_string(), "skipped");
    }
}
