//! Logging setup for the CLI
//!
//! stderr always; a non-blocking file layer when a log path is usable. The
//! returned guard must live until exit or buffered lines are lost.

use std::path::{Path, PathBuf};

use fs_err as fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_DIR: &str = "proxlock";
const LOG_FILE: &str = "proxlock.log";

/// `<data_local_dir>/proxlock/proxlock.log`
pub fn default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(LOG_DIR).join(LOG_FILE))
        .unwrap_or_else(|| PathBuf::from(LOG_FILE))
}

pub fn init(verbose: bool, log_file: &Path) -> Option<WorkerGuard> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = match open_appender(log_file) {
        Some((writer, guard)) => (
            Some(fmt::layer().with_ansi(false).with_writer(writer)),
            Some(guard),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn open_appender(path: &Path) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let file_name = path.file_name()?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    if let Err(e) = fs::create_dir_all(dir) {
        eprintln!("Log file disabled: {}", e);
        return None;
    }

    let appender = tracing_appender::rolling::never(dir, file_name);
    Some(tracing_appender::non_blocking(appender))
}

/// Last `count` lines of the log file
pub fn tail(path: &Path, count: usize) -> std::io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(count);
    Ok(lines[start..].iter().map(|line| line.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_returns_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxlock.log");
        std::fs::write(&path, "one\ntwo\nthree\nfour\n").unwrap();

        assert_eq!(tail(&path, 2).unwrap(), vec!["three", "four"]);
        assert_eq!(tail(&path, 10).unwrap().len(), 4);
    }

    #[test]
    fn test_tail_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(tail(&dir.path().join("absent.log"), 5).is_err());
    }
}
