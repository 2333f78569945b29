//! Session logging: console plus a timestamped log file

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::E2eResult;

/// Name of the log file for a run started at `now`
pub fn log_file_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("test_run_{}.log", now.format("%Y%m%d_%H%M%S"))
}

/// Install the global subscriber and return the path of the log file.
///
/// `RUST_LOG` takes precedence over the default level. A subscriber that is
/// already installed is left in place, so repeated calls only create a new
/// (unused) file.
pub fn init(logs_dir: &Path, debug: bool) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(logs_dir)?;
    let log_path = logs_dir.join(log_file_name(chrono::Local::now()));
    let file = File::create(&log_path)?;

    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .with(filter)
        .try_init();

    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_file_name_is_timestamped() {
        let at = chrono::Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(log_file_name(at), "test_run_20240309_140507.log");
    }

    #[test]
    fn test_init_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");

        let path = init(&logs, false).unwrap();
        assert!(path.starts_with(&logs));
        assert!(path.exists());

        // A second call must not fail even though a subscriber is installed.
        init(&logs, true).unwrap();
    }
}
