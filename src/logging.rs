// src/logging.rs
//
// Timestamped stderr logging with an optional log file.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Global log file handle. When `Some`, `tlog!` writes to both stderr and this file.
pub(crate) static LOG_FILE: Mutex<Option<std::fs::File>> = Mutex::new(None);

/// Timestamp format shared by log lines and frame timestamps.
pub const TIME_FORMAT: &str = "%H:%M:%S%.3f";

/// Start appending log lines to a new `<timestamp>-canmon.log` in `log_dir`.
/// Returns the path of the file.
pub fn init_file_logging(log_dir: &Path) -> Result<PathBuf, String> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| format!("Failed to create log dir: {}", e))?;

    let log_path = log_dir.join(
        chrono::Local::now()
            .format("%Y%m%d-%H%M%S-canmon.log")
            .to_string(),
    );

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| format!("Failed to create log file: {}", e))?;

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }

    // eprintln directly: tlog! would lock LOG_FILE again
    eprintln!(
        "{} [logging] File logging started: {}",
        chrono::Local::now().format(TIME_FORMAT),
        log_path.display()
    );

    Ok(log_path)
}

/// Stop file logging and close the log file.
pub fn stop_file_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if guard.is_some() {
            *guard = None;
            eprintln!(
                "{} [logging] File logging stopped",
                chrono::Local::now().format(TIME_FORMAT)
            );
        }
    }
}

/// Timestamped logging macro.
/// Prepends `HH:MM:SS.mmm` local time to every message written to stderr.
/// Also writes to the log file when file logging is enabled.
macro_rules! tlog {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        let msg = format!(
            "{} {}",
            chrono::Local::now().format($crate::logging::TIME_FORMAT),
            format_args!($($arg)*)
        );
        eprintln!("{}", msg);
        if let Ok(mut guard) = $crate::logging::LOG_FILE.lock() {
            if let Some(ref mut f) = *guard {
                let _ = writeln!(f, "{}", msg);
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_logging_writes_lines() {
        let dir = std::env::temp_dir().join(format!("canmon-log-test-{}", std::process::id()));
        let path = init_file_logging(&dir).expect("init logging");

        tlog!("[test] hello {}", 42);
        stop_file_logging();

        let content = std::fs::read_to_string(&path).expect("read log");
        assert!(content.contains("[test] hello 42"));
        assert!(path.to_string_lossy().ends_with("-canmon.log"));
        assert_eq!(std::fs::read_dir(&dir).expect("list log dir").count(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
