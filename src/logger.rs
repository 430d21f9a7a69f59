//! Run log for the `ink-filter` binary.
//!
//! One file per run, truncated when the binary starts:
//!   `$INK_FILTER_LOG` if set, otherwise `<data dir>/InkFilter/ink-filter.log`
//!   where the data dir is `%APPDATA%`, `~/Library/Application Support`,
//!   `$XDG_DATA_HOME` or `~/.local/share`.
//!
//! Library code logs through `log_info!` / `log_warn!` / `log_err!`.  Nothing
//! is written until [`init`] installs the run log, so hosts embedding the
//! filters (and the unit tests) never touch the filesystem.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

static RUN_LOG: OnceLock<RunLog> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Panic,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Panic => "PANIC",
        })
    }
}

/// An open, truncated log file.
pub struct RunLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl RunLog {
    /// Create (or truncate) the file at `path`, creating parent directories.
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one `[HH:MM:SS] [LEVEL] msg` line.  I/O errors are dropped.
    pub fn record(&self, level: Level, msg: &str) {
        self.raw_line(&format!("[{}] [{}] {}", clock_now(), level, msg));
    }

    fn raw_line(&self, line: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{}", line);
        }
    }
}

/// Path of the installed run log, if [`init`] succeeded.
pub fn log_path() -> Option<&'static Path> {
    RUN_LOG.get().map(RunLog::path)
}

/// Record `msg` in the run log.  A no-op before [`init`].
pub fn write(level: Level, msg: &str) {
    if let Some(log) = RUN_LOG.get() {
        log.record(level, msg);
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*))
    };
}

/// Install the run log and a panic hook that records panics before
/// delegating to the previous hook.  Failure to open the file is reported on
/// stderr and the run continues unlogged.
pub fn init() {
    let path = default_log_path();
    let log = match RunLog::create(&path) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("warning: cannot open log file {}: {}", path.display(), e);
            return;
        }
    };
    log.raw_line(&format!(
        "ink-filter {} run log, started at unix {}",
        env!("CARGO_PKG_VERSION"),
        unix_secs()
    ));
    if RUN_LOG.set(log).is_err() {
        return;
    }

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write(Level::Panic, &info.to_string());
        previous(info);
    }));
}

fn default_log_path() -> PathBuf {
    if let Some(path) = std::env::var_os("INK_FILTER_LOG") {
        return PathBuf::from(path);
    }
    data_dir().join("InkFilter").join("ink-filter.log")
}

fn data_dir() -> PathBuf {
    let var = |name: &str| std::env::var_os(name).map(PathBuf::from);
    if cfg!(target_os = "windows")
        && let Some(appdata) = var("APPDATA")
    {
        return appdata;
    }
    if cfg!(target_os = "macos")
        && let Some(home) = var("HOME")
    {
        return home.join("Library").join("Application Support");
    }
    var("XDG_DATA_HOME")
        .or_else(|| var("HOME").map(|home| home.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

fn clock_now() -> String {
    format_clock(unix_secs())
}

/// `HH:MM:SS` (UTC) of a unix timestamp.
fn format_clock(secs: u64) -> String {
    let day = secs % 86_400;
    format!("{:02}:{:02}:{:02}", day / 3600, day % 3600 / 60, day % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn clock_wraps_at_midnight() {
        assert_eq!(format_clock(0), "00:00:00");
        assert_eq!(format_clock(3661), "01:01:01");
        assert_eq!(format_clock(86_400 + 59), "00:00:59");
    }

    #[test]
    fn macros_are_silent_before_init() {
        log_info!("ink={}", 200);
        log_warn!("uniform {} missing", "uStepW");
        assert!(log_path().is_none());
    }

    #[test]
    fn run_log_truncates_and_tags_levels() {
        let dir = TempDir::new("ink_filter_log").unwrap();
        let path = dir.path().join("nested").join("run.log");

        let log = RunLog::create(&path).unwrap();
        log.record(Level::Warn, "GPU run failed");
        drop(log);
        let log = RunLog::create(&path).unwrap();
        log.record(Level::Info, "second run");
        drop(log);

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("[INFO] second run"), "{}", lines[0]);
    }
}
