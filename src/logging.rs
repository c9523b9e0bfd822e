//! Logging infrastructure for quill
//!
//! Logs to ~/.quill/logs/ with date-based files. The TUI owns the
//! terminal, so nothing is ever written to stdout/stderr.

use crate::storage::logs_dir;
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

struct Logger {
    file: File,
}

impl Logger {
    fn new() -> Option<Self> {
        let log_dir = logs_dir();
        fs::create_dir_all(&log_dir).ok()?;

        // Date-based log file
        let date = Local::now().format("%Y-%m-%d");
        let path = log_dir.join(format!("quill-{}.log", date));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()?;

        Some(Self { file })
    }

    fn write(&mut self, level: &str, message: &str) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let line = format!("[{}] [{}] {}\n", timestamp, level, message);
        let _ = self.file.write_all(line.as_bytes());
        let _ = self.file.flush();
    }
}

/// Initialize the logger (call once at startup)
pub fn init() {
    let mut guard = LOGGER.lock().unwrap();
    if guard.is_none() {
        *guard = Logger::new();
    }
}

fn write(level: &str, message: &str) {
    if let Ok(mut guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_mut() {
            logger.write(level, message);
        }
    }
}

/// Log an info message
pub fn info(message: &str) {
    write("INFO", message);
}

/// Log an error message
pub fn error(message: &str) {
    write("ERROR", message);
}

/// Log a warning message
pub fn warn(message: &str) {
    write("WARN", message);
}

/// Log a debug message (only if QUILL_TRACE is set)
pub fn debug(message: &str) {
    if std::env::var("QUILL_TRACE").is_ok() {
        write("DEBUG", message);
    }
}
