//! Filesystem locations for quill state
//!
//! Everything lives under `~/.quill` (or `$QUILL_HOME`).

use std::path::PathBuf;

/// Root state directory: `$QUILL_HOME` or `~/.quill`
pub fn quill_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("QUILL_HOME") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".quill")
}

/// Directory for log files
pub fn logs_dir() -> PathBuf {
    quill_dir().join("logs")
}

/// Directory for downloaded diagram files
pub fn downloads_dir() -> PathBuf {
    quill_dir().join("downloads")
}
