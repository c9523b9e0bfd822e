//! Best-effort clipboard and file-save collaborators
//!
//! Failures are non-fatal and silent; convenience actions never surface
//! errors to the transcript.

use crate::storage::downloads_dir;
use std::path::PathBuf;

/// Copy text to the system clipboard
pub fn copy_text(text: &str) {
    let result = arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(text.to_string()));
    if let Err(e) = result {
        crate::logging::debug(&format!("clipboard copy failed: {}", e));
    }
}

/// Write a file into the downloads directory, returning its path
pub fn save_download(file_name: &str, contents: &[u8]) -> Option<PathBuf> {
    let dir = downloads_dir();
    if let Err(e) = std::fs::create_dir_all(&dir) {
        crate::logging::debug(&format!("create downloads dir failed: {}", e));
        return None;
    }
    let path = dir.join(file_name);
    match std::fs::write(&path, contents) {
        Ok(()) => Some(path),
        Err(e) => {
            crate::logging::debug(&format!("save {} failed: {}", path.display(), e));
            None
        }
    }
}
