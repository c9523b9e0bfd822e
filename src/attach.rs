//! Attachment and folder ingestion
//!
//! Both collaborators produce opaque payloads the core prepends to the
//! prompt and renders as compact previews. Oversized or malformed input
//! is rejected before submission; folder scanning silently skips files
//! that are binary or over the per-file limit.

use crate::config::AttachmentConfig;
use crate::message::{Attachment, FolderSummary};
use base64::Engine as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("{name} is {size} bytes, over the {limit} byte limit")]
    TooLarge { name: String, size: u64, limit: u64 },
    #[error("cannot read {name}: {detail}")]
    Unreadable { name: String, detail: String },
    #[error("{name} is not a valid image: {detail}")]
    BadImage { name: String, detail: String },
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Media type inferred from the file extension
pub fn media_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "text/plain",
    }
}

/// Load a single attachment, enforcing the size limit and validating
/// image payloads by decoding them.
pub async fn load_attachment(
    path: &Path,
    limits: &AttachmentConfig,
) -> Result<Attachment, AttachError> {
    let name = file_name(path);

    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| AttachError::Unreadable {
            name: name.clone(),
            detail: e.to_string(),
        })?;
    if meta.len() > limits.max_bytes {
        return Err(AttachError::TooLarge {
            name,
            size: meta.len(),
            limit: limits.max_bytes,
        });
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AttachError::Unreadable {
            name: name.clone(),
            detail: e.to_string(),
        })?;

    let media_type = media_type_for(path);
    if media_type.starts_with("image/") {
        image::load_from_memory(&bytes).map_err(|e| AttachError::BadImage {
            name: name.clone(),
            detail: e.to_string(),
        })?;
    }

    Ok(Attachment {
        name,
        media_type: media_type.to_string(),
        data: base64::engine::general_purpose::STANDARD.encode(&bytes),
    })
}

/// Summarize a folder into pre-formatted textual context.
///
/// Walks the folder gitignore-aware, includes readable UTF-8 files up
/// to the per-file limit, and stops after `max_files`. Skipped files
/// are dropped without a trace.
pub async fn summarize_folder(
    path: &Path,
    limits: &AttachmentConfig,
) -> Result<FolderSummary, AttachError> {
    let name = file_name(path);
    let root = path.to_path_buf();
    let limits = limits.clone();

    let summary = tokio::task::spawn_blocking(move || scan_folder(&root, &limits))
        .await
        .map_err(|e| AttachError::Unreadable {
            name: name.clone(),
            detail: e.to_string(),
        })?;

    match summary {
        Some((file_count, context)) => Ok(FolderSummary {
            name,
            file_count,
            context,
        }),
        None => Err(AttachError::Unreadable {
            name,
            detail: "not a readable directory".to_string(),
        }),
    }
}

fn scan_folder(root: &PathBuf, limits: &AttachmentConfig) -> Option<(usize, String)> {
    if !root.is_dir() {
        return None;
    }

    let mut file_count = 0usize;
    let mut context = String::new();

    for entry in ignore::WalkBuilder::new(root).build() {
        if file_count >= limits.max_files {
            break;
        }
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(meta) = path.metadata() else { continue };
        if meta.len() > limits.max_file_bytes {
            continue;
        }
        // Text files only; binary content is skipped
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };

        let rel = path.strip_prefix(root).unwrap_or(path);
        context.push_str(&format!("== {} ==\n{}\n", rel.display(), contents));
        file_count += 1;
    }

    Some((file_count, context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn limits() -> AttachmentConfig {
        AttachmentConfig {
            max_bytes: 1024,
            max_file_bytes: 64,
            max_files: 10,
        }
    }

    #[tokio::test]
    async fn test_oversized_attachment_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, vec![b'x'; 2048]).unwrap();

        let err = load_attachment(&path, &limits()).await.unwrap_err();
        assert!(matches!(err, AttachError::TooLarge { size: 2048, .. }));
    }

    #[tokio::test]
    async fn test_malformed_image_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.png");
        std::fs::write(&path, b"not a png").unwrap();

        let err = load_attachment(&path, &limits()).await.unwrap_err();
        assert!(matches!(err, AttachError::BadImage { .. }));
    }

    #[tokio::test]
    async fn test_text_attachment_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "hello").unwrap();

        let attachment = load_attachment(&path, &limits()).await.unwrap();
        assert_eq!(attachment.media_type, "text/plain");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(attachment.data)
            .unwrap();
        assert_eq!(decoded, b"hello");
    }

    #[tokio::test]
    async fn test_folder_summary_skips_binary_and_oversized() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.rs"), "fn keep() {}").unwrap();
        std::fs::write(dir.path().join("skip.bin"), [0u8, 159, 146, 150]).unwrap();
        let mut big = std::fs::File::create(dir.path().join("big.txt")).unwrap();
        big.write_all(&vec![b'y'; 100]).unwrap();

        let summary = summarize_folder(dir.path(), &limits()).await.unwrap();
        assert_eq!(summary.file_count, 1);
        assert!(summary.context.contains("keep.rs"));
        assert!(!summary.context.contains("skip.bin"));
        assert!(!summary.context.contains("big.txt"));
    }
}
