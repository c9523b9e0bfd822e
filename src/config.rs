//! Configuration file support for quill
//!
//! Config is loaded from `~/.quill/config.toml` (or `$QUILL_HOME/config.toml`).
//! Environment variables override config file settings.

use crate::storage::quill_dir;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global config instance (loaded once on first access)
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::load)
}

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Display/UI configuration
    pub display: DisplayConfig,

    /// Diagram compiler configuration
    pub diagram: DiagramConfig,

    /// Transport configuration
    pub transport: TransportConfig,

    /// Attachment/folder ingestion limits
    pub attachments: AttachmentConfig,
}

/// Display/UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Syntax highlighting theme (syntect theme name)
    pub syntax_theme: String,
    /// Lines scrolled per mouse wheel tick
    pub wheel_lines: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            syntax_theme: "base16-ocean.dark".to_string(),
            wheel_lines: 3,
        }
    }
}

/// Diagram compiler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagramConfig {
    /// Command invoked to compile a diagram description to SVG.
    /// Reads the description on stdin, writes SVG markup to stdout.
    pub command: String,
    pub args: Vec<String>,
}

impl Default for DiagramConfig {
    fn default() -> Self {
        Self {
            command: "mmdc".to_string(),
            args: vec![
                "--quiet".to_string(),
                "--input".to_string(),
                "-".to_string(),
                "--output".to_string(),
                "-".to_string(),
                "--outputFormat".to_string(),
                "svg".to_string(),
            ],
        }
    }
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TransportConfig {
    /// Command invoked per turn; receives the prompt on stdin and streams
    /// the reply on stdout. Empty means the built-in echo transport.
    pub command: String,
    pub args: Vec<String>,
}

/// Attachment/folder ingestion limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentConfig {
    /// Maximum attachment size in bytes
    pub max_bytes: u64,
    /// Maximum size per folder file included in context
    pub max_file_bytes: u64,
    /// Maximum number of files included from a folder
    pub max_files: usize,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024,
            max_file_bytes: 64 * 1024,
            max_files: 50,
        }
    }
}

impl Config {
    /// Load config from disk, then apply environment overrides
    fn load() -> Self {
        let path = quill_dir().join("config.toml");
        let mut config = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| match toml::from_str::<Config>(&content) {
                Ok(c) => Some(c),
                Err(e) => {
                    crate::logging::warn(&format!("Invalid config at {}: {}", path.display(), e));
                    None
                }
            })
            .unwrap_or_default();

        if let Ok(cmd) = std::env::var("QUILL_DIAGRAM_CMD") {
            config.diagram.command = cmd;
        }
        if let Ok(cmd) = std::env::var("QUILL_TRANSPORT_CMD") {
            config.transport.command = cmd;
        }
        if let Ok(theme) = std::env::var("QUILL_SYNTAX_THEME") {
            config.display.syntax_theme = theme;
        }

        config
    }
}
