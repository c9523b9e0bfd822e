//! Diagram engine: one-shot async compilation of diagram descriptions
//!
//! Each mounted Diagram segment gets a `Pending → {Success | Failed}`
//! state machine, terminal with no retries. Compilation runs through an
//! external compiler collaborator; completions carry a generation token
//! so results arriving after the segment unmounted are discarded
//! without touching state. Successful renders are cached by content
//! hash, so re-render passes (and re-mounts of identical content) reuse
//! the compiled SVG.

use crate::config::DiagramConfig;
use crate::tui::clipboard;
use async_trait::async_trait;
use ratatui::prelude::*;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash as _, Hasher};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

const DIM_COLOR: Color = Color::Rgb(100, 100, 100);
const LABEL_COLOR: Color = Color::Rgb(180, 180, 180);
const ERR_COLOR: Color = Color::Rgb(200, 80, 80);

#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("failed to start `{command}`: {detail}")]
    Spawn { command: String, detail: String },
    #[error("{0}")]
    Failed(String),
}

/// Diagram compiler collaborator: description text in, SVG markup out.
/// One attempt per segment instance; no retry contract.
#[async_trait]
pub trait DiagramCompiler: Send + Sync {
    async fn compile(&self, source: &str) -> Result<String, CompileError>;
}

/// Compiler that shells out to a configured CLI (mermaid-cli by
/// default): description on stdin, SVG on stdout, error text on stderr.
pub struct CliCompiler {
    command: String,
    args: Vec<String>,
}

impl CliCompiler {
    pub fn from_config(config: &DiagramConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

#[async_trait]
impl DiagramCompiler for CliCompiler {
    async fn compile(&self, source: &str) -> Result<String, CompileError> {
        let mut child = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CompileError::Spawn {
                command: self.command.clone(),
                detail: e.to_string(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(source.as_bytes())
                .await
                .map_err(|e| CompileError::Failed(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CompileError::Failed(e.to_string()))?;

        if !output.status.success() {
            let detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if detail.is_empty() {
                format!("compiler exited with status {}", output.status)
            } else {
                detail
            };
            return Err(CompileError::Failed(detail));
        }

        let svg = String::from_utf8_lossy(&output.stdout).to_string();
        if !svg.contains("<svg") {
            return Err(CompileError::Failed("compiler produced no SVG".to_string()));
        }
        Ok(svg)
    }
}

/// A compiled diagram ready for display
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDiagram {
    /// Post-processed SVG markup (size attributes stripped, responsive
    /// class applied)
    pub svg: String,
    /// Intrinsic size in SVG user units
    pub width: f64,
    pub height: f64,
}

/// Render state for one mounted Diagram segment instance
#[derive(Debug, Clone, PartialEq)]
pub enum DiagramState {
    Pending,
    Success(RenderedDiagram),
    Failed(String),
}

/// Completion message delivered to the event loop
#[derive(Debug)]
pub struct DiagramEvent {
    pub key: u64,
    pub token: u64,
    pub result: Result<String, CompileError>,
}

pub struct DiagramEntry {
    pub source: String,
    pub state: DiagramState,
    token: u64,
}

/// Registry of mounted diagram instances.
///
/// Render passes bracket mounts with `begin_pass`/`end_pass`; entries
/// not mounted during a pass are unmounted, and their in-flight
/// compilations become no-ops on arrival.
pub struct DiagramHost {
    entries: HashMap<u64, DiagramEntry>,
    svg_cache: HashMap<u64, RenderedDiagram>,
    seen_pass: HashSet<u64>,
    next_token: u64,
    compiler: Arc<dyn DiagramCompiler>,
    tx: mpsc::Sender<DiagramEvent>,
}

/// Content hash used as the diagram instance key
pub fn diagram_key(source: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    source.hash(&mut hasher);
    hasher.finish()
}

impl DiagramHost {
    pub fn new(compiler: Arc<dyn DiagramCompiler>, tx: mpsc::Sender<DiagramEvent>) -> Self {
        Self {
            entries: HashMap::new(),
            svg_cache: HashMap::new(),
            seen_pass: HashSet::new(),
            next_token: 0,
            compiler,
            tx,
        }
    }

    pub fn begin_pass(&mut self) {
        self.seen_pass.clear();
    }

    /// Mount a diagram segment; spawns the compile task on first sight
    pub fn mount(&mut self, source: &str) -> u64 {
        let key = diagram_key(source);
        self.seen_pass.insert(key);

        if self.entries.contains_key(&key) {
            return key;
        }

        if let Some(rendered) = self.svg_cache.get(&key) {
            self.entries.insert(
                key,
                DiagramEntry {
                    source: source.to_string(),
                    state: DiagramState::Success(rendered.clone()),
                    token: 0,
                },
            );
            return key;
        }

        self.next_token += 1;
        let token = self.next_token;
        self.entries.insert(
            key,
            DiagramEntry {
                source: source.to_string(),
                state: DiagramState::Pending,
                token,
            },
        );

        let compiler = Arc::clone(&self.compiler);
        let source = source.to_string();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = compiler.compile(&source).await;
            let _ = tx.send(DiagramEvent { key, token, result }).await;
        });

        key
    }

    /// Unmount every entry not seen since `begin_pass`
    pub fn end_pass(&mut self) {
        let seen = std::mem::take(&mut self.seen_pass);
        self.entries.retain(|key, _| seen.contains(key));
    }

    /// Apply a compile completion; stale or unmounted results are
    /// silently discarded, and the transition is one-shot.
    pub fn resolve(&mut self, event: DiagramEvent) {
        let Some(entry) = self.entries.get_mut(&event.key) else {
            return;
        };
        if entry.token != event.token || entry.state != DiagramState::Pending {
            return;
        }
        match event.result {
            Ok(svg) => {
                let rendered = process_svg(&svg);
                self.svg_cache.insert(event.key, rendered.clone());
                entry.state = DiagramState::Success(rendered);
            }
            Err(e) => {
                crate::logging::warn(&format!("diagram compile failed: {}", e));
                entry.state = DiagramState::Failed(e.to_string());
            }
        }
    }

    pub fn entry(&self, key: u64) -> Option<&DiagramEntry> {
        self.entries.get(&key)
    }

    /// Copy the original description text (never the image markup)
    pub fn copy_source(&self, key: u64) -> bool {
        match self.entries.get(&key) {
            Some(entry) => {
                clipboard::copy_text(&entry.source);
                true
            }
            None => false,
        }
    }

    /// Serialize the compiled SVG to a file; Success only
    pub fn download(&self, key: u64) -> Option<PathBuf> {
        let entry = self.entries.get(&key)?;
        let DiagramState::Success(rendered) = &entry.state else {
            return None;
        };
        clipboard::save_download(&format!("diagram-{:016x}.svg", key), rendered.svg.as_bytes())
    }

    /// Whether the viewport may open for this diagram; Success only
    pub fn expandable(&self, key: u64) -> bool {
        matches!(
            self.entries.get(&key).map(|e| &e.state),
            Some(DiagramState::Success(_))
        )
    }
}

// ============================================================================
// SVG post-processing
// ============================================================================

static SVG_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<svg\b[^>]*>").unwrap());
static SIZE_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s+(?:width|height)="[^"]*""#).unwrap());
static INLINE_SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"inline-size:\s*[^;'\x22]*;?").unwrap());
static VIEW_BOX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"viewBox="([^"]*)""#).unwrap());
static CLASS_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"class="([^"]*)""#).unwrap());

/// Strip explicit sizing from the root element and apply the responsive
/// class, letting the container control display size.
pub fn process_svg(svg: &str) -> RenderedDiagram {
    let (width, height) = intrinsic_size(svg);

    let processed = match SVG_OPEN_RE.find(svg) {
        Some(open) => {
            let mut tag = open.as_str().to_string();
            tag = SIZE_ATTR_RE.replace_all(&tag, "").to_string();
            tag = INLINE_SIZE_RE.replace_all(&tag, "").to_string();
            tag = if let Some(class) = CLASS_ATTR_RE.captures(&tag) {
                let merged = format!(r#"class="{} diagram-responsive""#, &class[1]);
                CLASS_ATTR_RE.replace(&tag, merged.as_str()).to_string()
            } else {
                tag.replacen("<svg", r#"<svg class="diagram-responsive""#, 1)
            };
            format!("{}{}{}", &svg[..open.start()], tag, &svg[open.end()..])
        }
        None => svg.to_string(),
    };

    RenderedDiagram {
        svg: processed,
        width,
        height,
    }
}

/// Intrinsic size from the viewBox, falling back to the explicit
/// width/height attributes (before they are stripped), then a default.
fn intrinsic_size(svg: &str) -> (f64, f64) {
    if let Some(vb) = VIEW_BOX_RE.captures(svg) {
        let nums: Vec<f64> = vb[1]
            .split_whitespace()
            .filter_map(|n| n.parse().ok())
            .collect();
        if let [_, _, w, h] = nums[..] {
            if w > 0.0 && h > 0.0 {
                return (w, h);
            }
        }
    }

    let attr = |name: &str| -> Option<f64> {
        Regex::new(&format!(r#"{}="([0-9.]+)(?:px)?""#, name))
            .ok()?
            .captures(svg)?[1]
            .parse()
            .ok()
    };
    match (attr("width"), attr("height")) {
        (Some(w), Some(h)) => (w, h),
        _ => (400.0, 300.0),
    }
}

// ============================================================================
// Geometry outline (for the viewport projection)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct OutlineRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutlineEdge {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutlineLabel {
    pub x: f64,
    pub y: f64,
    pub text: String,
}

/// Coarse geometry extracted from compiled SVG markup, projected into
/// terminal cells by the viewport renderer.
#[derive(Debug, Clone, Default)]
pub struct SvgOutline {
    pub rects: Vec<OutlineRect>,
    pub edges: Vec<OutlineEdge>,
    pub labels: Vec<OutlineLabel>,
}

static RECT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<rect\b[^>]*>").unwrap());
static LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<line\b[^>]*>").unwrap());
static TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<text\b[^>]*>([^<]*)</text>").unwrap());

fn tag_attr(tag: &str, name: &str) -> Option<f64> {
    let re = Regex::new(&format!(r#"\b{}="(-?[0-9.]+)""#, name)).ok()?;
    re.captures(tag)?[1].parse().ok()
}

pub fn extract_outline(svg: &str) -> SvgOutline {
    let mut outline = SvgOutline::default();

    for m in RECT_RE.find_iter(svg) {
        let tag = m.as_str();
        outline.rects.push(OutlineRect {
            x: tag_attr(tag, "x").unwrap_or(0.0),
            y: tag_attr(tag, "y").unwrap_or(0.0),
            w: tag_attr(tag, "width").unwrap_or(0.0),
            h: tag_attr(tag, "height").unwrap_or(0.0),
        });
    }

    for m in LINE_RE.find_iter(svg) {
        let tag = m.as_str();
        outline.edges.push(OutlineEdge {
            x1: tag_attr(tag, "x1").unwrap_or(0.0),
            y1: tag_attr(tag, "y1").unwrap_or(0.0),
            x2: tag_attr(tag, "x2").unwrap_or(0.0),
            y2: tag_attr(tag, "y2").unwrap_or(0.0),
        });
    }

    for caps in TEXT_RE.captures_iter(svg) {
        let tag = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        let text = caps[1].trim().to_string();
        if text.is_empty() {
            continue;
        }
        outline.labels.push(OutlineLabel {
            x: tag_attr(tag, "x").unwrap_or(0.0),
            y: tag_attr(tag, "y").unwrap_or(0.0),
            text,
        });
    }

    outline
}

// ============================================================================
// Inline cards
// ============================================================================

/// Card shown while compilation is in flight
pub fn pending_lines() -> Vec<Line<'static>> {
    let dim = Style::default().fg(DIM_COLOR);
    vec![
        Line::from(Span::styled("┌─ mermaid ", dim)),
        Line::from(vec![
            Span::styled("│ ", dim),
            Span::styled("rendering…", Style::default().fg(LABEL_COLOR)),
        ]),
        Line::from(Span::styled("└─", dim)),
    ]
}

/// Card for a successfully compiled diagram, with the toolbar hints
pub fn success_lines(rendered: &RenderedDiagram) -> Vec<Line<'static>> {
    let dim = Style::default().fg(DIM_COLOR);
    vec![
        Line::from(Span::styled("┌─ mermaid ", dim)),
        Line::from(vec![
            Span::styled("│ ", dim),
            Span::styled(
                format!("diagram {:.0}×{:.0}", rendered.width, rendered.height),
                Style::default().fg(LABEL_COLOR),
            ),
        ]),
        Line::from(vec![
            Span::styled("│ ", dim),
            Span::styled("ctrl+e expand · ctrl+y copy · ctrl+s save", dim),
        ]),
        Line::from(Span::styled("└─", dim)),
    ]
}

/// Inline error panel; scoped to this segment, the rest of the message
/// renders normally
pub fn error_lines(error: &str) -> Vec<Line<'static>> {
    let dim = Style::default().fg(DIM_COLOR);
    let err_style = Style::default().fg(ERR_COLOR);

    let mut lines = vec![Line::from(Span::styled("┌─ mermaid error ", dim))];
    for detail in error.lines() {
        lines.push(Line::from(vec![
            Span::styled("│ ", dim),
            Span::styled(detail.to_string(), err_style),
        ]));
    }
    lines.push(Line::from(Span::styled("└─", dim)));
    lines
}
