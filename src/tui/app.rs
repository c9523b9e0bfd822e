//! Application state and event loop
//!
//! Single cooperative loop: terminal input, transport deltas, and
//! diagram compile completions interleave through one `select!`. Each
//! piece of mutable state (transcript, diagram registry, viewport
//! transform) is owned and mutated here only.

use crate::attach;
use crate::config::config;
use crate::logging;
use crate::message::{Attachment, FolderSummary, Message, Role, StreamEvent};
use crate::segment::{self, Segment};
use crate::transport::{EventStream, Transport, TransportError};
use crate::tui::code::COPY_FLASH;
use crate::tui::mermaid::{
    DiagramCompiler, DiagramEvent, DiagramHost, DiagramState, SvgOutline,
};
use crate::tui::stream::StreamCoalescer;
use crate::tui::transcript::Transcript;
use crate::tui::viewport::{Viewport, ZoomDirection};
use crate::tui::{clipboard, mermaid, ui};
use anyhow::Result;
use crossterm::event::{
    Event, EventStream as TerminalEvents, KeyCode, KeyEvent, KeyEventKind, KeyModifiers,
    MouseButton, MouseEvent, MouseEventKind,
};
use futures::StreamExt;
use ratatui::Terminal;
use ratatui::backend::Backend;
use ratatui::layout::Rect;
use std::hash::{Hash as _, Hasher as _};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// What the client is doing with the in-flight turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Idle,
    /// Turn submitted, no delta yet
    Waiting,
    /// Receiving streaming response
    Streaming,
}

enum Step {
    Terminal(Option<std::io::Result<Event>>),
    Reply(Option<Result<StreamEvent, TransportError>>),
    Diagram(Option<DiagramEvent>),
    Tick,
}

pub struct App {
    pub transcript: Transcript,
    pub diagrams: DiagramHost,

    // Diagram inspector (modal; at most one open)
    pub viewport: Option<Viewport>,
    pub viewport_outline: Option<SvgOutline>,
    pub viewport_area: Rect,

    // Composer
    pub input: String,
    pub cursor_pos: usize,
    pub staged_attachment: Option<Attachment>,
    pub staged_folder: Option<FolderSummary>,
    pub notice: Option<String>,

    pub status: ProcessingStatus,
    pub processing_started: Option<Instant>,
    pub last_max_scroll: usize,
    pub last_scroll_offset: usize,
    /// Transcript line ranges occupied by diagram cards, per draw pass
    pub diagram_hits: Vec<(std::ops::Range<usize>, u64)>,
    pub transcript_area: Rect,
    pub transport_name: String,
    pub should_quit: bool,

    transport: Arc<dyn Transport>,
    reply: Option<EventStream>,
    diagram_rx: mpsc::Receiver<DiagramEvent>,
    coalescer: StreamCoalescer,
    copied: Option<(u64, Instant)>,
    dirty: bool,
}

fn content_key(text: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

impl App {
    pub fn new(transport: Arc<dyn Transport>, compiler: Arc<dyn DiagramCompiler>) -> Self {
        let (diagram_tx, diagram_rx) = mpsc::channel(32);
        let transport_name = transport.name().to_string();
        Self {
            transcript: Transcript::new(),
            diagrams: DiagramHost::new(compiler, diagram_tx),
            viewport: None,
            viewport_outline: None,
            viewport_area: Rect::default(),
            input: String::new(),
            cursor_pos: 0,
            staged_attachment: None,
            staged_folder: None,
            notice: None,
            status: ProcessingStatus::Idle,
            processing_started: None,
            last_max_scroll: 0,
            last_scroll_offset: 0,
            diagram_hits: Vec::new(),
            transcript_area: Rect::default(),
            transport_name,
            should_quit: false,
            transport,
            reply: None,
            diagram_rx,
            coalescer: StreamCoalescer::new(),
            copied: None,
            dirty: true,
        }
    }

    pub async fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()>
    where
        B::Error: Send + Sync + 'static,
    {
        let mut events = TerminalEvents::new();
        let mut tick = tokio::time::interval(Duration::from_millis(100));

        while !self.should_quit {
            if self.dirty {
                terminal.draw(|f| ui::draw(f, self))?;
                self.dirty = false;
            }

            let step = {
                let Self {
                    reply, diagram_rx, ..
                } = self;
                tokio::select! {
                    event = events.next() => Step::Terminal(event),
                    reply_event = next_reply(reply) => Step::Reply(reply_event),
                    diagram = diagram_rx.recv() => Step::Diagram(diagram),
                    _ = tick.tick() => Step::Tick,
                }
            };

            match step {
                Step::Terminal(Some(Ok(event))) => self.handle_terminal(event).await,
                Step::Terminal(Some(Err(_)) | None) => break,
                Step::Reply(event) => self.handle_reply(event),
                Step::Diagram(Some(event)) => {
                    self.diagrams.resolve(event);
                    self.dirty = true;
                }
                Step::Diagram(None) => {}
                Step::Tick => self.on_tick(),
            }
        }
        Ok(())
    }

    // ========== Terminal events ==========

    async fn handle_terminal(&mut self, event: Event) {
        match event {
            Event::Key(key) if key.kind != KeyEventKind::Release => self.handle_key(key).await,
            Event::Mouse(mouse) => self.handle_mouse(mouse),
            Event::Paste(text) => {
                self.insert_str(&text);
                self.dirty = true;
            }
            Event::Resize(_, _) => self.dirty = true,
            _ => {}
        }
    }

    async fn handle_key(&mut self, key: KeyEvent) {
        self.dirty = true;

        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }

        // The inspector is modal: while open, input is scoped to it
        if self.viewport.is_some() {
            match key.code {
                KeyCode::Esc | KeyCode::Char('q') => self.close_viewport(),
                KeyCode::Char('0') | KeyCode::Char('r') => {
                    if let Some(vp) = self.viewport.as_mut() {
                        vp.reset_animated(Instant::now());
                    }
                }
                _ => {}
            }
            return;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('k') => {
                    let max = self.last_max_scroll;
                    self.transcript.scroll_up(config().display.wheel_lines, max);
                }
                KeyCode::Char('j') => {
                    let max = self.last_max_scroll;
                    self.transcript.scroll_down(config().display.wheel_lines, max);
                }
                KeyCode::Char('g') => self.transcript.follow_bottom(),
                KeyCode::Char('e') => self.expand_latest_diagram(),
                KeyCode::Char('y') => self.copy_latest_diagram_source(),
                KeyCode::Char('s') => self.download_latest_diagram(),
                KeyCode::Char('b') => self.copy_latest_code_block(),
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Enter => self.submit().await,
            KeyCode::Esc => self.notice = None,
            KeyCode::Char(c) => self.insert_char(c),
            KeyCode::Backspace => self.backspace(),
            KeyCode::Delete => self.delete(),
            KeyCode::Left => self.move_left(),
            KeyCode::Right => self.move_right(),
            KeyCode::Home => self.cursor_pos = 0,
            KeyCode::End => self.cursor_pos = self.input.len(),
            KeyCode::PageUp => {
                let max = self.last_max_scroll;
                self.transcript.scroll_up(10, max);
            }
            KeyCode::PageDown => {
                let max = self.last_max_scroll;
                self.transcript.scroll_down(10, max);
            }
            _ => {}
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if self.viewport.is_some() {
            self.handle_viewport_mouse(mouse);
            return;
        }

        self.dirty = true;
        let max = self.last_max_scroll;
        match mouse.kind {
            MouseEventKind::ScrollUp => {
                self.transcript.scroll_up(config().display.wheel_lines, max);
            }
            MouseEventKind::ScrollDown => {
                self.transcript.scroll_down(config().display.wheel_lines, max);
            }
            MouseEventKind::Down(MouseButton::Left) => {
                if let Some(key) = self.diagram_at(mouse.column, mouse.row) {
                    self.expand_diagram(key);
                }
            }
            _ => {}
        }
    }

    /// Which diagram card, if any, sits under this transcript cell
    fn diagram_at(&self, column: u16, row: u16) -> Option<u64> {
        let area = self.transcript_area;
        if !area.contains(ratatui::layout::Position { x: column, y: row }) {
            return None;
        }
        let line = self.last_scroll_offset + usize::from(row - area.y);
        self.diagram_hits
            .iter()
            .find(|(range, _)| range.contains(&line))
            .map(|&(_, key)| key)
    }

    /// Pointer handling scoped to the open inspector. The background
    /// transcript never sees these events (scroll stays locked).
    fn handle_viewport_mouse(&mut self, mouse: MouseEvent) {
        let area = self.viewport_area;
        let inside = area.contains(ratatui::layout::Position {
            x: mouse.column,
            y: mouse.row,
        });
        let rel_x = mouse.column.saturating_sub(area.x.saturating_add(1));
        let rel_y = mouse.row.saturating_sub(area.y.saturating_add(1));
        let now = Instant::now();

        let Some(vp) = self.viewport.as_mut() else {
            return;
        };

        match mouse.kind {
            MouseEventKind::ScrollUp => {
                vp.on_wheel(rel_x, rel_y, ZoomDirection::In);
                self.dirty = vp.throttle.should_draw(now);
            }
            MouseEventKind::ScrollDown => {
                vp.on_wheel(rel_x, rel_y, ZoomDirection::Out);
                self.dirty = vp.throttle.should_draw(now);
            }
            MouseEventKind::Down(MouseButton::Left) => {
                if inside {
                    vp.on_primary_down(rel_x, rel_y, now);
                } else {
                    // Backdrop click
                    self.close_viewport();
                }
                self.dirty = true;
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                if inside {
                    vp.on_drag(rel_x, rel_y);
                } else {
                    // Leaving the drag area ends the pan
                    vp.end_drag();
                }
                self.dirty = vp.throttle.should_draw(now);
            }
            MouseEventKind::Up(MouseButton::Left) => {
                vp.end_drag();
                self.dirty = true;
            }
            // Only the primary button initiates a pan
            MouseEventKind::Down(_) | MouseEventKind::Drag(_) | MouseEventKind::Up(_) => {}
            _ => {}
        }
    }

    // ========== Streaming reply ==========

    fn handle_reply(&mut self, event: Option<Result<StreamEvent, TransportError>>) {
        match event {
            Some(Ok(StreamEvent::Delta(delta))) => {
                self.status = ProcessingStatus::Streaming;
                self.transcript.apply_delta(&delta);
                // Coalesce re-renders to semantic boundaries
                if self.coalescer.push(&delta) {
                    self.dirty = true;
                }
            }
            Some(Ok(StreamEvent::Done)) | None => {
                self.transcript.finish_reply();
                self.end_turn();
            }
            Some(Err(error)) => {
                logging::error(&format!("transport error: {}", error));
                self.transcript.fail_reply(&error);
                self.end_turn();
            }
        }
    }

    fn end_turn(&mut self) {
        self.reply = None;
        self.status = ProcessingStatus::Idle;
        self.processing_started = None;
        self.coalescer.flush();
        self.dirty = true;
    }

    fn on_tick(&mut self) {
        if let Some((_, at)) = self.copied {
            if at.elapsed() >= COPY_FLASH {
                self.copied = None;
                self.dirty = true;
            }
        }
        if self.coalescer.should_flush() {
            self.coalescer.flush();
            self.dirty = true;
        }
        if self.status != ProcessingStatus::Idle || self.viewport.is_some() {
            self.dirty = true;
        }
    }

    // ========== Submission ==========

    async fn submit(&mut self) {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return;
        }
        if let Some(path) = text.strip_prefix("/attach ") {
            self.stage_attachment(path.trim().to_string()).await;
            return;
        }
        if let Some(path) = text.strip_prefix("/folder ") {
            self.stage_folder(path.trim().to_string()).await;
            return;
        }
        if self.transcript.is_streaming() {
            self.notice = Some("a reply is still streaming".to_string());
            return;
        }

        let mut turn = Message::user(&text);
        turn.attachment = self.staged_attachment.take();
        turn.folder = self.staged_folder.take();

        let history = self.transcript.messages().to_vec();
        self.transcript.push_user(turn.clone());
        self.transcript.begin_reply();
        self.input.clear();
        self.cursor_pos = 0;
        self.notice = None;
        self.status = ProcessingStatus::Waiting;
        self.processing_started = Some(Instant::now());
        self.coalescer.reset();

        match self.transport.complete(&history, &turn).await {
            Ok(stream) => self.reply = Some(stream),
            Err(error) => {
                logging::error(&format!("transport start failed: {}", error));
                self.transcript.fail_reply(&error);
                self.status = ProcessingStatus::Idle;
                self.processing_started = None;
            }
        }
    }

    /// Stage an attachment for the next turn. On failure the composer
    /// keeps the typed command so the path can be corrected.
    async fn stage_attachment(&mut self, path: String) {
        match attach::load_attachment(Path::new(&path), &config().attachments).await {
            Ok(attachment) => {
                self.notice = Some(format!("attached {}", attachment.name));
                self.staged_attachment = Some(attachment);
                self.input.clear();
                self.cursor_pos = 0;
            }
            Err(error) => self.notice = Some(error.to_string()),
        }
    }

    async fn stage_folder(&mut self, path: String) {
        match attach::summarize_folder(Path::new(&path), &config().attachments).await {
            Ok(folder) => {
                self.notice = Some(format!(
                    "including {} ({} files)",
                    folder.name, folder.file_count
                ));
                self.staged_folder = Some(folder);
                self.input.clear();
                self.cursor_pos = 0;
            }
            Err(error) => self.notice = Some(error.to_string()),
        }
    }

    // ========== Diagram & code actions ==========

    fn latest_diagram_source(&self) -> Option<String> {
        for msg in self.transcript.messages().iter().rev() {
            if msg.role != Role::Model {
                continue;
            }
            let found = segment::segment(&msg.content)
                .into_iter()
                .rev()
                .find_map(|seg| match seg {
                    Segment::Diagram { source, .. } => Some(source),
                    _ => None,
                });
            if found.is_some() {
                return found;
            }
        }
        None
    }

    fn latest_code_block(&self) -> Option<String> {
        for msg in self.transcript.messages().iter().rev() {
            if msg.role != Role::Model {
                continue;
            }
            let found = segment::segment(&msg.content)
                .into_iter()
                .rev()
                .find_map(|seg| match seg {
                    Segment::Code { code, .. } => Some(code),
                    _ => None,
                });
            if found.is_some() {
                return found;
            }
        }
        None
    }

    fn expand_latest_diagram(&mut self) {
        let Some(source) = self.latest_diagram_source() else {
            self.notice = Some("no diagram to expand".to_string());
            return;
        };
        self.expand_diagram(mermaid::diagram_key(&source));
    }

    /// Open the inspector for one diagram instance; Success only
    fn expand_diagram(&mut self, key: u64) {
        match self.diagrams.entry(key).map(|e| &e.state) {
            Some(DiagramState::Success(rendered)) => {
                self.viewport_outline = Some(mermaid::extract_outline(&rendered.svg));
                self.viewport = Some(Viewport::open(key));
            }
            _ => self.notice = Some("diagram is not rendered yet".to_string()),
        }
    }

    /// Close the inspector and restore the transcript. Every close path
    /// (Esc, q, backdrop click, explicit control) funnels here.
    fn close_viewport(&mut self) {
        self.viewport = None;
        self.viewport_outline = None;
        self.dirty = true;
    }

    fn copy_latest_diagram_source(&mut self) {
        if let Some(source) = self.latest_diagram_source() {
            let key = mermaid::diagram_key(&source);
            if self.diagrams.copy_source(key) {
                self.notice = Some("diagram source copied".to_string());
            }
        }
    }

    fn download_latest_diagram(&mut self) {
        let Some(source) = self.latest_diagram_source() else {
            return;
        };
        let key = mermaid::diagram_key(&source);
        match self.diagrams.download(key) {
            Some(path) => self.notice = Some(format!("saved {}", path.display())),
            None => self.notice = Some("diagram is not rendered yet".to_string()),
        }
    }

    fn copy_latest_code_block(&mut self) {
        if let Some(code) = self.latest_code_block() {
            // The exact original text goes on the clipboard, never the
            // highlighted rendering
            clipboard::copy_text(&code);
            self.copied = Some((content_key(&code), Instant::now()));
        }
    }

    /// Whether this text's copy acknowledgment is currently showing
    pub fn is_copied_text(&self, text: &str) -> bool {
        self.copied
            .is_some_and(|(key, at)| key == content_key(text) && at.elapsed() < COPY_FLASH)
    }

    // ========== Composer editing ==========

    fn insert_char(&mut self, c: char) {
        self.input.insert(self.cursor_pos, c);
        self.cursor_pos += c.len_utf8();
    }

    fn insert_str(&mut self, text: &str) {
        self.input.insert_str(self.cursor_pos, text);
        self.cursor_pos += text.len();
    }

    fn backspace(&mut self) {
        if let Some(c) = self.input[..self.cursor_pos].chars().next_back() {
            self.cursor_pos -= c.len_utf8();
            self.input.remove(self.cursor_pos);
        }
    }

    fn delete(&mut self) {
        if self.cursor_pos < self.input.len() {
            self.input.remove(self.cursor_pos);
        }
    }

    fn move_left(&mut self) {
        if let Some(c) = self.input[..self.cursor_pos].chars().next_back() {
            self.cursor_pos -= c.len_utf8();
        }
    }

    fn move_right(&mut self) {
        if let Some(c) = self.input[self.cursor_pos..].chars().next() {
            self.cursor_pos += c.len_utf8();
        }
    }
}

async fn next_reply(
    reply: &mut Option<EventStream>,
) -> Option<Result<StreamEvent, TransportError>> {
    match reply.as_mut() {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tui::mermaid::CompileError;
    use async_trait::async_trait;

    struct NullCompiler;

    #[async_trait]
    impl DiagramCompiler for NullCompiler {
        async fn compile(&self, _source: &str) -> Result<String, CompileError> {
            Err(CompileError::Failed("unused".into()))
        }
    }

    fn app() -> App {
        App::new(
            Arc::new(crate::transport::EchoTransport),
            Arc::new(NullCompiler),
        )
    }

    #[tokio::test]
    async fn test_composer_editing_multibyte() {
        let mut app = app();
        app.insert_char('é');
        app.insert_char('x');
        app.move_left();
        app.move_left();
        assert_eq!(app.cursor_pos, 0);
        app.move_right();
        app.insert_char('—');
        assert_eq!(app.input, "é—x");
        app.backspace();
        assert_eq!(app.input, "éx");
    }

    #[tokio::test]
    async fn test_submit_appends_user_and_placeholder() {
        let mut app = app();
        app.insert_str("hello there");
        app.submit().await;

        let messages = app.transcript.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Model);
        assert!(messages[1].content.is_empty());
        assert!(app.input.is_empty());
        assert_eq!(app.status, ProcessingStatus::Waiting);
        assert!(app.reply.is_some());
    }

    #[tokio::test]
    async fn test_failed_attachment_preserves_input() {
        let mut app = app();
        app.insert_str("/attach /no/such/file.png");
        let before = app.input.clone();
        app.submit().await;
        assert_eq!(app.input, before);
        assert!(app.notice.is_some());
    }

    #[tokio::test]
    async fn test_deltas_flow_into_trailing_message() {
        let mut app = app();
        app.insert_str("hi");
        app.submit().await;

        for delta in ["Hel", "lo, ", "world"] {
            app.handle_reply(Some(Ok(StreamEvent::Delta(delta.to_string()))));
        }
        assert_eq!(
            app.transcript.messages().last().unwrap().content,
            "Hello, world"
        );

        app.handle_reply(Some(Ok(StreamEvent::Done)));
        assert_eq!(app.status, ProcessingStatus::Idle);
        assert!(!app.transcript.is_streaming());
    }

    #[tokio::test]
    async fn test_transport_error_surfaces_banner() {
        let mut app = app();
        app.insert_str("hi");
        app.submit().await;
        app.handle_reply(Some(Err(TransportError::Stream("boom".into()))));

        assert!(app.transcript.banner.is_some());
        assert!(
            app.transcript
                .messages()
                .last()
                .unwrap()
                .content
                .contains("boom")
        );
    }

    #[tokio::test]
    async fn test_viewport_close_paths_restore_transcript() {
        let mut app = app();
        app.viewport = Some(Viewport::open(1));
        app.viewport_outline = Some(SvgOutline::default());
        app.close_viewport();
        assert!(app.viewport.is_none());
        assert!(app.viewport_outline.is_none());
    }

    #[tokio::test]
    async fn test_diagram_hit_testing() {
        let mut app = app();
        app.transcript_area = Rect::new(0, 0, 80, 20);
        app.last_scroll_offset = 5;
        app.diagram_hits = vec![(7..11, 42)];
        // Row 3 is transcript line 8, inside the card's range
        assert_eq!(app.diagram_at(10, 3), Some(42));
        assert_eq!(app.diagram_at(10, 19), None);
        assert_eq!(app.diagram_at(90, 3), None);
    }

    #[tokio::test]
    async fn test_copy_flash_tracks_content() {
        let mut app = app();
        app.copied = Some((content_key("fn a() {}"), Instant::now()));
        assert!(app.is_copied_text("fn a() {}"));
        assert!(!app.is_copied_text("fn b() {}"));
    }
}
