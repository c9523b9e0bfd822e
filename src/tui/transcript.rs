//! Transcript reconciliation and autoscroll
//!
//! Owns the ordered message list. Streamed deltas are merged into the
//! trailing model message by replacing its content with the cumulative
//! concatenation, so the history stays an immutable-until-replaced
//! sequence. A ScrollIntent flag, recomputed from the scroll position
//! on every manual scroll, decides whether the view follows new
//! content.

use crate::message::{Message, Role};
use crate::transport::TransportError;

/// How close to the bottom (in lines) still counts as "at the bottom"
pub const BOTTOM_TOLERANCE: usize = 50;

pub struct Transcript {
    messages: Vec<Message>,
    streaming: bool,
    /// ScrollIntent: follow the newest content
    scroll_intent: bool,
    /// Lines from the top; only authoritative while not following
    scroll_offset: usize,
    /// Banner-level transport error state
    pub banner: Option<String>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            streaming: false,
            scroll_intent: true,
            scroll_offset: 0,
            banner: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Append a user message; always scrolls to the newest content
    pub fn push_user(&mut self, message: Message) {
        self.messages.push(message);
        self.scroll_intent = true;
        self.banner = None;
    }

    /// Append the empty placeholder model message so the transcript
    /// shows an in-progress reply before the first delta arrives
    pub fn begin_reply(&mut self) {
        self.messages.push(Message::model(""));
        self.streaming = true;
    }

    /// Merge one streamed delta, in arrival order, into the trailing
    /// model message
    pub fn apply_delta(&mut self, delta: &str) {
        if !self.streaming {
            return;
        }
        if let Some(last) = self.messages.last() {
            let mut content = last.content.clone();
            content.push_str(delta);
            self.replace_reply(content);
        }
    }

    /// Replace the trailing model message's content wholesale
    pub fn replace_reply(&mut self, content: String) {
        if !self.streaming {
            return;
        }
        if let Some(last) = self.messages.last_mut() {
            if last.role == Role::Model {
                last.content = content;
            }
        }
    }

    /// The reply is complete; the trailing message is immutable now
    pub fn finish_reply(&mut self) {
        self.streaming = false;
    }

    /// Transport failure: surface a synthetic model message with the
    /// error detail plus the banner-level error state. Content already
    /// streamed is preserved.
    pub fn fail_reply(&mut self, error: &TransportError) {
        let detail = format!("The reply failed: {}", error);
        let absorbed = self.streaming
            && match self.messages.last_mut() {
                Some(last) if last.role == Role::Model && last.content.is_empty() => {
                    last.content = detail.clone();
                    true
                }
                _ => false,
            };
        if !absorbed {
            self.messages.push(Message::model(&detail));
        }
        self.streaming = false;
        self.banner = Some(error.to_string());
    }

    // ========== Autoscroll ==========

    /// Effective scroll offset for drawing, given the current maximum
    pub fn scroll_position(&self, max_scroll: usize) -> usize {
        if self.scroll_intent {
            max_scroll
        } else {
            self.scroll_offset.min(max_scroll)
        }
    }

    /// Manual scroll: recompute ScrollIntent as "within tolerance of
    /// the bottom"
    pub fn on_manual_scroll(&mut self, offset: usize, max_scroll: usize) {
        self.scroll_offset = offset.min(max_scroll);
        self.scroll_intent = max_scroll - self.scroll_offset <= BOTTOM_TOLERANCE;
    }

    pub fn scroll_up(&mut self, lines: usize, max_scroll: usize) {
        let current = self.scroll_position(max_scroll);
        self.on_manual_scroll(current.saturating_sub(lines), max_scroll);
    }

    pub fn scroll_down(&mut self, lines: usize, max_scroll: usize) {
        let current = self.scroll_position(max_scroll);
        self.on_manual_scroll((current + lines).min(max_scroll), max_scroll);
    }

    /// Jump back to the newest content and resume following
    pub fn follow_bottom(&mut self) {
        self.scroll_intent = true;
    }

    /// The floating affordance is shown exactly when not following
    pub fn show_jump_affordance(&self) -> bool {
        !self.scroll_intent
    }
}
