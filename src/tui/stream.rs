//! Streaming re-render coalescing
//!
//! Every delta is applied to the transcript immediately; this tracker
//! only decides when the trailing message is worth re-segmenting and
//! re-rendering (at newline/fence boundaries, or after a quiet period),
//! so high-frequency deltas don't trigger a full markdown pass each.

use std::time::{Duration, Instant};

pub struct StreamCoalescer {
    /// Text accumulated since the last boundary
    tail: String,
    last_render: Instant,
    timeout: Duration,
}

impl Default for StreamCoalescer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamCoalescer {
    pub fn new() -> Self {
        Self {
            tail: String::new(),
            last_render: Instant::now(),
            timeout: Duration::from_millis(150),
        }
    }

    /// Record a delta; returns true when a semantic boundary (newline,
    /// which covers fence lines) arrived and a re-render should happen.
    pub fn push(&mut self, delta: &str) -> bool {
        self.tail.push_str(delta);
        if let Some(pos) = self.tail.rfind('\n') {
            self.tail.drain(..=pos);
            self.last_render = Instant::now();
            return true;
        }
        false
    }

    /// True when un-rendered text has been sitting past the quiet period
    pub fn should_flush(&self) -> bool {
        !self.tail.is_empty() && self.last_render.elapsed() > self.timeout
    }

    /// Force a render of whatever is pending (timeout or reply end)
    pub fn flush(&mut self) -> bool {
        self.last_render = Instant::now();
        if self.tail.is_empty() {
            false
        } else {
            self.tail.clear();
            true
        }
    }

    pub fn reset(&mut self) {
        self.tail.clear();
        self.last_render = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newline_is_boundary() {
        let mut c = StreamCoalescer::new();
        assert!(c.push("First line\nSecond"));
        assert_eq!(c.tail, "Second");
    }

    #[test]
    fn test_no_boundary_without_newline() {
        let mut c = StreamCoalescer::new();
        assert!(!c.push("partial text"));
        assert_eq!(c.tail, "partial text");
    }

    #[test]
    fn test_fence_line_is_boundary() {
        let mut c = StreamCoalescer::new();
        assert!(c.push("```rust\nfn main"));
        assert_eq!(c.tail, "fn main");
    }

    #[test]
    fn test_flush_clears_pending() {
        let mut c = StreamCoalescer::new();
        c.push("remaining");
        assert!(c.flush());
        assert!(!c.flush());
    }
}
