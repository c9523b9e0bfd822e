//! Content segmentation: raw message text → ordered typed segments
//!
//! A span delimited by a triple-backtick fence with an optional language
//! tag is a Code segment, unless the tag names the diagram language, in
//! which case it is a Diagram segment. Everything else is Prose. Fences
//! do not nest. An unterminated fence degrades to Prose so partial
//! fences arriving mid-stream never flicker as code blocks.

/// Language tag that marks a fence as a diagram description
pub const DIAGRAM_LANG: &str = "mermaid";

/// One classified span of a message's text.
///
/// Each variant keeps the original source span (`raw`) so that
/// concatenating spans in order reconstructs the message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Prose(String),
    Code {
        lang: String,
        code: String,
        raw: String,
    },
    Diagram {
        source: String,
        raw: String,
    },
}

impl Segment {
    /// The original source span this segment was derived from
    pub fn raw(&self) -> &str {
        match self {
            Segment::Prose(text) => text,
            Segment::Code { raw, .. } | Segment::Diagram { raw, .. } => raw,
        }
    }
}

/// Check if a fence language tag names the diagram language
pub fn is_diagram_lang(lang: &str) -> bool {
    let lang_lower = lang.to_lowercase();
    lang_lower == DIAGRAM_LANG || lang_lower.starts_with(DIAGRAM_LANG)
}

/// Split a message's full text into an ordered sequence of segments.
///
/// Whitespace-only prose spans are dropped; all other source text is
/// preserved verbatim in exactly one segment's span.
pub fn segment(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut prose_start = 0usize;
    let mut idx = 0usize;

    while idx < text.len() {
        let line_end = line_end_at(text, idx);
        let line = &text[idx..line_end];

        let Some(tag) = fence_tag(line) else {
            idx = line_end;
            continue;
        };

        // Fence opener: scan forward for the closing fence line.
        // Fences do not nest, so any fence line closes the block.
        let Some((close_start, close_end)) = find_closing_fence(text, line_end) else {
            // Unterminated fence: the remainder of the message is prose.
            break;
        };

        push_prose(&mut segments, &text[prose_start..idx]);

        let raw = text[idx..close_end].to_string();
        let inner = &text[line_end..close_start];
        let payload = inner.strip_suffix('\n').unwrap_or(inner).to_string();

        let lang = tag
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        if is_diagram_lang(&lang) {
            segments.push(Segment::Diagram {
                source: payload,
                raw,
            });
        } else {
            segments.push(Segment::Code {
                lang,
                code: payload,
                raw,
            });
        }

        prose_start = close_end;
        idx = close_end;
    }

    push_prose(&mut segments, &text[prose_start..]);
    segments
}

fn line_end_at(text: &str, start: usize) -> usize {
    text[start..]
        .find('\n')
        .map(|p| start + p + 1)
        .unwrap_or(text.len())
}

/// If `line` is a fence line, return its info tag (possibly empty)
fn fence_tag(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let backticks = trimmed.chars().take_while(|&c| c == '`').count();
    if backticks < 3 {
        return None;
    }
    Some(trimmed[backticks..].trim())
}

fn find_closing_fence(text: &str, from: usize) -> Option<(usize, usize)> {
    let mut idx = from;
    while idx < text.len() {
        let line_end = line_end_at(text, idx);
        if fence_tag(&text[idx..line_end]).is_some() {
            return Some((idx, line_end));
        }
        idx = line_end;
    }
    None
}

fn push_prose(segments: &mut Vec<Segment>, span: &str) {
    if !span.trim().is_empty() {
        segments.push(Segment::Prose(span.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(segments: &[Segment]) -> String {
        segments.iter().map(Segment::raw).collect()
    }

    #[test]
    fn test_prose_only() {
        let segments = segment("Hello, world.");
        assert_eq!(segments, vec![Segment::Prose("Hello, world.".into())]);
    }

    #[test]
    fn test_code_fence_classified() {
        let text = "Before.\n```rust\nfn main() {}\n```\nAfter.";
        let segments = segment(text);
        assert_eq!(segments.len(), 3);
        assert_eq!(
            segments[1],
            Segment::Code {
                lang: "rust".into(),
                code: "fn main() {}".into(),
                raw: "```rust\nfn main() {}\n```\n".into(),
            }
        );
        assert_eq!(reconstruct(&segments), text);
    }

    #[test]
    fn test_diagram_tag_case_insensitive() {
        for tag in ["mermaid", "Mermaid", "MERMAID", "mermaid-js"] {
            let text = format!("```{}\nflowchart LR\nA --> B\n```\n", tag);
            let segments = segment(&text);
            assert_eq!(segments.len(), 1, "tag {tag}");
            assert!(matches!(&segments[0], Segment::Diagram { source, .. }
                if source == "flowchart LR\nA --> B"));
        }
    }

    #[test]
    fn test_empty_tag_is_code() {
        let segments = segment("```\nplain\n```\n");
        assert!(matches!(&segments[0], Segment::Code { lang, .. } if lang.is_empty()));
    }

    #[test]
    fn test_unterminated_fence_degrades_to_prose() {
        let text = "Look:\n```rust\nfn partial(";
        let segments = segment(text);
        assert_eq!(segments, vec![Segment::Prose(text.into())]);
    }

    #[test]
    fn test_whitespace_only_prose_dropped() {
        let text = "```a\nx\n```\n\n   \n```b\ny\n```\n";
        let segments = segment(text);
        assert_eq!(segments.len(), 2);
        assert!(matches!(segments[0], Segment::Code { .. }));
        assert!(matches!(segments[1], Segment::Code { .. }));
    }

    #[test]
    fn test_fences_do_not_nest() {
        // The inner fence line terminates the diagram block
        let text = "```mermaid\ngraph TD\n```\nrest\n";
        let segments = segment(text);
        assert!(matches!(&segments[0], Segment::Diagram { source, .. }
            if source == "graph TD"));
        assert_eq!(segments[1], Segment::Prose("rest\n".into()));
    }

    #[test]
    fn test_round_trip_mixed_document() {
        let text = "Intro text\n```mermaid\nflowchart LR\nA --> B\n```\nmiddle prose\n```python\nprint('hi')\n```\ntail";
        let segments = segment(text);
        assert_eq!(reconstruct(&segments), text);
        assert_eq!(segments.len(), 5);
    }

    #[test]
    fn test_closing_fence_without_trailing_newline() {
        let text = "```rust\nlet x = 1;\n```";
        let segments = segment(text);
        assert_eq!(segments.len(), 1);
        assert!(matches!(&segments[0], Segment::Code { code, .. } if code == "let x = 1;"));
        assert_eq!(reconstruct(&segments), text);
    }

    #[test]
    fn test_empty_input() {
        assert!(segment("").is_empty());
        assert!(segment("   \n  ").is_empty());
    }
}
