//! Code rendering: verbatim text, syntax highlighting, copy action
//!
//! Highlighting is a pure function of the segment text, so repeated
//! render passes over the same code cannot duplicate or corrupt the
//! displayed block.

use crate::config::config;
use ratatui::prelude::*;
use std::sync::LazyLock;
use std::time::Duration;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Style as SynStyle, Theme, ThemeSet};
use syntect::parsing::SyntaxSet;

// Syntax highlighting resources (loaded once)
static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

const CODE_FG: Color = Color::Rgb(180, 180, 180);
const DIM_COLOR: Color = Color::Rgb(100, 100, 100);
const COPIED_COLOR: Color = Color::Rgb(129, 199, 132);

/// How long the copy acknowledgment stays visible
pub const COPY_FLASH: Duration = Duration::from_secs(2);

/// Label shown in the block header; empty tags fall back to "code"
pub fn language_label(lang: &str) -> &str {
    if lang.is_empty() { "code" } else { lang }
}

fn theme() -> &'static Theme {
    let name = &config().display.syntax_theme;
    THEME_SET
        .themes
        .get(name)
        .unwrap_or_else(|| &THEME_SET.themes["base16-ocean.dark"])
}

/// Highlight code with syntect, falling back to plain text when the
/// language is unknown. Pure: identical input yields identical lines.
pub fn highlight_lines(code: &str, lang: &str) -> Vec<Line<'static>> {
    let syntax = SYNTAX_SET
        .find_syntax_by_token(lang)
        .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());
    let mut highlighter = HighlightLines::new(syntax, theme());

    let mut lines = Vec::new();
    for line in code.lines() {
        match highlighter.highlight_line(line, &SYNTAX_SET) {
            Ok(ranges) => {
                let spans: Vec<Span<'static>> = ranges
                    .into_iter()
                    .map(|(style, text)| {
                        Span::styled(text.to_string(), syntect_to_ratatui_style(style))
                    })
                    .collect();
                lines.push(Line::from(spans));
            }
            Err(_) => {
                lines.push(Line::from(Span::styled(
                    line.to_string(),
                    Style::default().fg(CODE_FG),
                )));
            }
        }
    }
    lines
}

/// Render a code block: bordered, verbatim, with the copy state in the
/// header ("copied" acknowledgment replaces the copy hint for 2s).
pub fn render_code(code: &str, lang: &str, copied: bool) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    let mut header = vec![Span::styled(
        format!("┌─ {} ", language_label(lang)),
        Style::default().fg(DIM_COLOR),
    )];
    if copied {
        header.push(Span::styled("copied ✓", Style::default().fg(COPIED_COLOR)));
    } else {
        header.push(Span::styled("ctrl+b copy", Style::default().fg(DIM_COLOR).dim()));
    }
    lines.push(Line::from(header));

    for hl_line in highlight_lines(code, lang) {
        let mut spans = vec![Span::styled("│ ", Style::default().fg(DIM_COLOR))];
        spans.extend(hl_line.spans);
        lines.push(Line::from(spans));
    }

    lines.push(Line::from(Span::styled("└─", Style::default().fg(DIM_COLOR))));
    lines
}

fn syntect_to_ratatui_style(style: SynStyle) -> Style {
    let fg = Color::Rgb(style.foreground.r, style.foreground.g, style.foreground.b);
    Style::default().fg(fg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_text(lines: &[Line<'_>]) -> String {
        lines[1..lines.len() - 1]
            .iter()
            .flat_map(|l| l.spans.iter().skip(1))
            .map(|s| s.content.to_string())
            .collect::<Vec<_>>()
            .join("")
    }

    #[test]
    fn test_language_label_fallback() {
        assert_eq!(language_label(""), "code");
        assert_eq!(language_label("rust"), "rust");
    }

    #[test]
    fn test_highlight_is_idempotent() {
        let code = "fn main() { println!(\"hi\"); }";
        assert_eq!(highlight_lines(code, "rust"), highlight_lines(code, "rust"));
    }

    #[test]
    fn test_content_rendered_verbatim() {
        let code = "let x = <Vec<String>>::new();";
        let lines = render_code(code, "rust", false);
        assert_eq!(body_text(&lines), code);
    }

    #[test]
    fn test_unknown_language_falls_back() {
        let lines = highlight_lines("whatever ??", "no-such-lang");
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_copied_acknowledgment_in_header() {
        let normal = render_code("x", "", false);
        let copied = render_code("x", "", true);
        let header = |lines: &[Line<'_>]| -> String {
            lines[0].spans.iter().map(|s| s.content.to_string()).collect()
        };
        assert!(header(&copied).contains("copied"));
        assert!(!header(&normal).contains("copied"));
    }
}
