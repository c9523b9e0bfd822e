//! Prose rendering: markdown text → styled ratatui Lines
//!
//! Only a closed allow-list of parser events maps to styled spans; raw
//! HTML (block or inline) is emitted as inert literal text, so no
//! active content survives rendering. Soft line breaks inside a
//! paragraph are treated as hard breaks.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use ratatui::prelude::*;

const BOLD_COLOR: Color = Color::Rgb(255, 255, 255);
const HEADING_COLOR: Color = Color::Rgb(138, 180, 248);
const DIM_COLOR: Color = Color::Rgb(100, 100, 100);
const CODE_BG: Color = Color::Rgb(45, 45, 45);
const CODE_FG: Color = Color::Rgb(180, 180, 180);
const LINK_COLOR: Color = Color::Rgb(129, 199, 132);

/// Render a prose segment to styled ratatui Lines
pub fn render_prose(text: &str) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current_spans: Vec<Span<'static>> = Vec::new();

    // Inline style state
    let mut bold = false;
    let mut italic = false;
    let mut strikethrough = false;
    let mut in_heading = false;
    let mut quote_depth = 0usize;
    let mut link_dest: Option<String> = None;

    // Block state
    let mut list_stack: Vec<Option<u64>> = Vec::new();
    let mut in_code_block = false;
    let mut code_block_content = String::new();
    let mut in_table = false;
    let mut table_header = false;
    let mut row_cells: Vec<String> = Vec::new();
    let mut cell_text = String::new();

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(text, options);

    for event in parser {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                flush_line(&mut lines, &mut current_spans, quote_depth);
                in_heading = true;
            }
            Event::End(TagEnd::Heading(_)) => {
                let heading_spans: Vec<Span<'static>> = current_spans
                    .drain(..)
                    .map(|s| {
                        Span::styled(
                            s.content.to_string(),
                            Style::default().fg(HEADING_COLOR).bold(),
                        )
                    })
                    .collect();
                if !heading_spans.is_empty() {
                    lines.push(Line::from(heading_spans));
                }
                in_heading = false;
            }

            Event::Start(Tag::Strong) => bold = true,
            Event::End(TagEnd::Strong) => bold = false,
            Event::Start(Tag::Emphasis) => italic = true,
            Event::End(TagEnd::Emphasis) => italic = false,
            Event::Start(Tag::Strikethrough) => strikethrough = true,
            Event::End(TagEnd::Strikethrough) => strikethrough = false,

            Event::Start(Tag::BlockQuote(_)) => {
                flush_line(&mut lines, &mut current_spans, quote_depth);
                quote_depth += 1;
            }
            Event::End(TagEnd::BlockQuote(_)) => {
                flush_line(&mut lines, &mut current_spans, quote_depth);
                quote_depth = quote_depth.saturating_sub(1);
            }

            Event::Start(Tag::List(start)) => {
                flush_line(&mut lines, &mut current_spans, quote_depth);
                list_stack.push(start);
            }
            Event::End(TagEnd::List(_)) => {
                list_stack.pop();
            }
            Event::Start(Tag::Item) => {
                let indent = "  ".repeat(list_stack.len().saturating_sub(1));
                let label = match list_stack.last_mut() {
                    Some(Some(n)) => {
                        let label = format!("{}{}. ", indent, n);
                        *n += 1;
                        label
                    }
                    _ => format!("{}• ", indent),
                };
                current_spans.push(Span::styled(label, Style::default().fg(DIM_COLOR)));
            }
            Event::End(TagEnd::Item) => {
                flush_line(&mut lines, &mut current_spans, quote_depth);
            }

            Event::Start(Tag::Link { dest_url, .. }) => {
                link_dest = Some(dest_url.to_string());
            }
            Event::End(TagEnd::Link) => {
                if let Some(url) = link_dest.take() {
                    current_spans.push(Span::styled(
                        format!(" ({})", url),
                        Style::default().fg(DIM_COLOR),
                    ));
                }
            }

            Event::Start(Tag::Table(_)) => {
                flush_line(&mut lines, &mut current_spans, quote_depth);
                in_table = true;
            }
            Event::End(TagEnd::Table) => in_table = false,
            Event::Start(Tag::TableHead) => {
                table_header = true;
                row_cells.clear();
            }
            Event::End(TagEnd::TableHead) => {
                lines.push(table_row_line(&row_cells, true));
                table_header = false;
            }
            Event::Start(Tag::TableRow) => row_cells.clear(),
            Event::End(TagEnd::TableRow) => {
                lines.push(table_row_line(&row_cells, false));
            }
            Event::Start(Tag::TableCell) => cell_text.clear(),
            Event::End(TagEnd::TableCell) => {
                row_cells.push(std::mem::take(&mut cell_text));
            }

            // Indented code blocks can still reach prose; fenced ones
            // are split off by the segmenter before rendering.
            Event::Start(Tag::CodeBlock(_)) => {
                flush_line(&mut lines, &mut current_spans, quote_depth);
                in_code_block = true;
            }
            Event::End(TagEnd::CodeBlock) => {
                for code_line in code_block_content.lines() {
                    lines.push(Line::from(Span::styled(
                        format!("  {}", code_line),
                        Style::default().fg(CODE_FG),
                    )));
                }
                code_block_content.clear();
                in_code_block = false;
            }

            Event::Code(code) => {
                if in_table {
                    cell_text.push_str(&code);
                } else {
                    current_spans.push(Span::styled(
                        format!("`{}`", code),
                        Style::default().fg(CODE_FG).bg(CODE_BG),
                    ));
                }
            }

            Event::Text(text) => {
                if in_code_block {
                    code_block_content.push_str(&text);
                } else if in_table {
                    cell_text.push_str(&text);
                } else {
                    current_spans.push(Span::styled(
                        text.to_string(),
                        inline_style(bold, italic, strikethrough, in_heading),
                    ));
                }
            }

            // Allow-list sanitization: raw HTML is inert literal text
            Event::Html(html) | Event::InlineHtml(html) => {
                if !in_table {
                    current_spans.push(Span::styled(
                        html.to_string(),
                        Style::default().fg(DIM_COLOR),
                    ));
                }
            }

            // Line breaks inside a paragraph are hard breaks
            Event::SoftBreak | Event::HardBreak => {
                if in_table {
                    cell_text.push(' ');
                } else {
                    flush_line(&mut lines, &mut current_spans, quote_depth);
                }
            }

            Event::Start(Tag::Paragraph) => {}
            Event::End(TagEnd::Paragraph) => {
                flush_line(&mut lines, &mut current_spans, quote_depth);
            }

            Event::Rule => {
                flush_line(&mut lines, &mut current_spans, quote_depth);
                lines.push(Line::from(Span::styled(
                    "─".repeat(24),
                    Style::default().fg(DIM_COLOR),
                )));
            }

            _ => {}
        }
    }

    flush_line(&mut lines, &mut current_spans, quote_depth);
    lines
}

fn inline_style(bold: bool, italic: bool, strikethrough: bool, in_heading: bool) -> Style {
    let mut style = Style::default();
    if bold || in_heading {
        style = style.fg(BOLD_COLOR).bold();
    }
    if italic {
        style = style.italic();
    }
    if strikethrough {
        style = style.crossed_out();
    }
    style
}

fn flush_line(lines: &mut Vec<Line<'static>>, spans: &mut Vec<Span<'static>>, quote_depth: usize) {
    if spans.is_empty() {
        return;
    }
    let mut out: Vec<Span<'static>> = Vec::with_capacity(spans.len() + 1);
    if quote_depth > 0 {
        out.push(Span::styled(
            "│ ".repeat(quote_depth),
            Style::default().fg(DIM_COLOR),
        ));
    }
    out.append(spans);
    lines.push(Line::from(out));
}

fn table_row_line(cells: &[String], header: bool) -> Line<'static> {
    let style = if header {
        Style::default().fg(BOLD_COLOR).bold()
    } else {
        Style::default()
    };
    Line::from(Span::styled(cells.join(" │ "), style))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_text(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.to_string()).collect()
    }

    #[test]
    fn test_simple_markdown() {
        let lines = render_prose("Hello **world**");
        assert_eq!(lines.len(), 1);
        assert_eq!(line_text(&lines[0]), "Hello world");
    }

    #[test]
    fn test_soft_break_is_hard_break() {
        let lines = render_prose("first\nsecond");
        assert_eq!(lines.len(), 2);
        assert_eq!(line_text(&lines[0]), "first");
        assert_eq!(line_text(&lines[1]), "second");
    }

    #[test]
    fn test_html_is_inert_literal() {
        let lines = render_prose("before <script>alert(1)</script> after");
        let text: String = lines.iter().map(line_text).collect();
        assert!(text.contains("<script>"));
    }

    #[test]
    fn test_ordered_list_labels() {
        let lines = render_prose("1. one\n2. two");
        assert_eq!(line_text(&lines[0]), "1. one");
        assert_eq!(line_text(&lines[1]), "2. two");
    }

    #[test]
    fn test_link_shows_destination() {
        let lines = render_prose("see [docs](https://example.com)");
        assert!(line_text(&lines[0]).contains("(https://example.com)"));
    }

    #[test]
    fn test_table_rows() {
        let lines = render_prose("| a | b |\n|---|---|\n| 1 | 2 |\n");
        let text: Vec<String> = lines.iter().map(line_text).collect();
        assert!(text.iter().any(|l| l.contains("a │ b")));
        assert!(text.iter().any(|l| l.contains("1 │ 2")));
    }

    #[test]
    fn test_blockquote_prefix() {
        let lines = render_prose("> quoted");
        assert!(line_text(&lines[0]).starts_with("│ "));
    }
}
