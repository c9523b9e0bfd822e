//! Frame composition: transcript, composer, status line, and the
//! diagram inspector overlay

use crate::message::Role;
use crate::segment::{self, Segment};
use crate::tui::app::{App, ProcessingStatus};
use crate::tui::mermaid::{self, DiagramState, RenderedDiagram, SvgOutline};
use crate::tui::viewport::ViewportTransform;
use crate::tui::{code, markdown};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use unicode_width::UnicodeWidthStr;

const USER_COLOR: Color = Color::Rgb(120, 170, 255);
const ACCENT_COLOR: Color = Color::Rgb(129, 199, 132);
const DIM_COLOR: Color = Color::Rgb(100, 100, 100);
const ERR_COLOR: Color = Color::Rgb(200, 80, 80);

const SPINNER_FRAMES: [&str; 4] = ["⠋", "⠙", "⠸", "⠴"];

pub fn draw(frame: &mut Frame, app: &mut App) {
    let area = frame.area();

    let banner_height = u16::from(app.transcript.banner.is_some());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(banner_height),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(area);

    draw_transcript(frame, chunks[0], app);
    if let Some(banner) = &app.transcript.banner {
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                format!("  ✗ {}", banner),
                Style::default().fg(ERR_COLOR),
            ))),
            chunks[1],
        );
    }
    draw_input(frame, chunks[2], app);
    draw_status(frame, chunks[3], app);

    if app.viewport.is_some() {
        draw_viewport_overlay(frame, area, app);
    }
}

fn draw_transcript(frame: &mut Frame, area: Rect, app: &mut App) {
    let lines = compose_transcript(app);

    let viewport_lines = area.height as usize;
    let max_scroll = lines.len().saturating_sub(viewport_lines);
    app.last_max_scroll = max_scroll;
    app.transcript_area = area;
    let offset = app.transcript.scroll_position(max_scroll);
    app.last_scroll_offset = offset;

    let paragraph = Paragraph::new(lines).scroll((offset as u16, 0));
    frame.render_widget(paragraph, area);

    // Floating affordance, shown exactly while not following the bottom
    if app.transcript.show_jump_affordance() {
        let label = " ↓ newest (ctrl+g) ";
        let width = label.width() as u16;
        if area.width > width && area.height > 1 {
            let hint = Rect {
                x: area.right().saturating_sub(width + 1),
                y: area.bottom().saturating_sub(1),
                width,
                height: 1,
            };
            frame.render_widget(Clear, hint);
            frame.render_widget(
                Paragraph::new(Span::styled(
                    label,
                    Style::default().fg(Color::Black).bg(ACCENT_COLOR),
                )),
                hint,
            );
        }
    }
}

/// Compose the full transcript as styled lines.
///
/// Each model message is re-segmented and every segment rendered
/// independently, so one failing diagram never takes prose or code in
/// the same message down with it.
fn compose_transcript(app: &mut App) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();

    app.diagram_hits.clear();
    app.diagrams.begin_pass();
    for msg in app.transcript.messages() {
        if !lines.is_empty() {
            lines.push(Line::from(""));
        }
        match msg.role {
            Role::User => {
                for (i, text_line) in msg.content.lines().enumerate() {
                    let prefix = if i == 0 { "› " } else { "  " };
                    lines.push(Line::from(vec![
                        Span::styled(prefix, Style::default().fg(USER_COLOR)),
                        Span::raw(text_line.to_string()),
                    ]));
                }
                if let Some(attachment) = &msg.attachment {
                    lines.push(chip_line(format!(
                        "⎘ {} ({})",
                        attachment.name, attachment.media_type
                    )));
                }
                if let Some(folder) = &msg.folder {
                    lines.push(chip_line(format!(
                        "⌂ {} ({} files)",
                        folder.name, folder.file_count
                    )));
                }
            }
            Role::Model => {
                if msg.content.is_empty() && app.transcript.is_streaming() {
                    lines.push(Line::from(Span::styled(
                        "  …",
                        Style::default().fg(DIM_COLOR),
                    )));
                    continue;
                }
                for seg in segment::segment(&msg.content) {
                    match seg {
                        Segment::Prose(text) => lines.extend(markdown::render_prose(&text)),
                        Segment::Code { lang, code, .. } => {
                            let copied = app.is_copied_text(&code);
                            lines.extend(code::render_code(&code, &lang, copied));
                        }
                        Segment::Diagram { source, .. } => {
                            let key = app.diagrams.mount(&source);
                            let card = match app.diagrams.entry(key).map(|e| &e.state) {
                                Some(DiagramState::Pending) | None => mermaid::pending_lines(),
                                Some(DiagramState::Success(rendered)) => {
                                    mermaid::success_lines(rendered)
                                }
                                Some(DiagramState::Failed(error)) => mermaid::error_lines(error),
                            };
                            let start = lines.len();
                            lines.extend(card);
                            app.diagram_hits.push((start..lines.len(), key));
                        }
                    }
                }
            }
        }
    }
    app.diagrams.end_pass();

    lines
}

fn chip_line(text: String) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(text, Style::default().fg(ACCENT_COLOR).dim()),
    ])
}

fn draw_input(frame: &mut Frame, area: Rect, app: &App) {
    let mut title = String::from(" message ");
    if let Some(attachment) = &app.staged_attachment {
        title.push_str(&format!("· ⎘ {} ", attachment.name));
    }
    if let Some(folder) = &app.staged_folder {
        title.push_str(&format!("· ⌂ {} ", folder.name));
    }

    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(DIM_COLOR))
        .title(title);
    if let Some(notice) = &app.notice {
        block = block.title_bottom(Line::from(Span::styled(
            format!(" {} ", notice),
            Style::default().fg(ERR_COLOR),
        )));
    }

    let inner = block.inner(area);
    frame.render_widget(block, area);
    frame.render_widget(Paragraph::new(app.input.as_str()), inner);

    let cursor_x = inner.x + app.input[..app.cursor_pos].width() as u16;
    frame.set_cursor_position((cursor_x.min(inner.right().saturating_sub(1)), inner.y));
}

fn draw_status(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![Span::styled(
        format!(" quill {} · {} ", env!("QUILL_VERSION"), app.transport_name),
        Style::default().fg(DIM_COLOR),
    )];

    match app.status {
        ProcessingStatus::Idle => {}
        ProcessingStatus::Waiting | ProcessingStatus::Streaming => {
            let elapsed = app
                .processing_started
                .map(|t| t.elapsed().as_secs_f32())
                .unwrap_or(0.0);
            let frame_idx = (elapsed * 10.0) as usize % SPINNER_FRAMES.len();
            let label = if app.status == ProcessingStatus::Waiting {
                "waiting"
            } else {
                "streaming"
            };
            spans.push(Span::styled(
                format!("{} {} {:.1}s", SPINNER_FRAMES[frame_idx], label, elapsed),
                Style::default().fg(ACCENT_COLOR),
            ));
        }
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

// ============================================================================
// Diagram inspector overlay
// ============================================================================

pub fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn draw_viewport_overlay(frame: &mut Frame, area: Rect, app: &mut App) {
    let popup = centered_rect(90, 85, area);
    app.viewport_area = popup;

    frame.render_widget(Clear, popup);

    let Some(vp) = app.viewport.as_mut() else {
        return;
    };
    let transform = vp.display_transform(std::time::Instant::now());

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT_COLOR))
        .title(format!(" diagram — {:.0}% ", transform.scale * 100.0))
        .title_bottom(" Esc close · wheel zoom · drag pan · double-click reset ");
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let entry = app.diagrams.entry(vp.key);
    let rendered = match entry.map(|e| &e.state) {
        Some(DiagramState::Success(rendered)) => rendered,
        _ => return,
    };
    let Some(outline) = &app.viewport_outline else {
        return;
    };

    let lines = project_outline(outline, rendered, transform, inner.width, inner.height);
    frame.render_widget(Paragraph::new(lines), inner);
}

/// Project the diagram's geometry through the viewport transform into a
/// character grid. The diagram is first fitted to the inner area at
/// identity; the transform then scales and translates in cell space, so
/// cursor-anchored zoom operates directly on terminal coordinates.
fn project_outline(
    outline: &SvgOutline,
    rendered: &RenderedDiagram,
    transform: ViewportTransform,
    width: u16,
    height: u16,
) -> Vec<Line<'static>> {
    let (width, height) = (width as usize, height as usize);
    if width == 0 || height == 0 || rendered.width <= 0.0 || rendered.height <= 0.0 {
        return Vec::new();
    }
    let mut grid = vec![vec![' '; width]; height];

    let base = (width as f64 / rendered.width).min(height as f64 / rendered.height);
    let to_cell = |mx: f64, my: f64| -> (i64, i64) {
        let (sx, sy) = transform.model_to_screen(mx * base, my * base);
        (sx.round() as i64, sy.round() as i64)
    };

    for rect in &outline.rects {
        let (x0, y0) = to_cell(rect.x, rect.y);
        let (x1, y1) = to_cell(rect.x + rect.w, rect.y + rect.h);
        for x in x0..=x1 {
            put(&mut grid, x, y0, '─');
            put(&mut grid, x, y1, '─');
        }
        for y in y0..=y1 {
            put(&mut grid, x0, y, '│');
            put(&mut grid, x1, y, '│');
        }
        put(&mut grid, x0, y0, '┌');
        put(&mut grid, x1, y0, '┐');
        put(&mut grid, x0, y1, '└');
        put(&mut grid, x1, y1, '┘');
    }

    for edge in &outline.edges {
        let (x0, y0) = to_cell(edge.x1, edge.y1);
        let (x1, y1) = to_cell(edge.x2, edge.y2);
        let steps = (x1 - x0).abs().max((y1 - y0).abs()).max(1);
        for i in 0..=steps {
            let x = x0 + (x1 - x0) * i / steps;
            let y = y0 + (y1 - y0) * i / steps;
            put(&mut grid, x, y, '·');
        }
    }

    for label in &outline.labels {
        let (x, y) = to_cell(label.x, label.y);
        for (i, c) in label.text.chars().enumerate() {
            put(&mut grid, x + i as i64, y, c);
        }
    }

    grid.into_iter()
        .map(|row| Line::from(row.into_iter().collect::<String>()))
        .collect()
}

fn put(grid: &mut [Vec<char>], x: i64, y: i64, c: char) {
    if x < 0 || y < 0 {
        return;
    }
    let (x, y) = (x as usize, y as usize);
    if let Some(row) = grid.get_mut(y) {
        if let Some(cell) = row.get_mut(x) {
            *cell = c;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tui::mermaid::{OutlineLabel, OutlineRect};

    fn sample() -> (SvgOutline, RenderedDiagram) {
        let outline = SvgOutline {
            rects: vec![OutlineRect {
                x: 0.0,
                y: 0.0,
                w: 100.0,
                h: 50.0,
            }],
            edges: vec![],
            labels: vec![OutlineLabel {
                x: 10.0,
                y: 25.0,
                text: "Start".into(),
            }],
        };
        let rendered = RenderedDiagram {
            svg: String::new(),
            width: 100.0,
            height: 50.0,
        };
        (outline, rendered)
    }

    fn grid_text(lines: &[Line<'_>]) -> String {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.to_string()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_projection_renders_geometry_at_identity() {
        let (outline, rendered) = sample();
        let lines = project_outline(&outline, &rendered, ViewportTransform::IDENTITY, 40, 20);
        let text = grid_text(&lines);
        assert!(text.contains('┌'));
        assert!(text.contains("Start"));
    }

    #[test]
    fn test_projection_pans_content_out_of_view() {
        let (outline, rendered) = sample();
        let panned = ViewportTransform {
            scale: 1.0,
            translate_x: -500.0,
            translate_y: -500.0,
        };
        let lines = project_outline(&outline, &rendered, panned, 40, 20);
        assert!(!grid_text(&lines).contains("Start"));
    }

    #[test]
    fn test_projection_empty_area() {
        let (outline, rendered) = sample();
        assert!(project_outline(&outline, &rendered, ViewportTransform::IDENTITY, 0, 0).is_empty());
    }
}
