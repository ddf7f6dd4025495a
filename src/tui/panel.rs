//! Layout and rendering for the floating chat panel.
//!
//! The widget controller thinks in px, matching the web client it mirrors;
//! the terminal maps px to cells with a fixed 8x16 px cell metric so the
//! controller's clamp arithmetic stays in px.

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthChar;

use crate::transcript::{Message, MessageRole};
use crate::widget::{Region, WidgetUiState};

use super::input::InputState;

pub const CELL_PX_W: u32 = 8;
pub const CELL_PX_H: u32 = 16;

const TOGGLE_LABEL: &str = " Chat ";

/// Hit regions inside an open panel, in cells.
#[derive(Debug, Clone, Copy)]
pub struct PanelRects {
    pub panel: Rect,
    pub handle: Rect,
    pub pin: Rect,
    pub close: Rect,
    pub body: Rect,
    pub input: Rect,
}

/// Full frame layout: the toggle control is always present, the panel only
/// while open.
#[derive(Debug, Clone, Copy)]
pub struct PanelLayout {
    pub toggle: Rect,
    pub panel: Option<PanelRects>,
}

/// Convert a cell rect to the px region the widget controller hit-tests.
pub fn region_px(rect: Rect) -> Region {
    Region::new(
        rect.x as i32 * CELL_PX_W as i32,
        rect.y as i32 * CELL_PX_H as i32,
        rect.width as u32 * CELL_PX_W,
        rect.height as u32 * CELL_PX_H,
    )
}

/// Convert a cell position to px (cell center is close enough for hits).
pub fn cell_to_px(col: u16, row: u16) -> (i32, i32) {
    (
        col as i32 * CELL_PX_W as i32,
        row as i32 * CELL_PX_H as i32,
    )
}

pub fn compute_layout(area: Rect, ui: &WidgetUiState) -> PanelLayout {
    let toggle_w = TOGGLE_LABEL.len() as u16 + 2;
    let toggle = Rect {
        x: area.right().saturating_sub(toggle_w + 1),
        y: area.bottom().saturating_sub(4),
        width: toggle_w.min(area.width),
        height: 3.min(area.height),
    }
    .intersection(area);

    if !ui.is_open {
        return PanelLayout {
            toggle,
            panel: None,
        };
    }

    let want_w = (ui.panel_width / CELL_PX_W) as u16;
    let want_h = (ui.panel_height / CELL_PX_H) as u16;
    let width = want_w.min(area.width.saturating_sub(2)).max(20);
    let height = want_h
        .min(area.height.saturating_sub(toggle.height + 2))
        .max(8);

    let panel = Rect {
        x: area.right().saturating_sub(width + 1),
        y: toggle.y.saturating_sub(height),
        width,
        height,
    }
    .intersection(area);

    // Title-bar controls: resize handle at the top-left corner (the panel
    // grows away from its bottom-right anchor), pin and close at the right.
    let handle = Rect {
        x: panel.x,
        y: panel.y,
        width: 2,
        height: 1,
    };
    let close = Rect {
        x: panel.right().saturating_sub(4),
        y: panel.y,
        width: 3,
        height: 1,
    };
    let pin = Rect {
        x: close.x.saturating_sub(4),
        y: panel.y,
        width: 3,
        height: 1,
    };
    let input = Rect {
        x: panel.x + 1,
        y: panel.bottom().saturating_sub(2),
        width: panel.width.saturating_sub(2),
        height: 1,
    };
    let body = Rect {
        x: panel.x + 1,
        y: panel.y + 1,
        width: panel.width.saturating_sub(2),
        height: panel.height.saturating_sub(3),
    };

    PanelLayout {
        toggle,
        panel: Some(PanelRects {
            panel,
            handle,
            pin,
            close,
            body,
            input,
        }),
    }
}

/// Wrap one message body to `max_width` columns, unicode-width aware.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for raw_line in text.split('\n') {
        let mut current = String::new();
        let mut current_width = 0;
        for c in raw_line.chars() {
            let w = c.width().unwrap_or(1);
            if current_width + w > max_width && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_width = 0;
            }
            current.push(c);
            current_width += w;
        }
        lines.push(current);
    }
    lines
}

fn message_lines(messages: &[Message], width: usize, busy: bool) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for msg in messages {
        let (prefix, style) = match msg.role {
            MessageRole::User => ("you ", Style::default().fg(Color::Cyan)),
            MessageRole::Assistant => ("trip", Style::default().fg(Color::Green)),
        };
        let body_width = width.saturating_sub(6);
        for (i, body_line) in wrap_text(&msg.text, body_width).into_iter().enumerate() {
            let head = if i == 0 { prefix } else { "    " };
            lines.push(Line::from(vec![
                Span::styled(
                    format!("{head}│ "),
                    style.add_modifier(Modifier::DIM),
                ),
                Span::raw(body_line),
            ]));
        }
        lines.push(Line::raw(""));
    }
    if busy {
        lines.push(Line::styled(
            "…",
            Style::default().fg(Color::DarkGray),
        ));
    }
    lines
}

/// Draw the backdrop, toggle control, and (when open) the chat panel.
pub fn render(
    frame: &mut Frame,
    layout: &PanelLayout,
    ui: &WidgetUiState,
    messages: &[Message],
    input: &InputState,
    busy: bool,
) {
    let area = frame.area();

    let backdrop = Paragraph::new(vec![
        Line::raw(""),
        Line::styled(
            "  Tripmate: plan your next trip",
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Line::raw(""),
        Line::styled(
            "  (the trip forms live here; this build drives the support chat)",
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(backdrop, area);

    let toggle_style = if ui.is_open {
        Style::default().fg(Color::Black).bg(Color::Green)
    } else {
        Style::default().fg(Color::Green)
    };
    frame.render_widget(
        Paragraph::new(TOGGLE_LABEL)
            .style(toggle_style)
            .block(Block::default().borders(Borders::ALL)),
        layout.toggle,
    );

    let Some(rects) = &layout.panel else {
        return;
    };

    frame.render_widget(Clear, rects.panel);
    let title = format!(
        "◤─ Trip Assistant {}",
        if ui.is_resizing { "(resizing)" } else { "" }
    );
    frame.render_widget(
        Block::default()
            .borders(Borders::ALL)
            .title(title.trim_end().to_string()),
        rects.panel,
    );

    let pin_label = if ui.is_pinned { "[●]" } else { "[○]" };
    frame.render_widget(Paragraph::new(pin_label), rects.pin);
    frame.render_widget(Paragraph::new("[x]"), rects.close);

    let lines = message_lines(messages, rects.body.width as usize, busy);
    let visible = rects.body.height as usize;
    let skip = lines.len().saturating_sub(visible);
    frame.render_widget(
        Paragraph::new(lines.into_iter().skip(skip).collect::<Vec<_>>()),
        rects.body,
    );

    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("> ", Style::default().fg(Color::Yellow)),
            Span::raw(input.buffer.clone()),
        ])),
        rects.input,
    );
}
