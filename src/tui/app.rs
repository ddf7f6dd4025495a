//! Main TUI application: event loop gluing the widget controller and the
//! ingestion pipeline.

use std::io::{self, Stdout};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers,
        MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, layout::Rect, Terminal};
use tracing::debug;

use crate::pipeline::ChatPipeline;
use crate::transcript::TranscriptHandle;
use crate::transport::HttpTransport;
use crate::widget::{WidgetController, WidgetEvent};

use super::input::{InputAction, InputState};
use super::panel::{self, PanelLayout, CELL_PX_H, CELL_PX_W};

/// Application state
pub struct App {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    input: InputState,
    controller: WidgetController,
    transcript: TranscriptHandle,
    pipeline: Arc<ChatPipeline<HttpTransport>>,
    /// Layout of the last drawn frame, for mouse hit tests.
    layout: Option<PanelLayout>,
    /// Sends still in flight (drives the typing indicator).
    in_flight: Arc<AtomicUsize>,
    /// Cell position of the last drag event while resizing.
    drag_origin: Option<(u16, u16)>,
    should_quit: bool,
}

impl App {
    pub fn new(pipeline: ChatPipeline<HttpTransport>) -> crate::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;

        let transcript = pipeline.transcript().clone();
        Ok(Self {
            terminal,
            input: InputState::new(),
            controller: WidgetController::new(transcript.clone()),
            transcript,
            pipeline: Arc::new(pipeline),
            layout: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
            drag_origin: None,
            should_quit: false,
        })
    }

    pub async fn run(&mut self) -> crate::Result<()> {
        let result = self.event_loop().await;
        self.restore_terminal();
        result
    }

    async fn event_loop(&mut self) -> crate::Result<()> {
        while !self.should_quit {
            self.draw()?;

            // Short poll so streamed deltas repaint promptly.
            if event::poll(Duration::from_millis(50))? {
                match event::read()? {
                    Event::Key(key) => self.handle_key(key),
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn draw(&mut self) -> crate::Result<()> {
        let ui = *self.controller.ui();
        let messages = self.transcript.snapshot();
        let input = self.input.clone();
        let busy = self.in_flight.load(Ordering::SeqCst) > 0;

        let mut layout = None;
        self.terminal.draw(|frame| {
            let computed = panel::compute_layout(frame.area(), &ui);
            panel::render(frame, &computed, &ui, &messages, &input, busy);
            layout = Some(computed);
        })?;

        if let Some(layout) = layout {
            let panel_region = layout
                .panel
                .map(|r| panel::region_px(r.panel))
                .unwrap_or_default();
            self.controller
                .set_regions(panel_region, panel::region_px(layout.toggle));
            self.layout = Some(layout);
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if !self.controller.ui().is_open {
            match key.code {
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    self.should_quit = true;
                }
                KeyCode::Char('q') => self.should_quit = true,
                KeyCode::Char('c') | KeyCode::Enter => {
                    self.controller.handle(WidgetEvent::ToggleClicked);
                }
                _ => {}
            }
            return;
        }

        // Pin toggle is a widget-level shortcut, not input-box text.
        if key.code == KeyCode::Char('p') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.controller.handle(WidgetEvent::PinToggled);
            return;
        }

        match self.input.handle_key(key) {
            InputAction::Submit(text) => self.submit_message(text),
            InputAction::Quit => self.should_quit = true,
            InputAction::Escape => self.controller.handle(WidgetEvent::EscapePressed),
            InputAction::None => {}
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        let Some(layout) = self.layout else {
            return;
        };

        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                let (col, row) = (mouse.column, mouse.row);
                if contains(layout.toggle, col, row) {
                    self.controller.handle(WidgetEvent::ToggleClicked);
                    return;
                }
                if let Some(rects) = layout.panel {
                    if contains(rects.close, col, row) {
                        self.controller.handle(WidgetEvent::CloseClicked);
                        return;
                    }
                    if contains(rects.pin, col, row) {
                        self.controller.handle(WidgetEvent::PinToggled);
                        return;
                    }
                    if contains(rects.handle, col, row) {
                        self.controller.handle(WidgetEvent::ResizeHandlePressed);
                        self.drag_origin = Some((col, row));
                        return;
                    }
                }
                let (x, y) = panel::cell_to_px(col, row);
                self.controller.handle(WidgetEvent::PointerDown { x, y });
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                if self.controller.ui().is_resizing {
                    if let Some((last_col, last_row)) = self.drag_origin {
                        // The panel is anchored bottom-right with the handle
                        // at its top-left corner, so dragging left/up grows
                        // the panel.
                        let dx = (last_col as i32 - mouse.column as i32) * CELL_PX_W as i32;
                        let dy = (last_row as i32 - mouse.row as i32) * CELL_PX_H as i32;
                        if dx != 0 || dy != 0 {
                            self.controller.handle(WidgetEvent::PointerMoved { dx, dy });
                        }
                    }
                    self.drag_origin = Some((mouse.column, mouse.row));
                }
            }
            MouseEventKind::Up(MouseButton::Left) => {
                // Delivered wherever the release lands, ending any drag.
                self.controller.handle(WidgetEvent::PointerReleased);
                self.drag_origin = None;
            }
            _ => {}
        }
    }

    fn submit_message(&mut self, text: String) {
        // The caller assembles the request context; the pipeline passes it
        // through untouched.
        let context = serde_json::json!({
            "screen": "support-chat",
            "submittedAt": chrono::Utc::now().to_rfc3339(),
        });

        let pipeline = Arc::clone(&self.pipeline);
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let outcome = pipeline.send(&text, context).await;
            debug!("Send resolved: {outcome:?}");
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    fn restore_terminal(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        );
        let _ = self.terminal.show_cursor();
    }
}

fn contains(rect: Rect, col: u16, row: u16) -> bool {
    col >= rect.x && col < rect.right() && row >= rect.y && row < rect.bottom()
}
