//! Widget interaction state: open/closed, pinned, and resize-drag.
//!
//! This state machine is independent of the message flow; closing the
//! widget does not cancel an in-flight stream, and reopening shows the
//! transcript as left. Coordinates and panel sizes are in px; the frontend
//! maps its own units onto them.
//!
//! Listener scoping is explicit: the outside-interaction listener is held
//! exactly while the widget is open, the drag listener exactly while a
//! resize is active, and both are released on every exit path so a release
//! outside the widget can never leave a stuck drag or a leaked listener.

use tracing::debug;

use crate::transcript::{MessageRole, TranscriptHandle};

pub const MIN_PANEL_WIDTH: u32 = 300;
pub const MIN_PANEL_HEIGHT: u32 = 360;
pub const MAX_PANEL_WIDTH: u32 = 520;
pub const MAX_PANEL_HEIGHT: u32 = 700;

/// Seeded into an empty transcript the first time the widget opens.
pub const GREETING: &str =
    "Hi! I'm your Tripmate assistant. Ask me anything about planning your trip.";

/// Axis-aligned px region, for hit testing pointer events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x
            && y >= self.y
            && x < self.x + self.width as i32
            && y < self.y + self.height as i32
    }
}

/// Visible widget state, read by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidgetUiState {
    pub is_open: bool,
    pub is_pinned: bool,
    pub panel_width: u32,
    pub panel_height: u32,
    pub is_resizing: bool,
}

impl Default for WidgetUiState {
    fn default() -> Self {
        Self {
            is_open: false,
            is_pinned: false,
            panel_width: 380,
            panel_height: 520,
            is_resizing: false,
        }
    }
}

/// Pointer/keyboard events the frontend feeds into the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetEvent {
    /// The chat toggle control was activated.
    ToggleClicked,
    /// The explicit close control was activated.
    CloseClicked,
    /// The pin control was activated.
    PinToggled,
    EscapePressed,
    /// A pointer/touch press anywhere on the page, in px coordinates.
    PointerDown { x: i32, y: i32 },
    /// The resize drag handle was pressed.
    ResizeHandlePressed,
    /// Pointer movement deltas while a button is held, in px.
    PointerMoved { dx: i32, dy: i32 },
    /// Pointer release, wherever it lands (document-level listener).
    PointerReleased,
}

/// State machine over {closed, open} x {unpinned, pinned} x {idle, resizing}.
#[derive(Debug)]
pub struct WidgetController {
    ui: WidgetUiState,
    transcript: TranscriptHandle,
    /// Current on-screen regions, updated by the renderer each frame.
    panel_region: Region,
    toggle_region: Region,
    /// Listener-scope flags; acquired and released with the states that
    /// need them.
    outside_listener: bool,
    drag_listener: bool,
}

impl WidgetController {
    pub fn new(transcript: TranscriptHandle) -> Self {
        Self {
            ui: WidgetUiState::default(),
            transcript,
            panel_region: Region::default(),
            toggle_region: Region::default(),
            outside_listener: false,
            drag_listener: false,
        }
    }

    pub fn ui(&self) -> &WidgetUiState {
        &self.ui
    }

    pub fn outside_listener_active(&self) -> bool {
        self.outside_listener
    }

    pub fn drag_listener_active(&self) -> bool {
        self.drag_listener
    }

    /// The renderer reports where the panel and the toggle control ended up
    /// on screen, so pointer-down hit tests stay in sync with layout.
    pub fn set_regions(&mut self, panel: Region, toggle: Region) {
        self.panel_region = panel;
        self.toggle_region = toggle;
    }

    pub fn handle(&mut self, event: WidgetEvent) {
        match event {
            WidgetEvent::ToggleClicked => {
                if self.ui.is_open {
                    self.close();
                } else {
                    self.open();
                }
            }
            WidgetEvent::CloseClicked | WidgetEvent::EscapePressed => {
                if self.ui.is_open {
                    self.close();
                }
            }
            WidgetEvent::PinToggled => {
                self.ui.is_pinned = !self.ui.is_pinned;
            }
            WidgetEvent::PointerDown { x, y } => {
                // Outside interaction dismisses only an unpinned widget;
                // presses on the panel or the toggle control don't count.
                if self.ui.is_open
                    && !self.ui.is_pinned
                    && !self.ui.is_resizing
                    && !self.panel_region.contains(x, y)
                    && !self.toggle_region.contains(x, y)
                {
                    self.close();
                }
            }
            WidgetEvent::ResizeHandlePressed => {
                if self.ui.is_open && !self.ui.is_resizing {
                    self.ui.is_resizing = true;
                    self.drag_listener = true;
                }
            }
            WidgetEvent::PointerMoved { dx, dy } => {
                if self.ui.is_resizing {
                    self.ui.panel_width = clamp_width(self.ui.panel_width as i64 + dx as i64);
                    self.ui.panel_height = clamp_height(self.ui.panel_height as i64 + dy as i64);
                }
            }
            WidgetEvent::PointerReleased => {
                self.end_resize();
            }
        }
    }

    fn open(&mut self) {
        self.ui.is_open = true;
        self.outside_listener = true;
        if self.transcript.is_empty() {
            debug!("Seeding greeting into empty transcript");
            let id = self.transcript.append(MessageRole::Assistant, GREETING);
            self.transcript.finalize(id);
        }
    }

    fn close(&mut self) {
        self.ui.is_open = false;
        self.outside_listener = false;
        // Closing while a drag is active is an exit path too.
        self.end_resize();
    }

    fn end_resize(&mut self) {
        self.ui.is_resizing = false;
        self.drag_listener = false;
    }
}

fn clamp_width(width: i64) -> u32 {
    width.clamp(MIN_PANEL_WIDTH as i64, MAX_PANEL_WIDTH as i64) as u32
}

fn clamp_height(height: i64) -> u32 {
    height.clamp(MIN_PANEL_HEIGHT as i64, MAX_PANEL_HEIGHT as i64) as u32
}
