//! Terminal frontend for the support-chat widget.
//!
//! Renders the travel-planner backdrop with a floating chat panel and maps
//! crossterm pointer/keyboard events onto the widget controller.

mod app;
mod input;
mod panel;

pub use app::App;
