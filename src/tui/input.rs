//! Input handling for the chat input box.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Result of handling a key event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    None,
    /// Submit the current input
    Submit(String),
    /// Quit the application
    Quit,
    /// Escape pressed (dismiss the widget)
    Escape,
}

/// Input box state.
///
/// Note: `cursor` is a CHARACTER index, not a byte index, so multi-byte
/// characters are edited correctly.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    pub buffer: String,
    pub cursor: usize,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    fn char_count(&self) -> usize {
        self.buffer.chars().count()
    }

    fn char_to_byte_index(&self, char_idx: usize) -> usize {
        self.buffer
            .char_indices()
            .nth(char_idx)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.buffer.len())
    }

    fn insert_char(&mut self, c: char) {
        let byte_idx = self.char_to_byte_index(self.cursor);
        self.buffer.insert(byte_idx, c);
        self.cursor += 1;
    }

    fn remove_char_before_cursor(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_idx = self.char_to_byte_index(self.cursor);
            if let Some((_, ch)) = self.buffer.char_indices().nth(self.cursor) {
                self.buffer
                    .replace_range(byte_idx..byte_idx + ch.len_utf8(), "");
            }
        }
    }

    /// Handle a key event and return the action
    pub fn handle_key(&mut self, key: KeyEvent) -> InputAction {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                InputAction::Quit
            }
            KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                InputAction::Quit
            }

            KeyCode::Enter => {
                let trimmed = self.buffer.trim();
                if trimmed.is_empty() {
                    InputAction::None
                } else {
                    let input = trimmed.to_string();
                    self.buffer.clear();
                    self.cursor = 0;
                    InputAction::Submit(input)
                }
            }

            KeyCode::Backspace => {
                self.remove_char_before_cursor();
                InputAction::None
            }

            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.buffer.clear();
                self.cursor = 0;
                InputAction::None
            }

            KeyCode::Left => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                }
                InputAction::None
            }
            KeyCode::Right => {
                if self.cursor < self.char_count() {
                    self.cursor += 1;
                }
                InputAction::None
            }
            KeyCode::Home => {
                self.cursor = 0;
                InputAction::None
            }
            KeyCode::End => {
                self.cursor = self.char_count();
                InputAction::None
            }

            KeyCode::Esc => InputAction::Escape,

            KeyCode::Char(c) => {
                self.insert_char(c);
                InputAction::None
            }

            _ => InputAction::None,
        }
    }
}
