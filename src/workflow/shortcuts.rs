//! Keyboard shortcuts for history navigation.

use serde::{Deserialize, Serialize};

/// History action triggered from the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryCommand {
    Undo,
    Redo,
}

/// A key press as reported by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyPress {
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    /// Cmd on macOS.
    #[serde(default)]
    pub meta: bool,
    #[serde(default)]
    pub shift: bool,
}

impl KeyPress {
    /// Ctrl/Cmd+Z undoes; Ctrl/Cmd+Y and Ctrl/Cmd+Shift+Z redo.
    pub fn command(&self) -> Option<HistoryCommand> {
        if !(self.ctrl || self.meta) {
            return None;
        }
        match self.key.to_ascii_lowercase().as_str() {
            "z" if self.shift => Some(HistoryCommand::Redo),
            "z" => Some(HistoryCommand::Undo),
            "y" => Some(HistoryCommand::Redo),
            _ => None,
        }
    }
}
