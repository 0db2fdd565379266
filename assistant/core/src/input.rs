//! Input Controller
//!
//! Tracks the text the user is authoring together with the active selection,
//! and maps formatting shortcuts onto [`markup::toggle_style`].
//!
//! Offsets are `char` positions, matching [`crate::markup`].

use crate::markup::{self, Style};

/// Formatting shortcut table: modifier + b/i/u
#[must_use]
pub fn shortcut_style(key: char, modifier_held: bool) -> Option<Style> {
    if !modifier_held {
        return None;
    }
    match key.to_ascii_lowercase() {
        'b' => Some(Style::Bold),
        'i' => Some(Style::Italic),
        'u' => Some(Style::Underline),
        _ => None,
    }
}

/// Authored text plus selection
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputController {
    text: String,
    selection_start: usize,
    selection_end: usize,
    focused: bool,
}

impl InputController {
    /// Create an empty, unfocused input
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current authored text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Current selection as `(start, end)` with `start <= end`
    #[must_use]
    pub fn selection(&self) -> (usize, usize) {
        (self.selection_start, self.selection_end)
    }

    /// Whether the input holds focus
    #[must_use]
    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Give the input focus
    pub fn focus(&mut self) {
        self.focused = true;
    }

    /// Take focus away
    pub fn blur(&mut self) {
        self.focused = false;
    }

    /// Whether there is nothing worth sending
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Replace the text; the cursor moves to the end
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        let end = self.char_len();
        self.selection_start = end;
        self.selection_end = end;
    }

    /// Set the selection (clamped and ordered)
    pub fn select(&mut self, start: usize, end: usize) {
        let len = self.char_len();
        self.selection_start = start.min(end).min(len);
        self.selection_end = start.max(end).min(len);
    }

    /// Replace the selection with `s` and place the cursor after it
    pub fn insert(&mut self, s: &str) {
        let start = byte_offset(&self.text, self.selection_start);
        let end = byte_offset(&self.text, self.selection_end);
        self.text.replace_range(start..end, s);

        let cursor = self.selection_start + s.chars().count();
        self.selection_start = cursor;
        self.selection_end = cursor;
    }

    /// Wrap the selection in `style` markers, keeping focus and selection
    pub fn toggle_style(&mut self, style: Style) {
        let toggled = markup::toggle_style(
            &self.text,
            self.selection_start,
            self.selection_end,
            style,
        );
        self.text = toggled.text;
        self.selection_start = toggled.selection_start;
        self.selection_end = toggled.selection_end;
        self.focused = true;
    }

    /// Handle a key pressed with or without the modifier
    ///
    /// Returns `true` when the key was a formatting shortcut (the caller
    /// should suppress its default action).
    pub fn apply_shortcut(&mut self, key: char, modifier_held: bool) -> bool {
        match shortcut_style(key, modifier_held) {
            Some(style) => {
                self.toggle_style(style);
                true
            }
            None => false,
        }
    }

    /// Handle Enter; returns `true` when the caller should submit
    ///
    /// Shift+Enter inserts a newline instead.
    pub fn handle_enter(&mut self, shift_held: bool) -> bool {
        if shift_held {
            self.insert("\n");
            false
        } else {
            true
        }
    }

    /// Empty the input
    pub fn clear(&mut self) {
        self.text.clear();
        self.selection_start = 0;
        self.selection_end = 0;
    }

    /// Take the text for submission
    ///
    /// Returns `None` (leaving the input untouched) when the text is blank
    /// or a response is still in flight.
    pub fn take_submission(&mut self, in_flight: bool) -> Option<String> {
        if in_flight || self.is_blank() {
            return None;
        }
        let text = std::mem::take(&mut self.text);
        self.selection_start = 0;
        self.selection_end = 0;
        Some(text)
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Byte offset of the `chars`-th character (or the end of the string)
fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map_or(text.len(), |(byte, _)| byte)
}
