//! Surface Events
//!
//! Input a rendering surface forwards to the [`crate::Assistant`]. Surfaces
//! never edit the conversation themselves; they report what the user did and
//! render the [`crate::messages::AssistantMessage`] notifications that come
//! back.

use serde::{Deserialize, Serialize};

/// Something the user did on the surface
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceEvent {
    /// The authored text changed; the cursor moves to the end
    TextChanged {
        /// Full authored text
        text: String,
    },

    /// The selection moved (char offsets)
    SelectionChanged {
        /// Selection start
        start: usize,
        /// Selection end
        end: usize,
    },

    /// The authoring field gained or lost focus
    FocusChanged {
        /// Whether the field now holds focus
        focused: bool,
    },

    /// A key was pressed, possibly with Ctrl/Cmd held
    KeyPressed {
        /// The key character
        key: char,
        /// Whether Ctrl (or Cmd) was held
        modifier: bool,
    },

    /// Enter was pressed
    EnterPressed {
        /// Whether Shift was held
        shift: bool,
    },

    /// The send button was activated
    SendClicked,

    /// The eraser was activated: empty the authored text
    ClearInput,

    /// The user asked to clear the conversation history
    ClearHistory {
        /// Whether the user confirmed the prompt
        confirmed: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_event_serialization() {
        let event = SurfaceEvent::KeyPressed {
            key: 'b',
            modifier: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: SurfaceEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);

        let json = serde_json::to_value(SurfaceEvent::ClearHistory { confirmed: true }).unwrap();
        assert_eq!(json["ClearHistory"]["confirmed"], true);
    }
}
