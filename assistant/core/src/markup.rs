//! Inline Markup
//!
//! A deliberately small markup grammar for authored and generated text:
//!
//! | Style     | Markup         |
//! |-----------|----------------|
//! | bold      | `**text**`     |
//! | italic    | `_text_`       |
//! | underline | `<u>text</u>`  |
//!
//! Spans do not nest and there is no escape syntax. Recognition is
//! best-effort: the first closing marker ends a span (non-greedy), and any
//! marker without a partner is left as plain text. [`render`] never fails.
//!
//! Selection offsets are counted in `char`s so that Ethiopic and other
//! multi-byte text can be edited safely.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Matches one styled span; alternatives are tried left to right at each position.
static SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\*\*(.*?)\*\*|_(.*?)_|<u>(.*?)</u>").expect("inline markup pattern is valid")
});

/// Inline text style
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    /// `**bold**`
    Bold,
    /// `_italic_`
    Italic,
    /// `<u>underline</u>`
    Underline,
}

impl Style {
    /// Opening marker
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Bold => "**",
            Self::Italic => "_",
            Self::Underline => "<u>",
        }
    }

    /// Closing marker
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Bold => "**",
            Self::Italic => "_",
            Self::Underline => "</u>",
        }
    }
}

/// A typed run of rendered text with markers stripped
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segment {
    /// Unstyled text
    Plain(String),
    /// Bold text
    Bold(String),
    /// Italic text
    Italic(String),
    /// Underlined text
    Underline(String),
}

impl Segment {
    /// The visible text
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Plain(t) | Self::Bold(t) | Self::Italic(t) | Self::Underline(t) => t,
        }
    }

    /// The style, `None` for plain text
    #[must_use]
    pub fn style(&self) -> Option<Style> {
        match self {
            Self::Plain(_) => None,
            Self::Bold(_) => Some(Style::Bold),
            Self::Italic(_) => Some(Style::Italic),
            Self::Underline(_) => Some(Style::Underline),
        }
    }
}

/// Result of wrapping a selection in style markers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Toggled {
    /// Text with markers inserted
    pub text: String,
    /// New selection start (chars)
    pub selection_start: usize,
    /// New selection end (chars)
    pub selection_end: usize,
}

/// Wrap `text[start..end]` (char offsets) in the markers of `style`
///
/// Offsets are clamped to the text and reordered if reversed. With a
/// non-empty selection the whole wrapped span, markers included, stays
/// selected. With an empty selection an empty marker pair is inserted and
/// the cursor is placed between the markers. Existing markers are never
/// detected or removed, so applying a style twice nests literally.
#[must_use]
pub fn toggle_style(text: &str, start: usize, end: usize, style: Style) -> Toggled {
    let char_len = text.chars().count();
    let (start, end) = (start.min(end).min(char_len), start.max(end).min(char_len));

    let start_byte = byte_offset(text, start);
    let end_byte = byte_offset(text, end);
    let (prefix, suffix) = (style.prefix(), style.suffix());

    let mut out = String::with_capacity(text.len() + prefix.len() + suffix.len());
    out.push_str(&text[..start_byte]);
    out.push_str(prefix);
    out.push_str(&text[start_byte..end_byte]);
    out.push_str(suffix);
    out.push_str(&text[end_byte..]);

    let prefix_chars = prefix.chars().count();
    let (selection_start, selection_end) = if start == end {
        (start + prefix_chars, start + prefix_chars)
    } else {
        (start, end + prefix_chars + suffix.chars().count())
    };

    Toggled {
        text: out,
        selection_start,
        selection_end,
    }
}

/// Split `text` into styled segments
///
/// Empty plain runs are omitted; a styled span with empty content is kept.
#[must_use]
pub fn render(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for caps in SPAN.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() > cursor {
            segments.push(Segment::Plain(text[cursor..whole.start()].to_string()));
        }

        let segment = if let Some(inner) = caps.get(1) {
            Segment::Bold(inner.as_str().to_string())
        } else if let Some(inner) = caps.get(2) {
            Segment::Italic(inner.as_str().to_string())
        } else if let Some(inner) = caps.get(3) {
            Segment::Underline(inner.as_str().to_string())
        } else {
            Segment::Plain(whole.as_str().to_string())
        };
        segments.push(segment);
        cursor = whole.end();
    }

    if cursor < text.len() {
        segments.push(Segment::Plain(text[cursor..].to_string()));
    }
    segments
}

/// Visible text with every recognized marker removed
#[must_use]
pub fn plain_text(text: &str) -> String {
    render(text).iter().map(Segment::text).collect()
}

/// Byte offset of the `chars`-th character (or the end of the string)
fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map_or(text.len(), |(byte, _)| byte)
}
