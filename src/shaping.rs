//! Script-aware text shaping. The renderer never looks for a shaping engine on its own: a
//! shaper is handed to it, and without one the text is drawn exactly as written.

use std::borrow::Cow;

/// Turns a line of logical-order text into the text that is drawn, for instance by
/// substituting contextual Arabic letter forms or reordering right-to-left runs.
///
/// Shaping happens after the line splitting, so it never changes where lines or pages break.
pub trait TextShaper: Send + Sync {
    fn shape<'a>(&self, text: &'a str, right_to_left: bool) -> Cow<'a, str>;
}

/// Draws text as written.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopShaper;

impl TextShaper for NoopShaper {
    fn shape<'a>(&self, text: &'a str, _right_to_left: bool) -> Cow<'a, str> {
        Cow::Borrowed(text)
    }
}
