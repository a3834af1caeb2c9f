//! Terminal escape handling for captured output

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// Erase-display, cursor-home and full-reset sequences
static CLEAR_SCREEN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[(?:[0-3]?J|H|c)|\x1bc").expect("Invalid clear-screen regex"));

/// Remove clear-screen escape sequences, leaving colours and other codes alone
pub fn strip_clear_screen(line: &str) -> Cow<'_, str> {
    CLEAR_SCREEN_REGEX.replace_all(line, "")
}
