//! Clean a raw PTY transcript into plain text lines.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Upper bound for a single cursor-forward expansion
const MAX_CURSOR_FORWARD: usize = 100;

/// `ESC [ n C` (cursor forward)
static CURSOR_FORWARD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\[(\d*)C").unwrap());
/// OSC sequences terminated by BEL or ST
static OSC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)").unwrap());
/// CSI sequences (including private-mode `?`, `<`, `>`, `=` parameters)
static CSI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;?<>=!]*[ -/]*[@-~]").unwrap());
/// Charset designation (`ESC ( B`) and other two-byte escapes
static ESC_OTHER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b[()*+][0-9A-Za-z]|\x1b[@-Z\\-_=>78]").unwrap());

/// Normalize a raw transcript into its ordered sequence of lines.
///
/// Cursor-forward moves become spaces, every other escape is dropped, and
/// `\r` splits lines the same way `\n` does. Empty lines are kept.
pub fn normalize_transcript(raw: &str) -> Vec<String> {
    let cleaned = strip_ansi(raw);
    let unified = cleaned.replace("\r\n", "\n").replace('\r', "\n");
    unified.split('\n').map(str::to_string).collect()
}

/// Remove terminal control sequences while keeping line breaks.
///
/// Carriage returns survive so that callers can decide how to split.
pub fn strip_ansi(input: &str) -> String {
    let expanded = expand_cursor_forward(input);
    let without_osc = OSC_RE.replace_all(&expanded, "");
    let without_csi = CSI_RE.replace_all(&without_osc, "");
    let without_esc = ESC_OTHER_RE.replace_all(&without_csi, "");
    without_esc
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
        .collect()
}

/// Replace `ESC [ n C` with `n` spaces
fn expand_cursor_forward(input: &str) -> Cow<'_, str> {
    CURSOR_FORWARD_RE.replace_all(input, |caps: &Captures| {
        let n = caps[1]
            .parse::<usize>()
            .unwrap_or(1)
            .clamp(1, MAX_CURSOR_FORWARD);
        " ".repeat(n)
    })
}
