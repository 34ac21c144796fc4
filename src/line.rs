//! Immutable identified text unit.
use std::borrow::Cow;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use tuikit::attr::{Attr, Color, Effect};
use vte::{Params, Parser, Perform};

/// A half-open byte range `[start, end)` into a `Line`'s `display` string.
pub type MatchRange = (usize, usize);

/// An immutable, identified line of text.
///
/// Ordering and equality are defined by `id` alone, matching the donor's
/// `MatchedItem`/`Item` convention of ranking by a single key.
#[derive(Debug, Clone)]
pub struct Line {
    id: u64,
    buffer: String,
    display: String,
    output: String,
    indices: Option<Vec<MatchRange>>,
    ansi_tags: Vec<(usize, Attr)>,
    dirty: Arc<AtomicBool>,
}

impl Line {
    /// Build a line from a raw buffer. If `null_separator` is set and the
    /// buffer contains a NUL byte, `display` is the prefix before it and
    /// `output` the suffix after it; otherwise both equal `buffer`. Equivalent
    /// to `new_with_ansi(id, buffer, null_separator, false)`.
    pub fn new(id: u64, buffer: impl Into<String>, null_separator: bool) -> Self {
        Self::new_with_ansi(id, buffer, null_separator, false)
    }

    /// Like `new`, but when `ansi` is set the null-separator prefix is
    /// first run through an ANSI SGR parser: `display` becomes the
    /// stripped plain text and `ansi_tags` records each `(offset, Attr)`
    /// where the style changed, offsets into that stripped text. `output`
    /// and `buffer` are left untouched, escape codes and all, so a
    /// selected line still reproduces its original colour when echoed
    /// back to a terminal.
    pub fn new_with_ansi(id: u64, buffer: impl Into<String>, null_separator: bool, ansi: bool) -> Self {
        let buffer = buffer.into();
        let (display_raw, output) = if null_separator {
            match buffer.find('\0') {
                Some(pos) => (buffer[..pos].to_string(), buffer[pos + 1..].to_string()),
                None => (buffer.clone(), buffer.clone()),
            }
        } else {
            (buffer.clone(), buffer.clone())
        };

        let (display, ansi_tags) = if ansi { strip_ansi(&display_raw) } else { (display_raw, Vec::new()) };

        Line {
            id,
            buffer,
            display,
            output,
            indices: None,
            ansi_tags,
            dirty: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Wrap this line with the match indices produced by a filter. Indices
    /// are byte ranges into `display`; `Some(vec![])` means "matched, but no
    /// highlight", `None` means "no match information available".
    pub fn with_indices(mut self, indices: Option<Vec<MatchRange>>) -> Self {
        if let Some(ref ranges) = indices {
            for &(start, end) in ranges {
                if start > self.display.len() || end > self.display.len() || start > end {
                    panic!("InvalidIndex: ({}, {}) out of bounds for display of len {}", start, end, self.display.len());
                }
            }
        }
        self.indices = indices;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn display(&self) -> Cow<str> {
        Cow::Borrowed(&self.display)
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn indices(&self) -> Option<&[MatchRange]> {
        self.indices.as_deref()
    }

    /// Style changes recorded while stripping ANSI codes from `display`,
    /// as `(byte offset into display, Attr to apply from that offset on)`.
    /// Empty when the line wasn't built with `ansi` set.
    pub fn ansi_tags(&self) -> &[(usize, Attr)] {
        &self.ansi_tags
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(AtomicOrdering::SeqCst)
    }

    pub fn mark_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, AtomicOrdering::SeqCst);
    }
}

impl PartialEq for Line {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Line {}

impl PartialOrd for Line {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Line {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

/// Run `text` through a `vte::Parser`, returning the plain text with every
/// SGR escape removed plus the `(offset, Attr)` tags those escapes produced.
/// Grounded on the donor's `AnsiString` (`ansi.rs`): a stripped `String`
/// plus a side `Vec<(usize, attr_t)>` of style changes, here parsed with
/// `vte::Parser` instead of the donor's hand-rolled regex state machine,
/// and carrying a `tuikit::attr::Attr` instead of a curses `attr_t`.
fn strip_ansi(text: &str) -> (String, Vec<(usize, Attr)>) {
    let mut performer = AnsiStripper::default();
    let mut parser = Parser::new();
    for byte in text.as_bytes() {
        parser.advance(&mut performer, *byte);
    }
    (performer.stripped, performer.tags)
}

#[derive(Default)]
struct AnsiStripper {
    stripped: String,
    tags: Vec<(usize, Attr)>,
    attr: Attr,
}

impl Perform for AnsiStripper {
    fn print(&mut self, c: char) {
        self.stripped.push(c);
    }

    fn csi_dispatch(&mut self, params: &Params, _intermediates: &[u8], _ignore: bool, action: char) {
        if action != 'm' {
            return;
        }
        let codes: Vec<u16> = params.iter().flat_map(|sub| sub.iter().copied()).collect();
        apply_sgr_codes(&mut self.attr, &codes);
        self.tags.push((self.stripped.len(), self.attr));
    }
}

/// Fold a flattened list of SGR parameters (`38;5;196` etc.) into `attr`.
/// Covers reset, bold/underline/reverse, the 8/16-colour and 256-colour
/// palettes, and truecolor; unrecognised codes are ignored.
fn apply_sgr_codes(attr: &mut Attr, codes: &[u16]) {
    if codes.is_empty() {
        *attr = Attr::default();
        return;
    }
    let mut i = 0;
    while i < codes.len() {
        match codes[i] {
            0 => *attr = Attr::default(),
            1 => attr.effect |= Effect::BOLD,
            4 => attr.effect |= Effect::UNDERLINE,
            7 => attr.effect |= Effect::REVERSE,
            n @ 30..=37 => attr.fg = Color::AnsiValue((n - 30) as u8),
            n @ 40..=47 => attr.bg = Color::AnsiValue((n - 40) as u8),
            n @ 90..=97 => attr.fg = Color::AnsiValue((n - 90) as u8 + 8),
            n @ 100..=107 => attr.bg = Color::AnsiValue((n - 100) as u8 + 8),
            38 | 48 => {
                let target_fg = codes[i] == 38;
                match codes.get(i + 1) {
                    Some(5) => {
                        if let Some(&n) = codes.get(i + 2) {
                            let color = Color::AnsiValue(n as u8);
                            if target_fg {
                                attr.fg = color;
                            } else {
                                attr.bg = color;
                            }
                        }
                        i += 2;
                    }
                    Some(2) => {
                        if let (Some(&r), Some(&g), Some(&b)) = (codes.get(i + 2), codes.get(i + 3), codes.get(i + 4)) {
                            let color = Color::Rgb(r as u8, g as u8, b as u8);
                            if target_fg {
                                attr.fg = color;
                            } else {
                                attr.bg = color;
                            }
                        }
                        i += 4;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        i += 1;
    }
}
