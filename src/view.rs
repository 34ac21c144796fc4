//! Drawing: turns a `LayoutState` snapshot plus the current query/selection/
//! match-list state into `Screen` calls.
//!
//! Grounded on the donor's `src/util.rs` (`LinePrinter`, `accumulate_text_width`,
//! `reshape_string` — reused nearly verbatim for the truncate-with-ellipsis
//! and match-visible-window logic) and `src/theme.rs`'s `ColorTheme`. Unlike
//! the donor, which draws straight against a `tuikit::Canvas` reached through
//! `Model`, every function here takes an explicit `&dyn Screen` and a
//! `LayoutState` snapshot (REDESIGN FLAG: no implicit access to orchestrator
//! state).
use crate::layout::LayoutState;
use crate::line::{Line, MatchRange};
use crate::query::{Caret, Query};
use crate::screen::Screen;
use crate::selection::Selection;
use crate::theme::ColorTheme;
use crate::util::{accumulate_text_width, reshape_string};
use std::cell::RefCell;
use std::collections::HashMap;
use tuikit::attr::Attr;

const TABSTOP: usize = 8;

pub fn draw_prompt(screen: &dyn Screen, theme: &ColorTheme, state: &LayoutState, prompt: &str, query: &Query, caret: &Caret) {
    let text = format!("{}{}", prompt, query.string());
    screen.print(state.prompt_row, 0, &text, theme.prompt());
    let _ = caret; // caret position is surfaced to the terminal via the cursor, not drawn as text
}

pub fn draw_status(screen: &dyn Screen, theme: &ColorTheme, state: &LayoutState, text: &str) {
    screen.print(state.prompt_row, state.width.saturating_sub(text.len()), text, theme.context());
}

/// Tracks which line id was last drawn at each row, so an unchanged line
/// whose `dirty` flag is clear can be skipped. Keyed by screen row rather
/// than by line id since the row a given line occupies shifts as the
/// cursor scrolls the page.
pub struct DisplayCache {
    last_drawn: RefCell<HashMap<usize, u64>>,
}

impl DisplayCache {
    pub fn new() -> Self {
        DisplayCache {
            last_drawn: RefCell::new(HashMap::new()),
        }
    }

    fn should_redraw(&self, row: usize, line: &Line) -> bool {
        let cached = self.last_drawn.borrow().get(&row).copied();
        cached != Some(line.id()) || line.is_dirty()
    }

    fn note_drawn(&self, row: usize, line: &Line) {
        self.last_drawn.borrow_mut().insert(row, line.id());
        line.mark_dirty(false);
    }

    pub fn invalidate(&self) {
        self.last_drawn.borrow_mut().clear();
    }
}

impl Default for DisplayCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Draw the visible page of `lines` (already the current page's slice, in
/// display order) onto the list area described by `state`.
///
/// `current` is the line id under the cursor; `selection` supplies which
/// ids are marked. `disable_cache` bypasses `cache` entirely, forcing every
/// row to redraw (the `DisableCache` config flag). `selection_prefix`, when
/// set, marks a selected row with a leading text prefix instead of the
/// `SavedSelection` color (the `SelectionPrefix` config option).
#[allow(clippy::too_many_arguments)]
pub fn draw_list(
    screen: &dyn Screen,
    theme: &ColorTheme,
    state: &LayoutState,
    lines: &[Line],
    current: Option<u64>,
    selection: &Selection,
    cache: &DisplayCache,
    disable_cache: bool,
    selection_prefix: Option<&str>,
) {
    for (i, line) in lines.iter().enumerate().take(state.per_page) {
        let row = state.row_for_visible_index(i);
        if !disable_cache && !cache.should_redraw(row, line) {
            continue;
        }
        draw_line(
            screen,
            theme,
            state,
            row,
            line,
            Some(line.id()) == current,
            selection.has(line.id()),
            selection_prefix,
        );
        cache.note_drawn(row, line);
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_line(
    screen: &dyn Screen,
    theme: &ColorTheme,
    state: &LayoutState,
    row: usize,
    line: &Line,
    is_current: bool,
    is_selected: bool,
    selection_prefix: Option<&str>,
) {
    let display = line.display();
    let base_attr = if is_current {
        theme.selected()
    } else if is_selected && selection_prefix.is_none() {
        theme.saved_selection()
    } else {
        theme.basic()
    };

    let mut col = 0usize;
    let mut width_budget = state.width;
    if is_selected {
        if let Some(prefix) = selection_prefix {
            screen.print(row, 0, prefix, base_attr);
            let prefix_width = prefix.chars().count();
            col = prefix_width;
            width_budget = state.width.saturating_sub(prefix_width);
        }
    }

    let acc_width = accumulate_text_width(&display, TABSTOP);
    let (match_start, match_end) = first_match_char_range(&display, line.indices());
    let (shift, _full_width) = reshape_string(&display, width_budget, match_start, match_end, TABSTOP);

    let mut printed_width = 0usize;
    for (idx, ch) in display.chars().enumerate() {
        let char_start_width = if idx == 0 { 0 } else { acc_width[idx - 1] };
        if char_start_width < shift {
            continue;
        }
        if printed_width >= width_budget {
            break;
        }
        let attr = attr_for_char_index(&display, idx, line.indices(), base_attr, theme.matched());
        screen.put_cell(row, col, ch, attr);
        let w = acc_width[idx] - char_start_width;
        col += w;
        printed_width += w;
    }
}

/// The first highlighted char-index range, used only to decide which part
/// of a long line to keep visible (`reshape_string`'s "smart shift").
fn first_match_char_range(display: &str, indices: Option<&[MatchRange]>) -> (usize, usize) {
    let ranges = match indices {
        Some(r) if !r.is_empty() => r,
        _ => return (0, 0),
    };
    let (byte_start, byte_end) = ranges[0];
    let mut start_char = 0;
    let mut end_char = 0;
    for (char_idx, (byte_idx, _)) in display.char_indices().enumerate() {
        if byte_idx <= byte_start {
            start_char = char_idx;
        }
        if byte_idx < byte_end {
            end_char = char_idx;
        }
    }
    (start_char, end_char)
}

/// The attribute for the char at `char_idx`: `matched` if any highlight
/// range covers its byte offset, `base` otherwise. Checked independently
/// per character (not "entered range" state carried across the loop) so a
/// highlight never bleeds into the non-highlighted text that follows it.
fn attr_for_char_index(display: &str, char_idx: usize, indices: Option<&[MatchRange]>, base: Attr, matched: Attr) -> Attr {
    let ranges = match indices {
        Some(r) => r,
        None => return base,
    };
    let byte_idx = match display.char_indices().nth(char_idx) {
        Some((b, _)) => b,
        None => return base,
    };
    if ranges.iter().any(|&(start, end)| byte_idx >= start && byte_idx < end) {
        matched
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutKind;
    use crate::screen::RecordingScreen;

    #[test]
    fn prompt_is_printed_with_query_text() {
        let screen = RecordingScreen::new(80, 24);
        let theme = ColorTheme::dark256();
        let state = LayoutState::compute(LayoutKind::TopDown, 80, 24);
        let mut query = Query::new();
        query.set("hello");
        draw_prompt(&screen, &theme, &state, "QUERY> ", &query, &Caret::new());
        assert_eq!(screen.draws(), vec!["print(0,0)=QUERY> hello".to_string()]);
    }

    #[test]
    fn matched_range_gets_distinct_attr_from_surrounding_text() {
        let line = Line::new(1, "hello world", false).with_indices(Some(vec![(0, 5)]));
        let theme = ColorTheme::dark256();
        let base = theme.basic();
        let matched = theme.matched();
        assert_eq!(attr_for_char_index(&line.display(), 0, line.indices(), base, matched).fg, matched.fg);
        assert_eq!(attr_for_char_index(&line.display(), 6, line.indices(), base, matched).fg, base.fg);
    }

    #[test]
    fn unchanged_clean_line_is_skipped_by_the_cache() {
        let cache = DisplayCache::new();
        let line = Line::new(1, "hello", false);
        assert!(cache.should_redraw(0, &line));
        cache.note_drawn(0, &line);
        assert!(!line.is_dirty());
        assert!(!cache.should_redraw(0, &line));
        line.mark_dirty(true);
        assert!(cache.should_redraw(0, &line));
    }

    #[test]
    fn draw_list_marks_current_row_and_honors_the_cache() {
        let screen = RecordingScreen::new(80, 24);
        let theme = ColorTheme::dark256();
        let state = LayoutState::compute(LayoutKind::TopDown, 80, 24);
        let lines = vec![Line::new(1, "alpha", false), Line::new(2, "bravo", false)];
        let selection = Selection::new();
        let cache = DisplayCache::new();
        draw_list(&screen, &theme, &state, &lines, Some(1), &selection, &cache, false, None);
        assert!(!screen.draws().is_empty());

        let draws_before = screen.draws().len();
        draw_list(&screen, &theme, &state, &lines, Some(1), &selection, &cache, false, None);
        assert_eq!(screen.draws().len(), draws_before, "clean rows must not redraw");
    }
}
