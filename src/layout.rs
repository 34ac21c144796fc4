//! Screen geometry: where the prompt and the match list sit for each of
//! the three layout variants, and how many lines fit per page.
//!
//! Grounded on the donor's `margin_string_to_size`/`parse_margin` treatment
//! of geometry as pure data in `src/util.rs`; the three-variant split and
//! the `LayoutState` snapshot itself have no direct donor analogue (the
//! donor computes layout inline against its own `Model`/`Term` state).
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    /// Prompt at the top, matches grow downward beneath it.
    TopDown,
    /// Prompt at the bottom, matches grow upward above it (closest match to
    /// the prompt is the top of the visible list).
    BottomUp,
    /// Matches at the top, prompt at the very bottom.
    TopDownQueryBottom,
}

impl LayoutKind {
    pub fn from_name(name: &str) -> Option<LayoutKind> {
        Some(match name {
            "top-down" => LayoutKind::TopDown,
            "bottom-up" => LayoutKind::BottomUp,
            "top-down-query-bottom" => LayoutKind::TopDownQueryBottom,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            LayoutKind::TopDown => "top-down",
            LayoutKind::BottomUp => "bottom-up",
            LayoutKind::TopDownQueryBottom => "top-down-query-bottom",
        }
    }

    /// Whether the list grows away from the prompt in ascending line-number
    /// order (top-down variants) or toward it (bottom-up).
    pub fn sort_top_down(self) -> bool {
        !matches!(self, LayoutKind::BottomUp)
    }
}

impl Default for LayoutKind {
    fn default() -> Self {
        LayoutKind::TopDown
    }
}

/// An immutable per-frame snapshot of where everything goes, computed once
/// from the terminal size and handed to the drawing functions in `view.rs`
/// instead of giving them access to the whole running orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct LayoutState {
    pub kind: LayoutKind,
    pub width: usize,
    pub height: usize,
    pub prompt_row: usize,
    pub list_top_row: usize,
    pub per_page: usize,
}

impl LayoutState {
    pub fn compute(kind: LayoutKind, width: usize, height: usize) -> Self {
        let height = height.max(1);
        let per_page = height.saturating_sub(1).max(1);
        let (prompt_row, list_top_row) = match kind {
            LayoutKind::TopDown => (0, 1),
            LayoutKind::BottomUp => (height - 1, 0),
            LayoutKind::TopDownQueryBottom => (height - 1, 0),
        };
        LayoutState {
            kind,
            width,
            height,
            prompt_row,
            list_top_row,
            per_page,
        }
    }

    /// Row within `[list_top_row, list_top_row + per_page)` for the
    /// `i`-th visible line (0-indexed from the top of the page), honoring
    /// `BottomUp`'s upward growth.
    pub fn row_for_visible_index(&self, i: usize) -> usize {
        match self.kind {
            LayoutKind::TopDown | LayoutKind::TopDownQueryBottom => self.list_top_row + i,
            LayoutKind::BottomUp => self.list_top_row + self.per_page.saturating_sub(1).saturating_sub(i),
        }
    }
}

/// Parse `margin` option strings (`"10"`, `"10%"`, `"T,RL,B"`, ...) the way
/// the donor's `parse_margin` does, kept as plain size tuples rather than
/// `tuikit::Size` since peco's layout only needs top/right/bottom/left in
/// cells once resolved against the terminal size.
pub fn margin_to_cells(token: &str, total: usize) -> usize {
    if let Some(pct) = token.strip_suffix('%') {
        let pct: usize = pct.parse().unwrap_or(0).min(100);
        total * pct / 100
    } else {
        token.parse().unwrap_or(0)
    }
}

pub fn parse_margin(margin_option: &str) -> (String, String, String, String) {
    let margins: Vec<&str> = margin_option.split(',').collect();
    match margins.len() {
        1 => (margins[0].into(), margins[0].into(), margins[0].into(), margins[0].into()),
        2 => (margins[0].into(), margins[1].into(), margins[0].into(), margins[1].into()),
        3 => (margins[0].into(), margins[1].into(), margins[2].into(), margins[1].into()),
        4 => (margins[0].into(), margins[1].into(), margins[2].into(), margins[3].into()),
        _ => ("0".into(), "0".into(), "0".into(), "0".into()),
    }
}

#[allow(dead_code)]
pub type StyleOverrides = HashMap<String, Vec<String>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_down_puts_prompt_above_list() {
        let state = LayoutState::compute(LayoutKind::TopDown, 80, 24);
        assert_eq!(state.prompt_row, 0);
        assert_eq!(state.list_top_row, 1);
        assert_eq!(state.per_page, 23);
    }

    #[test]
    fn bottom_up_puts_prompt_below_list_and_grows_upward() {
        let state = LayoutState::compute(LayoutKind::BottomUp, 80, 24);
        assert_eq!(state.prompt_row, 23);
        assert_eq!(state.list_top_row, 0);
        assert_eq!(state.row_for_visible_index(0), 22);
        assert_eq!(state.row_for_visible_index(1), 21);
    }

    #[test]
    fn top_down_query_bottom_grows_downward_above_the_prompt() {
        let state = LayoutState::compute(LayoutKind::TopDownQueryBottom, 80, 24);
        assert_eq!(state.prompt_row, 23);
        assert_eq!(state.list_top_row, 0);
        assert_eq!(state.row_for_visible_index(0), 0);
        assert_eq!(state.row_for_visible_index(1), 1);
    }

    #[test]
    fn name_round_trips() {
        for kind in [LayoutKind::TopDown, LayoutKind::BottomUp, LayoutKind::TopDownQueryBottom] {
            assert_eq!(LayoutKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(LayoutKind::from_name("nonsense"), None);
    }

    #[test]
    fn margin_percent_and_fixed_tokens() {
        assert_eq!(margin_to_cells("10", 100), 10);
        assert_eq!(margin_to_cells("25%", 80), 20);
        assert_eq!(parse_margin("1,2,3"), ("1".into(), "2".into(), "3".into(), "2".into()));
    }
}
