//! Pure page-arithmetic and scroll state.

#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub col: usize,
    pub line_number: usize,
    pub page: usize,
    pub per_page: usize,
    pub max_page: usize,
    pub offset: usize,
    pub total: usize,
    pub sort_top_down: bool,
}

impl Location {
    pub fn new(per_page: usize, sort_top_down: bool) -> Self {
        let mut loc = Location {
            col: 0,
            line_number: 0,
            page: 1,
            per_page: per_page.max(1),
            max_page: 1,
            offset: 0,
            total: 0,
            sort_top_down,
        };
        loc.recompute();
        loc
    }

    fn recompute(&mut self) {
        self.max_page = if self.total == 0 {
            1
        } else {
            (self.total + self.per_page - 1) / self.per_page
        };
        self.page = self.page.clamp(1, self.max_page);
        self.offset = (self.page - 1) * self.per_page;
    }

    pub fn set_total(&mut self, total: usize) {
        self.total = total;
        self.recompute();
    }

    pub fn set_per_page(&mut self, per_page: usize) {
        self.per_page = per_page.max(1);
        self.recompute();
    }

    /// Apply a vertical delta to `line_number`, wrapping at the ends
    /// (up from 0 goes to the last line; down from the last goes to 0),
    /// and recompute `page`/`offset`/`max_page`.
    pub fn move_cursor(&mut self, delta: isize) {
        if self.total == 0 {
            return;
        }
        let dir: isize = if self.sort_top_down { 1 } else { -1 };
        let signed = delta * dir;
        let mut next = self.line_number as isize + signed;
        let total = self.total as isize;
        if next < 0 {
            next = total - 1;
        } else if next >= total {
            next = 0;
        }
        self.line_number = next as usize;
        self.page = self.line_number / self.per_page + 1;
        self.recompute();
    }

    /// Move the cursor directly to an absolute line index (`--initial-index`),
    /// clamping to the last line rather than wrapping the way `move_cursor` does.
    pub fn set_cursor(&mut self, index: usize) {
        if self.total == 0 {
            return;
        }
        self.line_number = index.min(self.total - 1);
        self.page = self.line_number / self.per_page + 1;
        self.recompute();
    }

    /// Shift `col` by half the screen width; negative results clamp to 0.
    pub fn scroll_horizontal(&mut self, screen_width: usize, delta_sign: isize) {
        let half = (screen_width / 2) as isize;
        let next = self.col as isize + delta_sign * half;
        self.col = next.max(0) as usize;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariants_hold_after_set_total() {
        let mut loc = Location::new(10, true);
        loc.set_total(95);
        assert_eq!(loc.max_page, 10);
        assert!(loc.page >= 1 && loc.page <= loc.max_page);
        assert_eq!(loc.offset, (loc.page - 1) * loc.per_page);
    }

    #[test]
    fn vertical_move_wraps_at_boundaries() {
        let mut loc = Location::new(10, true);
        loc.set_total(5);
        loc.line_number = 0;
        loc.move_cursor(-1);
        assert_eq!(loc.line_number, 4);

        loc.line_number = 4;
        loc.move_cursor(1);
        assert_eq!(loc.line_number, 0);
    }

    #[test]
    fn horizontal_scroll_clamps_to_zero() {
        let mut loc = Location::new(10, true);
        loc.scroll_horizontal(80, -1);
        assert_eq!(loc.col, 0);
        loc.scroll_horizontal(80, 1);
        assert_eq!(loc.col, 40);
        loc.scroll_horizontal(80, -1);
        assert_eq!(loc.col, 0);
    }
}
