//! Fuzzy filter family, wrapping `fuzzy_matcher`'s `SkimMatcherV2`
//! and `ClangdMatcher` behind the same builder shape the donor's
//! `engine/fuzzy.rs` uses, minus the donor's multi-field ranking machinery
//! (`RankBuilder`, `MatchRange::Chars`) which has no counterpart here.
use crate::engine::regexp::CaseMatching;
use crate::line::Line;
use fuzzy_matcher::clangd::ClangdMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use std::fmt::{self, Display};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FuzzyAlgorithm {
    SkimV2,
    Clangd,
}

impl Default for FuzzyAlgorithm {
    fn default() -> Self {
        FuzzyAlgorithm::SkimV2
    }
}

/// Map a fuzzy matcher's char-index match positions onto a byte range in
/// `display`, spanning from the first matched char to the last.
fn char_positions_to_byte_range(display: &str, positions: &[usize]) -> Option<(usize, usize)> {
    let first = *positions.iter().min()?;
    let last = *positions.iter().max()?;
    let mut start = None;
    let mut end = None;
    for (char_idx, (byte_idx, ch)) in display.char_indices().enumerate() {
        if char_idx == first {
            start = Some(byte_idx);
        }
        if char_idx == last {
            end = Some(byte_idx + ch.len_utf8());
        }
    }
    Some((start?, end?))
}

pub struct FuzzyEngine {
    query: String,
    matcher: Box<dyn FuzzyMatcher + Send + Sync>,
    /// Sort matched lines by longest-substring-first within each batch
    /// handed to `apply`/`apply_collect`. This is a per-batch convenience
    /// only: a line's rank relative to lines in a *different* batch (e.g.
    /// produced under parallel chunking) is not considered, since the
    /// engine has no visibility outside the slice it is given.
    longest_sort: bool,
}

impl FuzzyEngine {
    pub fn builder() -> FuzzyEngineBuilder {
        FuzzyEngineBuilder::default()
    }

    fn fuzzy_match(&self, display: &str, pattern: &str) -> Option<(i64, Vec<usize>)> {
        if pattern.is_empty() {
            return Some((0, Vec::new()));
        }
        if display.is_empty() {
            return None;
        }
        self.matcher.fuzzy_indices(display, pattern)
    }

    /// Reorder matched lines within a single batch: longer match span
    /// first, then earlier match start, then shorter overall line.
    pub fn sort_batch(&self, lines: &mut [Line]) {
        if !self.longest_sort {
            return;
        }
        lines.sort_by_key(|line| {
            let span = line
                .indices()
                .and_then(|r| r.first())
                .map(|(s, e)| e.saturating_sub(*s))
                .unwrap_or(0);
            let start = line.indices().and_then(|r| r.first()).map(|(s, _)| *s).unwrap_or(0);
            (std::cmp::Reverse(span), start, line.display().len())
        });
    }
}

impl super::MatchEngine for FuzzyEngine {
    fn supports_parallel(&self) -> bool {
        true
    }

    fn match_one(&self, line: &Line) -> Option<Line> {
        let display = line.display();
        let (_, positions) = self.fuzzy_match(display.as_ref(), &self.query)?;
        let indices = if positions.is_empty() {
            None
        } else {
            char_positions_to_byte_range(display.as_ref(), &positions).map(|r| vec![r])
        };
        drop(display);
        Some(line.clone().with_indices(indices))
    }
}

impl Display for FuzzyEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Fuzzy: {})", self.query)
    }
}

#[derive(Default)]
pub struct FuzzyEngineBuilder {
    query: String,
    case: CaseMatching,
    algorithm: FuzzyAlgorithm,
    longest_sort: bool,
}

impl FuzzyEngineBuilder {
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn case(mut self, case: CaseMatching) -> Self {
        self.case = case;
        self
    }

    pub fn algorithm(mut self, algorithm: FuzzyAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn longest_sort(mut self, enabled: bool) -> Self {
        self.longest_sort = enabled;
        self
    }

    pub fn build(self) -> FuzzyEngine {
        let matcher: Box<dyn FuzzyMatcher + Send + Sync> = match self.algorithm {
            FuzzyAlgorithm::SkimV2 => {
                let matcher = SkimMatcherV2::default();
                let matcher = match self.case {
                    CaseMatching::Respect => matcher.respect_case(),
                    CaseMatching::Ignore => matcher.ignore_case(),
                    CaseMatching::Smart => matcher.smart_case(),
                };
                Box::new(matcher)
            }
            FuzzyAlgorithm::Clangd => {
                let matcher = ClangdMatcher::default();
                let matcher = match self.case {
                    CaseMatching::Respect => matcher.respect_case(),
                    CaseMatching::Ignore => matcher.ignore_case(),
                    CaseMatching::Smart => matcher.smart_case(),
                };
                Box::new(matcher)
            }
        };

        FuzzyEngine {
            query: self.query,
            matcher,
            longest_sort: self.longest_sort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MatchEngine as _;

    fn line(id: u64, text: &str) -> Line {
        Line::new(id, text.to_string(), false)
    }

    #[test]
    fn subsequence_matches_and_highlights_a_span() {
        let engine = FuzzyEngine::builder().query("ace").case(CaseMatching::Ignore).build();
        let matched = engine.match_one(&line(1, "a-b-c-d-e")).expect("should match");
        assert!(matched.indices().is_some());
    }

    #[test]
    fn non_subsequence_does_not_match() {
        let engine = FuzzyEngine::builder().query("xyz").case(CaseMatching::Ignore).build();
        assert!(engine.match_one(&line(1, "abc")).is_none());
    }

    #[test]
    fn empty_query_matches_everything_without_highlight() {
        let engine = FuzzyEngine::builder().query("").case(CaseMatching::Ignore).build();
        let matched = engine.match_one(&line(1, "anything")).expect("should match");
        assert!(matched.indices().is_none());
    }

    #[test]
    fn longest_sort_orders_by_match_span_then_position() {
        let engine = FuzzyEngine::builder()
            .query("ab")
            .case(CaseMatching::Ignore)
            .longest_sort(true)
            .build();
        let mut lines: Vec<Line> = vec![
            engine.match_one(&line(1, "xaxbx")).unwrap(),
            engine.match_one(&line(2, "abx")).unwrap(),
        ];
        engine.sort_batch(&mut lines);
        assert_eq!(lines[0].id(), 2);
    }
}
