//! Regexp filter family: Regexp, IgnoreCase, CaseSensitive, SmartCase,
//! IRegexp. Grounded on the donor's `engine/regexp.rs`
//! (builder pattern, `(?i)` case prefix) generalised with the AND/negative
//! term splitting the donor's `engine/andor.rs`/`engine/factory.rs`
//! implement as separate combinator engines.
use crate::cancellation::CancellationToken;
use crate::error::{PecoError, Result};
use crate::line::Line;
use crate::spinlock::SpinLock;
use regex::Regex;
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::time::{Duration, Instant};

/// Soft cap on the number of cached compiled terms.
pub const DEFAULT_CACHE_CAP: usize = 100;
/// Default time-based eviction window for a cache entry.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseMatching {
    Respect,
    Ignore,
    Smart,
}

impl Default for CaseMatching {
    fn default() -> Self {
        CaseMatching::Smart
    }
}

/// One whitespace-separated query term after negative/escape parsing.
#[derive(Debug, Clone)]
struct Term {
    pattern: String,
    negative: bool,
}

/// Split `query` on whitespace into `Term`s:
/// - a term prefixed with `-` (but not `-`, `--`, or `\-foo`) is negative;
/// - `\-foo` is a literal positive `-foo`.
fn split_terms(query: &str) -> Vec<Term> {
    query
        .split_whitespace()
        .map(|raw| {
            if let Some(rest) = raw.strip_prefix("\\-") {
                Term {
                    pattern: format!("-{}", rest),
                    negative: false,
                }
            } else if raw.starts_with('-') && raw != "-" && raw != "--" {
                Term {
                    pattern: raw[1..].to_string(),
                    negative: true,
                }
            } else {
                Term {
                    pattern: raw.to_string(),
                    negative: false,
                }
            }
        })
        .collect()
}

fn effective_case(query: &str, case: CaseMatching) -> bool {
    match case {
        CaseMatching::Respect => false,
        CaseMatching::Ignore => true,
        CaseMatching::Smart => !query.chars().any(|c| c.is_uppercase()),
    }
}

struct CacheEntry {
    regex: Regex,
    last_used: Instant,
}

#[derive(Default)]
struct Cache {
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    fn get_or_compile(&mut self, key: &str, pattern: &str, ignore_case: bool) -> Result<Regex, regex::Error> {
        self.sweep();
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_used = Instant::now();
            return Ok(entry.regex.clone());
        }
        let full_pattern = if ignore_case {
            format!("(?i){}", pattern)
        } else {
            pattern.to_string()
        };
        let regex = Regex::new(&full_pattern)?;
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                regex: regex.clone(),
                last_used: Instant::now(),
            },
        );
        Ok(regex)
    }

    fn sweep(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| now.duration_since(entry.last_used) < DEFAULT_CACHE_TTL);
        while self.entries.len() > DEFAULT_CACHE_CAP {
            if let Some(oldest_key) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest_key);
            } else {
                break;
            }
        }
    }
}

pub struct RegexEngine {
    query: String,
    case: CaseMatching,
    cache: SpinLock<Cache>,
}

impl RegexEngine {
    pub fn builder() -> RegexEngineBuilder {
        RegexEngineBuilder::default()
    }

    fn compiled_terms(&self) -> Result<Vec<(Regex, bool)>, regex::Error> {
        let ignore_case = effective_case(&self.query, self.case);
        let mut cache = self.cache.lock();
        split_terms(&self.query)
            .into_iter()
            .map(|term| {
                let key = format!("{}\0{}", ignore_case, term.pattern);
                let regex = cache.get_or_compile(&key, &term.pattern, ignore_case)?;
                Ok((regex, term.negative))
            })
            .collect()
    }
}

impl super::MatchEngine for RegexEngine {
    fn supports_parallel(&self) -> bool {
        true
    }

    /// Compiles every term once up front so a malformed query surfaces as
    /// `PecoError::CompileError` instead of silently matching nothing line
    /// by line through `match_one`.
    fn apply(&self, ctx: &CancellationToken, lines: &[Line], out: &mut dyn FnMut(Line)) -> Result<()> {
        self.compiled_terms().map_err(PecoError::CompileError)?;
        for (i, line) in lines.iter().enumerate() {
            if i % super::CANCEL_POLL_INTERVAL == 0 && ctx.is_cancelled() {
                return Err(PecoError::Cancelled);
            }
            if let Some(matched) = self.match_one(line) {
                out(matched);
            }
        }
        Ok(())
    }

    fn match_one(&self, line: &Line) -> Option<Line> {
        let terms = self.compiled_terms().ok()?;
        let display = line.display();
        let display = display.as_ref();

        let positives: Vec<&Regex> = terms.iter().filter(|(_, neg)| !neg).map(|(r, _)| r).collect();
        let negatives: Vec<&Regex> = terms.iter().filter(|(_, neg)| *neg).map(|(r, _)| r).collect();

        if negatives.iter().any(|re| re.is_match(display)) {
            return None;
        }

        if positives.is_empty() {
            // all-negative query: matched without highlight indices.
            return Some(line.clone().with_indices(None));
        }

        let mut ranges = Vec::new();
        for re in &positives {
            match re.find(display) {
                Some(m) => ranges.push((m.start(), m.end())),
                None => return None,
            }
        }
        ranges.sort_unstable();
        Some(line.clone().with_indices(Some(ranges)))
    }
}

impl Display for RegexEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Regexp: {})", self.query)
    }
}

#[derive(Default)]
pub struct RegexEngineBuilder {
    query: String,
    case: CaseMatching,
}

impl RegexEngineBuilder {
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn case(mut self, case: CaseMatching) -> Self {
        self.case = case;
        self
    }

    pub fn build(self) -> RegexEngine {
        RegexEngine {
            query: self.query,
            case: self.case,
            cache: SpinLock::new(Cache::default()),
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
    fn scenario_1_ignore_case_highlights_matches() {
        let engine = RegexEngine::builder().query("r").case(CaseMatching::Ignore).build();
        let lines = vec![line(1, "alpha"), line(2, "bravo"), line(3, "charlie")];
        let matched: Vec<_> = lines.iter().filter_map(|l| engine.match_one(l)).collect();
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].display().as_ref(), "bravo");
        assert_eq!(matched[0].indices(), Some(&[(2, 3)][..]));
        assert_eq!(matched[1].display().as_ref(), "charlie");
        assert_eq!(matched[1].indices(), Some(&[(2, 3)][..]));
    }

    #[test]
    fn scenario_2_smart_case_downgrades_without_uppercase_query() {
        let engine = RegexEngine::builder().query("foo").case(CaseMatching::Smart).build();
        let lines = vec![line(1, "FooBar"), line(2, "foobaz"), line(3, "FOOBAR")];
        let matched: Vec<_> = lines.iter().filter_map(|l| engine.match_one(l)).collect();
        assert_eq!(matched.len(), 3);
    }

    #[test]
    fn scenario_3_negative_term_excludes_and_and_positives_highlight() {
        let engine = RegexEngine::builder().query("hello -world").case(CaseMatching::Ignore).build();
        let lines = vec![line(1, "hello world"), line(2, "hello there"), line(3, "goodbye")];
        let matched: Vec<_> = lines.iter().filter_map(|l| engine.match_one(l)).collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].display().as_ref(), "hello there");
        assert_eq!(matched[0].indices(), Some(&[(0, 5)][..]));
    }

    #[test]
    fn all_negative_query_has_no_highlight_indices() {
        let engine = RegexEngine::builder().query("-foo").case(CaseMatching::Ignore).build();
        let lines = vec![line(1, "foo"), line(2, "bar"), line(3, "baz")];
        let matched: Vec<_> = lines.iter().filter_map(|l| engine.match_one(l)).collect();
        assert_eq!(matched.len(), 2);
        assert!(matched.iter().all(|l| l.indices().is_none()));
    }

    #[test]
    fn escaped_dash_is_a_literal_positive_term() {
        let engine = RegexEngine::builder().query("\\-foo").case(CaseMatching::Ignore).build();
        let lines = vec![line(1, "has-foo-in-it"), line(2, "nothing here")];
        let matched: Vec<_> = lines.iter().filter_map(|l| engine.match_one(l)).collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].display().as_ref(), "has-foo-in-it");
    }

    #[test]
    fn bare_dash_terms_are_not_negative() {
        let terms = split_terms("- -- foo");
        assert!(!terms[0].negative);
        assert!(!terms[1].negative);
        assert!(!terms[2].negative);
    }

    #[test]
    fn malformed_query_surfaces_as_compile_error() {
        use crate::engine::MatchEngine as _;
        let engine = RegexEngine::builder().query("(unclosed").case(CaseMatching::Ignore).build();
        let ctx = CancellationToken::new();
        let lines = vec![line(1, "anything")];
        let result = engine.apply(&ctx, &lines, &mut |_| {});
        assert!(matches!(result, Err(PecoError::CompileError(_))));
    }
}
