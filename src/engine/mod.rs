//! Pluggable filter engines: the public contract, parallel ordered-merge
//! application, and the built-in filter families.
pub mod external;
pub mod fuzzy;
pub mod regexp;

use crate::cancellation::CancellationToken;
use crate::error::{PecoError, Result};
use crate::line::Line;
use std::fmt::Display;

/// How often (in lines) a sequential `apply` loop re-checks cancellation.
pub const CANCEL_POLL_INTERVAL: usize = 1000;

/// The contract every filter implementation satisfies.
pub trait MatchEngine: Send + Sync + Display {
    /// Preferred batch size; 0 means "engine default" (the caller decides).
    fn buf_size(&self) -> usize {
        0
    }

    fn supports_parallel(&self) -> bool {
        false
    }

    /// Filter-scoped cancellation context, threading the query through.
    fn new_context(&self, parent: &CancellationToken, _query: &str) -> CancellationToken {
        parent.child()
    }

    /// Try to match a single line; `None` means no match.
    fn match_one(&self, line: &Line) -> Option<Line>;

    /// Emit matched lines from `lines` via `out`, honouring `ctx`
    /// cancellation every `CANCEL_POLL_INTERVAL` lines. The default
    /// sequential implementation is correct for every engine; engines that
    /// set `supports_parallel() == true` get the parallel ordered-merge
    /// path automatically through `apply_with_parallelism`.
    fn apply(&self, ctx: &CancellationToken, lines: &[Line], out: &mut dyn FnMut(Line)) -> Result<()> {
        for (i, line) in lines.iter().enumerate() {
            if i % CANCEL_POLL_INTERVAL == 0 && ctx.is_cancelled() {
                return Err(PecoError::Cancelled);
            }
            if let Some(matched) = self.match_one(line) {
                out(matched);
            }
        }
        Ok(())
    }

    /// Synchronous convenience form of `apply`.
    fn apply_collect(&self, ctx: &CancellationToken, lines: &[Line]) -> Result<Vec<Line>> {
        let mut result = Vec::new();
        self.apply(ctx, lines, &mut |l| result.push(l))?;
        Ok(result)
    }
}

/// Runs `engine` over `lines` using `rayon` ordered chunks when
/// `engine.supports_parallel()` is true, falling back to `engine.apply`
/// otherwise. Each worker emits an `(ordinal, chunk)` pair; chunks are
/// released to `out` in ordinal order, so filter output order always
/// matches input id order.
pub fn apply_with_parallelism(
    engine: &dyn MatchEngine,
    ctx: &CancellationToken,
    lines: &[Line],
    chunk_size: usize,
    out: &mut dyn FnMut(Line),
) -> Result<()> {
    if !engine.supports_parallel() || lines.len() <= chunk_size {
        return engine.apply(ctx, lines, out);
    }

    use rayon::prelude::*;

    let chunk_size = chunk_size.max(1);
    let chunks: Vec<&[Line]> = lines.chunks(chunk_size).collect();

    let results: Vec<Result<(usize, Vec<Line>)>> = chunks
        .par_iter()
        .enumerate()
        .map(|(ordinal, chunk)| {
            if ctx.is_cancelled() {
                return Err(PecoError::Cancelled);
            }
            let mut matched = Vec::new();
            engine.apply(ctx, chunk, &mut |l| matched.push(l))?;
            Ok((ordinal, matched))
        })
        .collect();

    let mut ordered: Vec<(usize, Vec<Line>)> = Vec::with_capacity(results.len());
    for r in results {
        match r {
            Ok(pair) => ordered.push(pair),
            Err(e) => return Err(e),
        }
    }
    ordered.sort_by_key(|(ordinal, _)| *ordinal);
    for (_, chunk) in ordered {
        for line in chunk {
            out(line);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::regexp::{CaseMatching, RegexEngine};

    fn lines(texts: &[&str]) -> Vec<Line> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Line::new(i as u64 + 1, t.to_string(), false))
            .collect()
    }

    #[test]
    fn parallel_apply_preserves_input_order() {
        let engine = RegexEngine::builder().query("o").case(CaseMatching::Ignore).build();
        let input = lines(&["one", "two", "three", "four", "five", "six", "seven", "eight"]);
        let ctx = CancellationToken::new();
        let mut out = Vec::new();
        apply_with_parallelism(&engine, &ctx, &input, 2, &mut |l| out.push(l)).unwrap();

        let expected: Vec<u64> = input.iter().filter(|l| l.display().contains('o')).map(|l| l.id()).collect();
        let actual: Vec<u64> = out.iter().map(|l| l.id()).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn cancellation_stops_within_poll_interval() {
        let engine = RegexEngine::builder().query("o").case(CaseMatching::Ignore).build();
        let ctx = CancellationToken::new();
        ctx.cancel();
        let input = lines(&["one", "two"]);
        let result = engine.apply(&ctx, &input, &mut |_| {});
        assert!(matches!(result, Err(PecoError::Cancelled)));
    }
}
