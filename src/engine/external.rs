//! Filter that hands a batch of lines to an external command's stdin and
//! reads back the survivors on stdout. Grounded
//! on the donor's `item_collector.rs::get_command_output` (spawn via
//! `$SHELL -c`, piped stdio) generalised from "produce all items" to
//! "filter a batch of lines".
use super::MatchEngine;
use crate::cancellation::CancellationToken;
use crate::error::{PecoError, Result};
use crate::line::Line;
use std::collections::HashMap;
use std::env;
use std::fmt::{self, Display};
use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use std::thread;

/// Lines handed to the external command in one spawn. The donor batches
/// item production the same way; here it bounds how much text the process
/// must buffer before producing output.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

pub struct ExternalEngine {
    cmdline_template: String,
    query: String,
}

impl ExternalEngine {
    pub fn new(cmdline_template: impl Into<String>, query: impl Into<String>) -> Self {
        ExternalEngine {
            cmdline_template: cmdline_template.into(),
            query: query.into(),
        }
    }

    /// Substitute the raw (unescaped) query into `$QUERY`/`{q}` placeholders.
    /// Unlike the regexp/fuzzy engines, the custom filter does not parse
    /// negative terms out of the query; the whole string is passed through.
    fn resolved_cmdline(&self) -> String {
        self.cmdline_template.replace("$QUERY", &self.query).replace("{q}", &self.query)
    }

    fn run_batch(&self, lines: &[Line], out: &mut dyn FnMut(Line)) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let shell = env::var("SHELL").unwrap_or_else(|_| "sh".to_string());
        let mut child = Command::new(shell)
            .arg("-c")
            .arg(self.resolved_cmdline())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let mut stdin = child.stdin.take().expect("child stdin was piped");
        let by_display: HashMap<String, Line> = lines.iter().map(|l| (l.display().into_owned(), l.clone())).collect();
        let payload: String = lines.iter().map(|l| l.display().into_owned() + "\n").collect();

        let writer = thread::spawn(move || -> Result<()> {
            match stdin.write_all(payload.as_bytes()) {
                Ok(()) => Ok(()),
                // The child may have already exited (e.g. `head -n1`); a
                // broken pipe here just means it stopped reading early.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                Err(e) => Err(PecoError::from(e)),
            }
        });

        let stdout = child.stdout.take().expect("child stdout was piped");
        let reader = BufReader::new(stdout);
        for line in reader.lines() {
            let text = line?;
            if let Some(matched) = by_display.get(&text) {
                out(matched.clone().with_indices(None));
            }
        }

        writer.join().expect("external filter writer thread panicked")?;
        child.wait()?;
        Ok(())
    }
}

impl MatchEngine for ExternalEngine {
    fn supports_parallel(&self) -> bool {
        false
    }

    fn buf_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }

    fn match_one(&self, line: &Line) -> Option<Line> {
        let mut out = None;
        self.run_batch(std::slice::from_ref(line), &mut |l| out = Some(l)).ok()?;
        out
    }

    fn apply(&self, ctx: &CancellationToken, lines: &[Line], out: &mut dyn FnMut(Line)) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(PecoError::Cancelled);
        }
        self.run_batch(lines, out)
    }
}

impl Display for ExternalEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(External: {})", self.cmdline_template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: u64, text: &str) -> Line {
        Line::new(id, text.to_string(), false)
    }

    #[test]
    fn query_placeholder_is_substituted() {
        let engine = ExternalEngine::new("grep $QUERY", "needle");
        assert_eq!(engine.resolved_cmdline(), "grep needle");
    }

    #[test]
    fn brace_placeholder_is_also_substituted() {
        let engine = ExternalEngine::new("fzf --query {q}", "abc");
        assert_eq!(engine.resolved_cmdline(), "fzf --query abc");
    }

    #[test]
    fn grep_filters_and_preserves_no_highlight_indices() {
        let engine = ExternalEngine::new("grep needle", "");
        let input = vec![line(1, "needle in a haystack"), line(2, "nothing here")];
        let ctx = CancellationToken::new();
        let mut out = Vec::new();
        engine.apply(&ctx, &input, &mut |l| out.push(l)).expect("grep should run");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), 1);
        assert!(out[0].indices().is_none());
    }
}
