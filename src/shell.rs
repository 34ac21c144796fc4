//! Spawning `$SHELL -c <cmdline>` for `--exec` and as the shared primitive
//! custom filters build on.
//!
//! Grounded on `src/item_collector.rs::get_command_output`'s
//! `env::var("SHELL")`-or-`"sh"` fallback and piped-stdio spawn.
use crate::cancellation::CancellationToken;
use crate::error::Result;
use std::env;
use std::process::{Child, Command, Stdio};

/// Abstracts over spawning a shell command so `--exec`/custom-filter
/// callers don't depend on `std::process::Command` directly, and tests can
/// substitute a fake runner.
pub trait ShellRunner: Send + Sync {
    fn spawn(&self, ctx: &CancellationToken, cmdline: &str) -> Result<Child>;
}

pub struct SystemShellRunner;

impl ShellRunner for SystemShellRunner {
    fn spawn(&self, ctx: &CancellationToken, cmdline: &str) -> Result<Child> {
        if ctx.is_cancelled() {
            return Err(crate::error::PecoError::Cancelled);
        }
        let shell = env::var("SHELL").unwrap_or_else(|_| "sh".to_string());
        Ok(Command::new(shell)
            .arg("-c")
            .arg(cmdline)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn spawns_and_captures_stdout() {
        let runner = SystemShellRunner;
        let mut child = runner.spawn(&CancellationToken::new(), "echo hello").unwrap();
        let mut out = String::new();
        child.stdout.take().unwrap().read_to_string(&mut out).unwrap();
        child.wait().unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn cancelled_context_refuses_to_spawn() {
        let runner = SystemShellRunner;
        let ctx = CancellationToken::new();
        ctx.cancel();
        assert!(matches!(runner.spawn(&ctx, "echo hello"), Err(crate::error::PecoError::Cancelled)));
    }
}
