//! The `peco` CLI binary: turns the flag surface in `PecoOptions` into a
//! `Config`, a line source, and a real terminal `Screen`, hands them to
//! `Peco::run`, then prints the result.
//!
//! Grounded on the donor's `src/bin/main.rs` (TTY-vs-pipe source selection
//! via `atty`, flag-to-`Config` wiring, process exit-code propagation) and
//! `src/item_collector.rs`'s shell-spawn shape for `--exec`.
use peco::{
    CancellationToken, Config, ConfigReader, LayoutKind, NullConfigReader, OnCancel, Peco, PecoOptions, PecoOutput, Result as PecoResult,
    RunOptions, ShellRunner, SystemShellRunner, TuikitScreen,
};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::exit;

fn main() {
    env_logger::init();

    let matches = PecoOptions::command().get_matches();
    let options = PecoOptions::from_matches(&matches);

    let config = build_config(&options);
    let theme = config.build_theme();
    let (min_height, height) = resolve_height(&config.height);

    let screen = match TuikitScreen::new(min_height, height) {
        Ok(screen) => std::sync::Arc::new(screen),
        Err(err) => fail(&err),
    };

    let reader = match open_reader(&options) {
        Ok(reader) => reader,
        Err(err) => {
            eprintln!("peco: {}", err);
            exit(1);
        }
    };

    let peco = match Peco::new(
        config,
        theme,
        screen,
        reader,
        options.buffer_size,
        options.null,
        options.query.clone().unwrap_or_default(),
    ) {
        Ok(peco) => peco,
        Err(err) => fail(&err),
    };

    if options.initial_index > 0 {
        peco.set_initial_index(options.initial_index);
    }

    let run_opts = RunOptions {
        exit_0: options.exit_0,
        select_1: options.select_1,
        select_all: options.select_all,
    };

    let output = match peco.run(run_opts) {
        Ok(output) => output,
        Err(err) => fail(&err),
    };

    if options.print_query {
        println!("{}", peco.final_query());
    }

    if let Some(cmd) = &options.exec {
        if output.exit_code == 0 {
            if let Err(err) = run_exec(cmd, &output.lines) {
                eprintln!("peco: {}", err);
                exit(1);
            }
            return;
        }
    }

    print_output(&output);
    exit(output.exit_code);
}

fn fail(err: &peco::PecoError) -> ! {
    eprintln!("peco: {}", err);
    exit(1);
}

/// Decode `--rcfile` through the JSON/YAML-agnostic seam (always
/// `Config::default()` here, since this binary doesn't pull in a decoder),
/// then layer the CLI flags on top.
fn build_config(options: &PecoOptions) -> Config {
    let mut config = match &options.rcfile {
        Some(path) => NullConfigReader.read(Path::new(path)).expect("NullConfigReader never fails"),
        None => Config::default(),
    };

    if let Some(prompt) = &options.prompt {
        config.prompt = prompt.clone();
    }
    if let Some(filter) = &options.initial_filter {
        config.initial_filter = filter.clone();
    }
    if let Some(layout) = &options.layout {
        if let Some(kind) = LayoutKind::from_name(layout) {
            config.layout = kind;
        }
    }
    if let Some(on_cancel) = &options.on_cancel {
        config.on_cancel = match on_cancel.as_str() {
            "error" => OnCancel::Error,
            _ => OnCancel::Success,
        };
    }
    if options.ansi {
        config.ansi = true;
    }
    if let Some(height) = &options.height {
        config.height = height.clone();
    }
    if options.selection_prefix.is_some() {
        config.selection_prefix = options.selection_prefix.clone();
    }
    config
}

/// `TuikitScreen` only speaks `TermHeight::Fixed` rows. A literal "N" is
/// used as-is; a trailing "%" has no fixed-row equivalent to convert to
/// without querying the real terminal size, so its number is passed through
/// as a minimum/row count and left for the terminal to clamp.
fn resolve_height(height: &str) -> (usize, usize) {
    let digits = height.strip_suffix('%').unwrap_or(height);
    let rows: usize = digits.parse().unwrap_or(0);
    (0, rows)
}

fn open_reader(options: &PecoOptions) -> io::Result<Box<dyn BufRead + Send>> {
    if let Some(path) = &options.file {
        return Ok(Box::new(BufReader::new(File::open(path)?)));
    }
    if atty::is(atty::Stream::Stdin) {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "no input; pipe lines in or pass a FILE argument"));
    }
    Ok(Box::new(BufReader::new(io::stdin())))
}

fn print_output(output: &PecoOutput) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for line in &output.lines {
        let _ = writeln!(handle, "{}", line);
    }
}

/// Run `--exec CMD` through the shell with the selection piped to its
/// stdin; a literal `{}` in `CMD` is replaced with the selection instead,
/// shell-quoted as a single argument, the way `peco`'s Go original does.
fn run_exec(cmd: &str, lines: &[String]) -> PecoResult<()> {
    let cmdline = if cmd.contains("{}") {
        let quoted = shlex::quote(&lines.join(" "));
        cmd.replace("{}", quoted.as_ref())
    } else {
        cmd.to_string()
    };

    let runner = SystemShellRunner;
    let ctx = CancellationToken::new();
    let mut child = runner.spawn(&ctx, &cmdline)?;

    if let Some(mut stdin) = child.stdin.take() {
        for line in lines {
            let _ = writeln!(stdin, "{}", line);
        }
    }
    if let Some(mut stdout) = child.stdout.take() {
        let mut buf = String::new();
        let _ = stdout.read_to_string(&mut buf);
        print!("{}", buf);
    }
    let _ = child.wait();
    Ok(())
}
