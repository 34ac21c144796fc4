//! The orchestrator: owns every component's running state, wires the Hub,
//! drives the debounced filter pipeline, and implements `InputHandler` so
//! the input loop can dispatch resolved actions straight into it.
//!
//! Grounded on `Skim::run_with` (`src/lib.rs`) as the overall shape — build
//! the components, spawn the loops, block until done, assemble a result —
//! generalised from skim's single `Model` to peco's explicit component set
//! (Hub, Keymap, Location, Selection, Query/Caret, the buffer family) and
//! its own exit-mode matrix (`--exit-0`/`--select-1`/`--select-all`).
use crate::action::Action;
use crate::cancellation::CancellationToken;
use crate::config::{Config, OnCancel};
use crate::engine::external::ExternalEngine;
use crate::engine::fuzzy::{FuzzyAlgorithm, FuzzyEngine};
use crate::engine::regexp::{CaseMatching, RegexEngine};
use crate::engine::{apply_with_parallelism, MatchEngine};
use crate::error::{PecoError, Result};
use crate::hub::{ClearStatusMsg, DrawMsg, DrawPromptMsg, Hub, HubEvent, StatusMsg};
use crate::id::IdGen;
use crate::input_loop::{self, InputHandler};
use crate::keymap::Keymap;
use crate::layout::LayoutState;
use crate::line::Line;
use crate::location::Location;
use crate::query::{Caret, Query};
use crate::screen::Screen;
use crate::selection::Selection;
use crate::source::{Buffer, ContextBuffer, MemoryBuffer, RingBuffer, DEFAULT_MAX_SCAN_BUFFER_SIZE};
use crate::theme::ColorTheme;
use crate::view;
use chrono::Duration as ChronoDuration;
use std::io::BufRead;
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use timer::Timer;

/// Query-execution debounce interval.
const DEBOUNCE_MS: i64 = 50;
/// Surrounding source lines pulled in on each side of a match when zooming.
const ZOOM_CONTEXT_RADIUS: usize = 3;
/// Cycle order for `RotateMatcher`; falls back to index 0 if the current
/// filter isn't one of these (e.g. a custom filter).
const ROTATION_ORDER: &[&str] = &["SmartCase", "IgnoreCase", "CaseSensitive", "Fuzzy"];

/// Bindings used for any key sequence the config file doesn't mention. Not
/// derived from any donor keymap (skim's own bindings are accept/abort-
/// centric, not Emacs-style editing); chosen to cover every `Action`.
const DEFAULT_BINDINGS: &[(&str, &str)] = &[
    ("C-n", "select-down"),
    ("C-p", "select-up"),
    ("ArrowDown", "select-down"),
    ("ArrowUp", "select-up"),
    ("C-f", "forward-char"),
    ("C-b", "backward-char"),
    ("ArrowRight", "forward-char"),
    ("ArrowLeft", "backward-char"),
    ("M-f", "forward-word"),
    ("M-b", "backward-word"),
    ("C-a", "beginning-of-line"),
    ("C-e", "end-of-line"),
    ("C-d", "delete-forward-char"),
    ("BS", "delete-backward-char"),
    ("C-k", "kill-end-of-line"),
    ("C-u", "kill-beginning-of-line"),
    ("Pgup", "scroll-page-up"),
    ("Pgdn", "scroll-page-down"),
    ("Tab", "toggle-selection-and-select-next"),
    ("C-Space", "toggle-select-mode"),
    ("C-r", "rotate-matcher"),
    ("C-z", "freeze"),
    ("M-z", "unfreeze"),
    ("M-i", "zoom-in"),
    ("M-o", "zoom-out"),
    ("C-l", "refresh"),
    ("Enter", "finish"),
    ("Esc", "cancel"),
    ("C-c", "cancel"),
];

/// Which way `Peco::run` ended, decided by whichever `Action` triggered
/// shutdown.
#[derive(Debug, Clone, Copy)]
enum Outcome {
    Finish,
    Cancel,
}

/// Flags controlling the pre-UI exit-mode matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub exit_0: bool,
    pub select_1: bool,
    pub select_all: bool,
}

/// What `Peco::run` hands back: the selected output lines and the process
/// exit code a caller (the CLI binary) should use.
#[derive(Debug, Clone)]
pub struct PecoOutput {
    pub lines: Vec<String>,
    pub exit_code: i32,
}

/// Stashed state restored by `ZoomOut`.
struct ZoomState {
    prior_frozen: Option<Arc<MemoryBuffer>>,
    prior_matches: Vec<Line>,
    prior_query: String,
    prior_cursor: usize,
}

/// Adapts an in-memory `Vec<Line>` to the `Buffer` trait, for callers (the
/// freeze/zoom actions) that already have a concrete line list and need to
/// hand it to an API expecting `&dyn Buffer`.
struct VecBuffer(Vec<Line>);

impl Buffer for VecBuffer {
    fn size(&self) -> usize {
        self.0.len()
    }

    fn line_at(&self, i: usize) -> Option<Line> {
        self.0.get(i).cloned()
    }
}

/// One debounced query-execution request, handed to the dedicated debounce
/// thread. `peco` is a `Weak` reference so the debounce thread never keeps
/// `Peco` alive on its own: if `Peco` is dropped, `upgrade()` on a pending
/// job simply fails and the job is silently skipped.
struct DebounceJob {
    peco: Weak<Peco>,
    query: String,
    ctx: CancellationToken,
}

/// Map a filter name as it'd appear in config/CLI input (case-insensitive,
/// hyphenated or not) onto its canonical built-in name. Unrecognised names
/// are returned unchanged (preserving a custom filter's configured casing
/// for `Config::custom_filter` lookups).
fn canonical_filter_name(raw: &str) -> String {
    match raw.to_lowercase().as_str() {
        "regexp" => "Regexp".to_string(),
        "iregexp" => "IRegexp".to_string(),
        "ignorecase" | "ignore-case" => "IgnoreCase".to_string(),
        "casesensitive" | "case-sensitive" => "CaseSensitive".to_string(),
        "smartcase" | "smart-case" => "SmartCase".to_string(),
        "fuzzy" => "Fuzzy".to_string(),
        _ => raw.to_string(),
    }
}

/// Whether `filter`+`query` resolve to a case-insensitive match, used to
/// invalidate the refinement cache when `SmartCase`'s effective case flag
/// changes mid-session (open question in SPEC_FULL.md §9).
fn effective_ignore_case(filter: &str, query: &str) -> bool {
    match filter {
        "CaseSensitive" | "Regexp" => false,
        "SmartCase" => !query.chars().any(|c| c.is_uppercase()),
        _ => true,
    }
}

/// Long-lived thread owning the debounce `Timer`/`Guard` as plain local
/// variables: reassigning `guard` on every new job drops (and so cancels)
/// whatever callback was previously scheduled, giving "new query resets
/// the timer, no duplicate job" for free.
fn spawn_debounce_thread(rx: crossbeam::channel::Receiver<DebounceJob>) {
    thread::spawn(move || {
        let timer = Timer::new();
        let mut guard: Option<timer::Guard> = None;
        while let Ok(job) = rx.recv() {
            let DebounceJob { peco, query, ctx } = job;
            guard = Some(timer.schedule_with_delay(ChronoDuration::milliseconds(DEBOUNCE_MS), move || {
                if ctx.is_cancelled() {
                    return;
                }
                if let Some(peco) = peco.upgrade() {
                    peco.execute_query_now(ctx.clone(), query.clone());
                }
            }));
        }
    });
}

/// Owns every running component and the state a key press or filter result
/// mutates. Shared as `Arc<Peco>` across the input-loop thread (which calls
/// `run`), the view thread, and the debounce thread's scheduled callback.
pub struct Peco {
    config: Config,
    theme: ColorTheme,
    screen: Arc<dyn Screen>,
    hub: Hub,
    /// `RefCell`-backed internally (not `Sync`); wrapped in a `Mutex` so
    /// `Peco` itself stays `Sync` and shareable via `Arc` across threads.
    keymap: Mutex<Keymap>,
    self_weak: Mutex<Weak<Peco>>,
    ring: Arc<RingBuffer>,
    frozen: Mutex<Option<Arc<MemoryBuffer>>>,
    zoom: Mutex<Option<ZoomState>>,
    selection: Selection,
    query: Mutex<Query>,
    caret: Mutex<Caret>,
    location: Mutex<Location>,
    layout_state: Mutex<LayoutState>,
    range_start: Mutex<Option<usize>>,
    last_range: Mutex<Option<(usize, usize)>>,
    current_filter: Mutex<String>,
    current_matches: Mutex<Vec<Line>>,
    last_executed_query: Mutex<String>,
    last_executed_filter: Mutex<String>,
    last_case_flag: Mutex<bool>,
    current_query_ctx: Mutex<CancellationToken>,
    root_ctx: CancellationToken,
    outcome: Mutex<Option<Outcome>>,
    error: Mutex<Option<PecoError>>,
    #[allow(dead_code)]
    id_gen: Arc<IdGen>,
    debounce_tx: crossbeam::channel::Sender<DebounceJob>,
    /// Same non-`Sync` `RefCell` situation as `keymap`.
    display_cache: Mutex<view::DisplayCache>,
}

impl Peco {
    /// Build every component and perform the initial full scan (with
    /// `initial_query`, if any) synchronously, so `current_matches` and
    /// `Location` are populated before the first frame is ever drawn.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        theme: ColorTheme,
        screen: Arc<dyn Screen>,
        reader: impl BufRead + Send + 'static,
        buffer_capacity: usize,
        null_separator: bool,
        initial_query: String,
    ) -> Result<Arc<Self>> {
        let id_gen = Arc::new(IdGen::new());
        let registry = config.build_registry()?;
        let keymap = config.build_keymap(&registry, DEFAULT_BINDINGS)?;
        let initial_filter = config.initial_filter.clone();

        let max_scan = if config.max_scan_buffer_size > 0 {
            config.max_scan_buffer_size
        } else {
            DEFAULT_MAX_SCAN_BUFFER_SIZE
        };
        let id_gen_for_source = id_gen.clone();
        let ring = RingBuffer::new(reader, buffer_capacity, null_separator, max_scan, config.ansi, move || {
            id_gen_for_source.next_id()
        });
        ring.setup();

        let (width, height) = screen.size();
        let layout_state = LayoutState::compute(config.layout, width, height);
        let location = Location::new(layout_state.per_page, config.layout.sort_top_down());

        let mut query = Query::new();
        query.set(&initial_query);
        let mut caret = Caret::new();
        caret.set_pos(query.len());

        let (debounce_tx, debounce_rx) = crossbeam::channel::unbounded();

        let peco = Arc::new(Peco {
            config,
            theme,
            screen,
            hub: Hub::new(),
            keymap: Mutex::new(keymap),
            self_weak: Mutex::new(Weak::new()),
            ring,
            frozen: Mutex::new(None),
            zoom: Mutex::new(None),
            selection: Selection::new(),
            query: Mutex::new(query),
            caret: Mutex::new(caret),
            location: Mutex::new(location),
            layout_state: Mutex::new(layout_state),
            range_start: Mutex::new(None),
            last_range: Mutex::new(None),
            current_filter: Mutex::new(initial_filter),
            current_matches: Mutex::new(Vec::new()),
            last_executed_query: Mutex::new(String::new()),
            last_executed_filter: Mutex::new(String::new()),
            last_case_flag: Mutex::new(true),
            current_query_ctx: Mutex::new(CancellationToken::new()),
            root_ctx: CancellationToken::new(),
            outcome: Mutex::new(None),
            error: Mutex::new(None),
            id_gen,
            debounce_tx,
            display_cache: Mutex::new(view::DisplayCache::new()),
        });

        *peco.self_weak.lock().expect("self_weak mutex poisoned") = Arc::downgrade(&peco);
        spawn_debounce_thread(debounce_rx);

        let first_ctx = peco.new_query_context();
        let first_query = peco.query.lock().expect("query mutex poisoned").string();
        peco.execute_query_now(first_ctx, first_query);

        Ok(peco)
    }

    /// The query text as it stood when the session ended, for callers
    /// implementing `--print-query`.
    pub fn final_query(&self) -> String {
        self.query.lock().expect("query mutex poisoned").string()
    }

    /// Place the cursor at an absolute match index (`--initial-index`),
    /// clamped to the matches produced by the initial scan.
    pub fn set_initial_index(&self, index: usize) {
        let mut loc = self.location.lock().expect("location mutex poisoned");
        loc.set_cursor(index);
    }

    /// Run the exit-mode matrix, then (if none fired) bring up the screen
    /// and block until the user finishes or cancels. Returns the selected
    /// output lines and the exit code the caller should use.
    pub fn run(self: &Arc<Self>, opts: RunOptions) -> Result<PecoOutput> {
        let total = self.ring.size();
        if opts.exit_0 && total == 0 && self.ring.is_complete() {
            return Ok(PecoOutput { lines: Vec::new(), exit_code: 1 });
        }
        if opts.select_1 && self.ring.is_complete() && total == 1 {
            let line = self.ring.line_at(0).expect("size() just reported 1");
            return Ok(PecoOutput {
                lines: vec![line.output().to_string()],
                exit_code: 0,
            });
        }
        if opts.select_all {
            for i in 0..total {
                if let Some(line) = self.ring.line_at(i) {
                    self.selection.add(line);
                }
            }
            let mut lines = Vec::new();
            self.selection.ascend(|l| lines.push(l.output().to_string()));
            return Ok(PecoOutput { lines, exit_code: 0 });
        }

        self.screen.init()?;
        let view_handle = self.spawn_view_thread();
        let _ = self.hub.send_draw(DrawMsg);

        {
            let keymap_guard = self.keymap.lock().expect("keymap mutex poisoned");
            input_loop::run(self.screen.as_ref(), &keymap_guard, &**self, &self.root_ctx)?;
        }

        self.shutdown();
        let _ = view_handle.join();
        self.screen.close()?;

        if let Some(err) = self.error.lock().expect("error mutex poisoned").take() {
            if !matches!(err, PecoError::Cancelled) {
                return Err(err);
            }
        }

        let outcome = self.outcome.lock().expect("outcome mutex poisoned").take().unwrap_or(Outcome::Cancel);
        let lines = match outcome {
            Outcome::Finish => self.collect_output(),
            Outcome::Cancel => Vec::new(),
        };
        let exit_code = match outcome {
            Outcome::Finish => 0,
            Outcome::Cancel => {
                if self.config.on_cancel == OnCancel::Error {
                    1
                } else {
                    0
                }
            }
        };
        Ok(PecoOutput { lines, exit_code })
    }

    fn active_buffer(&self) -> Arc<dyn Buffer> {
        if let Some(frozen) = self.frozen.lock().expect("frozen mutex poisoned").clone() {
            return frozen as Arc<dyn Buffer>;
        }
        self.ring.clone() as Arc<dyn Buffer>
    }

    fn new_query_context(&self) -> CancellationToken {
        let mut guard = self.current_query_ctx.lock().expect("current_query_ctx mutex poisoned");
        guard.cancel();
        let child = self.root_ctx.child();
        *guard = child.clone();
        child
    }

    /// Re-run the current query synchronously over whatever buffer is
    /// active, bypassing the debounce thread. Used by actions (Freeze,
    /// Unfreeze, RotateMatcher, ZoomIn, ZoomOut) that need the result
    /// immediately rather than after a keystroke settles.
    fn requery_now(&self) {
        let query_str = self.query.lock().expect("query mutex poisoned").string();
        let ctx = self.new_query_context();
        self.execute_query_now(ctx, query_str);
    }

    /// Build and apply the engine named by `filter_name` over `lines`.
    /// `Fuzzy` is special-cased so `FuzzyEngine::sort_batch` (not part of
    /// the `MatchEngine` trait) can be applied after matching.
    fn run_filter(&self, ctx: &CancellationToken, filter_name: &str, query: &str, lines: &[Line]) -> Result<Vec<Line>> {
        let canonical = canonical_filter_name(filter_name);
        if canonical == "Fuzzy" {
            let engine = FuzzyEngine::builder()
                .query(query)
                .case(CaseMatching::Smart)
                .algorithm(FuzzyAlgorithm::SkimV2)
                .longest_sort(self.config.fuzzy_longest_sort)
                .build();
            let chunk_size = lines.len().max(1);
            let mut matched = Vec::new();
            apply_with_parallelism(&engine, ctx, lines, chunk_size, &mut |l| matched.push(l))?;
            engine.sort_batch(&mut matched);
            return Ok(matched);
        }

        let engine = self.build_engine(&canonical, filter_name, query)?;
        let chunk_size = if engine.buf_size() > 0 { engine.buf_size() } else { lines.len().max(1) };
        let mut matched = Vec::new();
        apply_with_parallelism(engine.as_ref(), ctx, lines, chunk_size, &mut |l| matched.push(l))?;
        Ok(matched)
    }

    fn build_engine(&self, canonical: &str, raw_name: &str, query: &str) -> Result<Box<dyn MatchEngine>> {
        Ok(match canonical {
            "Regexp" => Box::new(RegexEngine::builder().query(query).case(CaseMatching::Respect).build()),
            "IgnoreCase" | "IRegexp" => Box::new(RegexEngine::builder().query(query).case(CaseMatching::Ignore).build()),
            "CaseSensitive" => Box::new(RegexEngine::builder().query(query).case(CaseMatching::Respect).build()),
            "SmartCase" => Box::new(RegexEngine::builder().query(query).case(CaseMatching::Smart).build()),
            _ => {
                let spec = self
                    .config
                    .custom_filter
                    .get(raw_name)
                    .ok_or_else(|| PecoError::Config(format!("unknown filter \"{}\"", raw_name)))?;
                let cmdline = if spec.args.is_empty() {
                    spec.cmd.clone()
                } else {
                    format!("{} {}", spec.cmd, spec.args.join(" "))
                };
                Box::new(ExternalEngine::new(cmdline, query))
            }
        })
    }

    /// Execute `query_str` now: refine over the previous result set when
    /// possible, otherwise rescan the active buffer. On success, publishes
    /// the new matches and asks the view to redraw. `Cancelled` is routine
    /// and ignored; `CompileError` posts a status message and leaves
    /// `current_matches`/`last_executed_query` untouched; anything else
    /// records the error and shuts down.
    fn execute_query_now(&self, ctx: CancellationToken, query_str: String) {
        if ctx.is_cancelled() {
            return;
        }
        let filter_name = self.current_filter.lock().expect("current_filter mutex poisoned").clone();
        let prev_query = self.last_executed_query.lock().expect("last_executed_query mutex poisoned").clone();
        let case_now = effective_ignore_case(&canonical_filter_name(&filter_name), &query_str);
        let filter_unchanged = *self.last_executed_filter.lock().expect("last_executed_filter mutex poisoned") == filter_name;
        let case_unchanged = *self.last_case_flag.lock().expect("last_case_flag mutex poisoned") == case_now;
        let refine = filter_unchanged && case_unchanged && crate::query::is_refinement(&prev_query, &query_str);

        let source_lines: Vec<Line> = if refine {
            self.current_matches.lock().expect("current_matches mutex poisoned").clone()
        } else {
            let buf = self.active_buffer();
            (0..buf.size()).filter_map(|i| buf.line_at(i)).collect()
        };

        match self.run_filter(&ctx, &filter_name, &query_str, &source_lines) {
            Ok(matched) => {
                if ctx.is_cancelled() {
                    return;
                }
                let total = matched.len();
                *self.current_matches.lock().expect("current_matches mutex poisoned") = matched;
                *self.last_executed_query.lock().expect("last_executed_query mutex poisoned") = query_str;
                *self.last_executed_filter.lock().expect("last_executed_filter mutex poisoned") = filter_name;
                *self.last_case_flag.lock().expect("last_case_flag mutex poisoned") = case_now;
                self.location.lock().expect("location mutex poisoned").set_total(total);
                self.display_cache.lock().expect("display_cache mutex poisoned").invalidate();
                let _ = self.hub.send_draw(DrawMsg);
            }
            Err(PecoError::Cancelled) => {}
            Err(PecoError::CompileError(e)) => {
                // Malformed query: show it, keep the previous results and
                // cursor in place, don't tear down the session.
                if !self.config.suppress_status_msg {
                    let _ = self.hub.send_status(StatusMsg {
                        text: format!("compile error: {}", e),
                    });
                }
            }
            Err(err) => {
                self.set_error(err);
                self.shutdown();
            }
        }
    }

    fn set_error(&self, err: PecoError) {
        let mut guard = self.error.lock().expect("error mutex poisoned");
        if guard.is_none() {
            *guard = Some(err);
        }
    }

    /// Cancel the root context and nudge the Hub with a real message so the
    /// view thread's blocked `select()` wakes up and re-checks cancellation
    /// on its next loop iteration.
    fn shutdown(&self) {
        self.root_ctx.cancel();
        let _ = self.hub.send_clear_status(ClearStatusMsg);
    }

    fn current_per_page(&self) -> usize {
        self.layout_state.lock().expect("layout_state mutex poisoned").per_page
    }

    fn current_line(&self) -> Option<Line> {
        let matches = self.current_matches.lock().expect("current_matches mutex poisoned");
        let loc = self.location.lock().expect("location mutex poisoned");
        matches.get(loc.line_number).cloned()
    }

    /// Falls back to the line under the cursor when nothing is explicitly
    /// selected (matches the literal "Finish without selection" scenario).
    fn collect_output(&self) -> Vec<String> {
        if self.selection.is_empty() {
            return match self.current_line() {
                Some(line) => vec![line.output().to_string()],
                None => Vec::new(),
            };
        }
        let mut out = Vec::new();
        self.selection.ascend(|l| out.push(l.output().to_string()));
        out
    }

    fn move_vertical(&self, delta: isize) {
        let new_line = {
            let mut loc = self.location.lock().expect("location mutex poisoned");
            loc.move_cursor(delta);
            loc.line_number
        };
        if self.range_start.lock().expect("range_start mutex poisoned").is_some() {
            self.apply_range_mode(new_line);
        }
        let _ = self.hub.send_draw(DrawMsg);
    }

    /// Add every match between the anchor and `new_line_number` to the
    /// selection, and drop any that were in the previous range but fell out
    /// of the new one.
    fn apply_range_mode(&self, new_line_number: usize) {
        let start = match *self.range_start.lock().expect("range_start mutex poisoned") {
            Some(s) => s,
            None => return,
        };
        let (lo, hi) = (start.min(new_line_number), start.max(new_line_number));
        let prev_range = *self.last_range.lock().expect("last_range mutex poisoned");
        let matches = self.current_matches.lock().expect("current_matches mutex poisoned");
        for (i, line) in matches.iter().enumerate() {
            if i >= lo && i <= hi {
                self.selection.add(line.clone());
            } else if let Some((prev_lo, prev_hi)) = prev_range {
                if i >= prev_lo && i <= prev_hi {
                    self.selection.remove(line.id());
                }
            }
        }
        *self.last_range.lock().expect("last_range mutex poisoned") = Some((lo, hi));
    }

    fn toggle_range_mode(&self) {
        let mut range_start = self.range_start.lock().expect("range_start mutex poisoned");
        if range_start.is_some() {
            *range_start = None;
        } else {
            *range_start = Some(self.location.lock().expect("location mutex poisoned").line_number);
        }
        *self.last_range.lock().expect("last_range mutex poisoned") = None;
    }

    fn toggle_current_selection(&self) {
        if let Some(line) = self.current_line() {
            if self.selection.has(line.id()) {
                self.selection.remove(line.id());
            } else {
                self.selection.add(line);
            }
        }
        let _ = self.hub.send_draw(DrawMsg);
    }

    fn move_caret_word(&self, dir: isize) {
        let runes = self.query.lock().expect("query mutex poisoned").rune_slice().to_vec();
        let mut caret = self.caret.lock().expect("caret mutex poisoned");
        let mut pos = caret.pos() as isize;
        let len = runes.len() as isize;
        if dir > 0 {
            while pos < len && runes[pos as usize].is_whitespace() {
                pos += 1;
            }
            while pos < len && !runes[pos as usize].is_whitespace() {
                pos += 1;
            }
        } else {
            while pos > 0 && runes[(pos - 1) as usize].is_whitespace() {
                pos -= 1;
            }
            while pos > 0 && !runes[(pos - 1) as usize].is_whitespace() {
                pos -= 1;
            }
        }
        caret.set_pos(pos.max(0) as usize);
    }

    fn rotate_matcher(&self) {
        let next = {
            let current = self.current_filter.lock().expect("current_filter mutex poisoned");
            let canonical = canonical_filter_name(&current);
            let idx = ROTATION_ORDER.iter().position(|&n| n == canonical).unwrap_or(0);
            ROTATION_ORDER[(idx + 1) % ROTATION_ORDER.len()]
        };
        *self.current_filter.lock().expect("current_filter mutex poisoned") = next.to_string();
        *self.last_executed_query.lock().expect("last_executed_query mutex poisoned") = String::new();
        if !self.config.suppress_status_msg {
            let _ = self.hub.send_status(StatusMsg { text: format!("matcher: {}", next) });
        }
        self.requery_now();
    }

    fn freeze(&self) {
        let matches = self.current_matches.lock().expect("current_matches mutex poisoned").clone();
        let snapshot = MemoryBuffer::snapshot(&VecBuffer(matches));
        *self.frozen.lock().expect("frozen mutex poisoned") = Some(Arc::new(snapshot));
        *self.last_executed_query.lock().expect("last_executed_query mutex poisoned") = String::new();
        if !self.config.suppress_status_msg {
            let _ = self.hub.send_status(StatusMsg { text: "frozen".to_string() });
        }
    }

    fn unfreeze(&self) {
        *self.frozen.lock().expect("frozen mutex poisoned") = None;
        *self.last_executed_query.lock().expect("last_executed_query mutex poisoned") = String::new();
        let _ = self.hub.send_clear_status(ClearStatusMsg);
        self.requery_now();
    }

    fn zoom_in(&self) {
        if self.zoom.lock().expect("zoom mutex poisoned").is_some() {
            return;
        }
        let matches = self.current_matches.lock().expect("current_matches mutex poisoned").clone();
        let filtered = VecBuffer(matches.clone());
        let context = ContextBuffer::build(&filtered, self.ring.as_ref(), ZOOM_CONTEXT_RADIUS);
        let expanded: Vec<Line> = (0..context.size()).filter_map(|i| context.line_at(i)).collect();

        let cursor = self.location.lock().expect("location mutex poisoned").line_number;
        let new_cursor = context.match_entry_indices().get(cursor).copied().unwrap_or(0);

        let prior_frozen = self.frozen.lock().expect("frozen mutex poisoned").clone();
        let prior_query = self.query.lock().expect("query mutex poisoned").string();

        *self.frozen.lock().expect("frozen mutex poisoned") = Some(Arc::new(MemoryBuffer::snapshot(&VecBuffer(expanded.clone()))));
        *self.current_matches.lock().expect("current_matches mutex poisoned") = expanded.clone();
        *self.last_executed_query.lock().expect("last_executed_query mutex poisoned") = String::new();
        {
            let mut loc = self.location.lock().expect("location mutex poisoned");
            loc.set_total(expanded.len());
            loc.line_number = new_cursor;
        }
        *self.zoom.lock().expect("zoom mutex poisoned") = Some(ZoomState {
            prior_frozen,
            prior_matches: matches,
            prior_query,
            prior_cursor: cursor,
        });
        self.display_cache.lock().expect("display_cache mutex poisoned").invalidate();
        if !self.config.suppress_status_msg {
            let _ = self.hub.send_status(StatusMsg { text: "zoomed in".to_string() });
        }
        let _ = self.hub.send_draw(DrawMsg);
    }

    fn zoom_out(&self) {
        let state = match self.zoom.lock().expect("zoom mutex poisoned").take() {
            Some(s) => s,
            None => return,
        };
        *self.frozen.lock().expect("frozen mutex poisoned") = state.prior_frozen;
        let total = state.prior_matches.len();
        *self.current_matches.lock().expect("current_matches mutex poisoned") = state.prior_matches;
        self.query.lock().expect("query mutex poisoned").set(&state.prior_query);
        self.caret.lock().expect("caret mutex poisoned").set_pos(state.prior_query.chars().count());
        *self.last_executed_query.lock().expect("last_executed_query mutex poisoned") = String::new();
        {
            let mut loc = self.location.lock().expect("location mutex poisoned");
            loc.set_total(total);
            loc.line_number = state.prior_cursor;
        }
        self.display_cache.lock().expect("display_cache mutex poisoned").invalidate();
        let _ = self.hub.send_clear_status(ClearStatusMsg);
        let _ = self.hub.send_draw(DrawMsg);
    }

    fn apply_action(&self, action: Action) {
        match action {
            Action::ForwardChar => {
                let len = self.query.lock().expect("query mutex poisoned").len();
                let mut caret = self.caret.lock().expect("caret mutex poisoned");
                caret.move_by(1);
                caret.clamp(len);
            }
            Action::BackwardChar => self.caret.lock().expect("caret mutex poisoned").move_by(-1),
            Action::ForwardWord => self.move_caret_word(1),
            Action::BackwardWord => self.move_caret_word(-1),
            Action::BeginningOfLine => self.caret.lock().expect("caret mutex poisoned").set_pos(0),
            Action::EndOfLine => {
                let len = self.query.lock().expect("query mutex poisoned").len();
                self.caret.lock().expect("caret mutex poisoned").set_pos(len);
            }
            Action::DeleteForwardChar => {
                let pos = self.caret.lock().expect("caret mutex poisoned").pos();
                self.query.lock().expect("query mutex poisoned").delete_range(pos, pos + 1);
                self.on_query_changed();
            }
            Action::DeleteBackwardChar => {
                let mut caret = self.caret.lock().expect("caret mutex poisoned");
                if caret.pos() > 0 {
                    self.query.lock().expect("query mutex poisoned").delete_range(caret.pos() - 1, caret.pos());
                    caret.move_by(-1);
                }
                drop(caret);
                self.on_query_changed();
            }
            Action::KillEndOfLine => {
                let pos = self.caret.lock().expect("caret mutex poisoned").pos();
                let mut query = self.query.lock().expect("query mutex poisoned");
                let len = query.len();
                query.delete_range(pos, len);
                drop(query);
                self.on_query_changed();
            }
            Action::KillBeginningOfLine => {
                let pos = self.caret.lock().expect("caret mutex poisoned").pos();
                self.query.lock().expect("query mutex poisoned").delete_range(0, pos);
                self.caret.lock().expect("caret mutex poisoned").set_pos(0);
                self.on_query_changed();
            }
            Action::DeleteAll => {
                self.query.lock().expect("query mutex poisoned").reset();
                self.caret.lock().expect("caret mutex poisoned").set_pos(0);
                self.on_query_changed();
            }
            Action::SelectUp => self.move_vertical(-1),
            Action::SelectDown => self.move_vertical(1),
            Action::ScrollPageUp => self.move_vertical(-(self.current_per_page() as isize)),
            Action::ScrollPageDown => self.move_vertical(self.current_per_page() as isize),
            Action::ScrollLeft => {
                let width = self.screen.size().0;
                self.location.lock().expect("location mutex poisoned").scroll_horizontal(width, -1);
                let _ = self.hub.send_draw(DrawMsg);
            }
            Action::ScrollRight => {
                let width = self.screen.size().0;
                self.location.lock().expect("location mutex poisoned").scroll_horizontal(width, 1);
                let _ = self.hub.send_draw(DrawMsg);
            }
            Action::ToggleSelection => self.toggle_current_selection(),
            Action::ToggleSelectionAndSelectNext => {
                self.toggle_current_selection();
                self.move_vertical(1);
            }
            Action::SelectAll => {
                let matches = self.current_matches.lock().expect("current_matches mutex poisoned").clone();
                for line in matches {
                    self.selection.add(line);
                }
                let _ = self.hub.send_draw(DrawMsg);
            }
            Action::SelectNone => {
                self.selection.reset();
                let _ = self.hub.send_draw(DrawMsg);
            }
            Action::ToggleSelectMode => self.toggle_range_mode(),
            Action::RotateMatcher => self.rotate_matcher(),
            Action::Freeze => self.freeze(),
            Action::Unfreeze => self.unfreeze(),
            Action::ZoomIn => self.zoom_in(),
            Action::ZoomOut => self.zoom_out(),
            Action::Refresh => {
                self.display_cache.lock().expect("display_cache mutex poisoned").invalidate();
                let _ = self.hub.send_draw(DrawMsg);
            }
            Action::Finish => {
                *self.outcome.lock().expect("outcome mutex poisoned") = Some(Outcome::Finish);
                self.shutdown();
            }
            Action::Cancel => {
                *self.outcome.lock().expect("outcome mutex poisoned") = Some(Outcome::Cancel);
                self.shutdown();
            }
        }
    }

    fn on_query_changed(&self) {
        let query_str = self.query.lock().expect("query mutex poisoned").string();
        let ctx = self.new_query_context();
        let peco_weak = self.self_weak.lock().expect("self_weak mutex poisoned").clone();
        let _ = self.debounce_tx.send(DebounceJob { peco: peco_weak, query: query_str, ctx });
        let _ = self.hub.send_draw_prompt(DrawPromptMsg);
    }

    fn spawn_view_thread(self: &Arc<Self>) -> thread::JoinHandle<()> {
        let peco = Arc::clone(self);
        thread::spawn(move || loop {
            if peco.root_ctx.is_cancelled() {
                return;
            }
            match peco.hub.select() {
                Ok(event) => peco.handle_hub_event(event),
                Err(_) => return,
            }
        })
    }

    fn handle_hub_event(&self, event: HubEvent) {
        match event {
            HubEvent::Draw(envelope) => {
                self.render();
                envelope.ack();
            }
            HubEvent::DrawPrompt(envelope) => {
                self.render_prompt();
                envelope.ack();
            }
            HubEvent::Query(envelope) => envelope.ack(),
            HubEvent::Paging(envelope) => envelope.ack(),
            HubEvent::Status(envelope) => {
                let text = envelope.payload().text.clone();
                envelope.ack();
                self.render_status(&text);
            }
            HubEvent::ClearStatus(envelope) => {
                envelope.ack();
                self.render();
            }
        }
    }

    fn render(&self) {
        if self.root_ctx.is_cancelled() {
            return;
        }
        let state = *self.layout_state.lock().expect("layout_state mutex poisoned");
        let query = self.query.lock().expect("query mutex poisoned").clone();
        let caret = *self.caret.lock().expect("caret mutex poisoned");
        let loc = *self.location.lock().expect("location mutex poisoned");
        let matches = self.current_matches.lock().expect("current_matches mutex poisoned");
        let start = loc.offset.min(matches.len());
        let end = (start + state.per_page).min(matches.len());
        let page: Vec<Line> = matches[start..end].to_vec();
        let current_id = matches.get(loc.line_number).map(|l| l.id());
        drop(matches);

        view::draw_prompt(self.screen.as_ref(), &self.theme, &state, &self.config.prompt, &query, &caret);
        let cache = self.display_cache.lock().expect("display_cache mutex poisoned");
        view::draw_list(
            self.screen.as_ref(),
            &self.theme,
            &state,
            &page,
            current_id,
            &self.selection,
            &cache,
            false,
            self.config.selection_prefix.as_deref(),
        );
        drop(cache);
        let _ = self.screen.flush();
    }

    fn render_prompt(&self) {
        if self.root_ctx.is_cancelled() {
            return;
        }
        let state = *self.layout_state.lock().expect("layout_state mutex poisoned");
        let query = self.query.lock().expect("query mutex poisoned").clone();
        let caret = *self.caret.lock().expect("caret mutex poisoned");
        view::draw_prompt(self.screen.as_ref(), &self.theme, &state, &self.config.prompt, &query, &caret);
        let _ = self.screen.flush();
    }

    fn render_status(&self, text: &str) {
        if self.root_ctx.is_cancelled() {
            return;
        }
        let state = *self.layout_state.lock().expect("layout_state mutex poisoned");
        view::draw_status(self.screen.as_ref(), &self.theme, &state, text);
        let _ = self.screen.flush();
    }
}

impl InputHandler for Peco {
    fn on_char(&self, ch: char) {
        let mut query = self.query.lock().expect("query mutex poisoned");
        let mut caret = self.caret.lock().expect("caret mutex poisoned");
        query.insert_at(ch, caret.pos());
        caret.move_by(1);
        drop(query);
        drop(caret);
        self.on_query_changed();
    }

    fn on_actions(&self, actions: Vec<Action>) {
        for action in actions {
            self.apply_action(action);
        }
    }

    fn on_resize(&self, width: usize, height: usize) {
        let kind = self.layout_state.lock().expect("layout_state mutex poisoned").kind;
        let new_state = LayoutState::compute(kind, width, height);
        *self.layout_state.lock().expect("layout_state mutex poisoned") = new_state;
        self.location.lock().expect("location mutex poisoned").set_per_page(new_state.per_page);
        self.display_cache.lock().expect("display_cache mutex poisoned").invalidate();
        let _ = self.hub.send_draw(DrawMsg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::RecordingScreen;
    use std::io::Cursor;
    use tuikit::key::Key;

    fn build_peco(input: &str, initial_query: &str) -> Arc<Peco> {
        let screen = Arc::new(RecordingScreen::new(80, 24));
        let reader = Cursor::new(input.to_string());
        Peco::new(Config::default(), ColorTheme::dark256(), screen, reader, 0, false, initial_query.to_string()).unwrap()
    }

    #[test]
    fn query_from_construction_filters_and_finish_outputs_selection() {
        let screen = Arc::new(RecordingScreen::new(80, 24));
        screen.push_event(crate::screen::ScreenEvent::Key(Key::Tab));
        screen.push_event(crate::screen::ScreenEvent::Key(Key::Enter));
        let reader = Cursor::new("alpha\nbravo\ncharlie\n".to_string());
        let peco = Peco::new(Config::default(), ColorTheme::dark256(), screen, reader, 0, false, "r".to_string()).unwrap();
        let output = peco.run(RunOptions::default()).unwrap();
        assert_eq!(output.lines, vec!["bravo".to_string()]);
        assert_eq!(output.exit_code, 0);
    }

    #[test]
    fn finish_without_selection_outputs_the_current_line() {
        let screen = Arc::new(RecordingScreen::new(80, 24));
        screen.push_event(crate::screen::ScreenEvent::Key(Key::Enter));
        let reader = Cursor::new("alpha\nbravo\ncharlie\n".to_string());
        let peco = Peco::new(Config::default(), ColorTheme::dark256(), screen, reader, 0, false, String::new()).unwrap();
        let output = peco.run(RunOptions::default()).unwrap();
        assert_eq!(output.lines, vec!["alpha".to_string()]);
    }

    #[test]
    fn cancel_with_no_selection_outputs_nothing() {
        let screen = Arc::new(RecordingScreen::new(80, 24));
        screen.push_event(crate::screen::ScreenEvent::Key(Key::ESC));
        let reader = Cursor::new("alpha\nbravo\n".to_string());
        let peco = Peco::new(Config::default(), ColorTheme::dark256(), screen, reader, 0, false, String::new()).unwrap();
        let output = peco.run(RunOptions::default()).unwrap();
        assert!(output.lines.is_empty());
        assert_eq!(output.exit_code, 0);
    }

    #[test]
    fn cancel_with_a_selection_still_outputs_nothing() {
        let screen = Arc::new(RecordingScreen::new(80, 24));
        screen.push_event(crate::screen::ScreenEvent::Key(Key::Tab));
        screen.push_event(crate::screen::ScreenEvent::Key(Key::ESC));
        let reader = Cursor::new("alpha\nbravo\n".to_string());
        let peco = Peco::new(Config::default(), ColorTheme::dark256(), screen, reader, 0, false, String::new()).unwrap();
        let output = peco.run(RunOptions::default()).unwrap();
        assert!(output.lines.is_empty(), "a prior selection must never reach stdout on Cancel");
        assert_eq!(output.exit_code, 0);
    }

    #[test]
    fn malformed_regex_query_keeps_previous_results_and_does_not_shut_down() {
        let config = Config {
            initial_filter: "regexp".to_string(),
            ..Config::default()
        };
        let screen = Arc::new(RecordingScreen::new(80, 24));
        let reader = Cursor::new("alpha\nbravo\ncharlie\n".to_string());
        let peco = Peco::new(config, ColorTheme::dark256(), screen, reader, 0, false, "a".to_string()).unwrap();
        let before: Vec<u64> = peco.current_matches.lock().unwrap().iter().map(|l| l.id()).collect();
        assert!(!before.is_empty());

        peco.query.lock().unwrap().set("(unclosed");
        peco.requery_now();

        let after: Vec<u64> = peco.current_matches.lock().unwrap().iter().map(|l| l.id()).collect();
        assert_eq!(after, before, "previous results must survive a compile error");
        assert_eq!(*peco.last_executed_query.lock().unwrap(), "a", "last_executed_query must not advance past a failed compile");
        assert!(peco.error.lock().unwrap().is_none(), "a compile error must not be recorded as a fatal error");
        assert!(!peco.root_ctx.is_cancelled(), "a compile error must not shut down the session");
    }

    #[test]
    fn freeze_then_unfreeze_round_trips_through_full_source() {
        let peco = build_peco("foo1\nfoo2\nbar\n", "foo");
        assert_eq!(peco.current_matches.lock().unwrap().len(), 2);

        peco.freeze();
        assert_eq!(peco.frozen.lock().unwrap().as_ref().unwrap().size(), 2);

        peco.query.lock().unwrap().set("x");
        peco.requery_now();
        assert_eq!(peco.current_matches.lock().unwrap().len(), 0, "frozen set has no \"x\"");

        peco.unfreeze();
        peco.query.lock().unwrap().set("bar");
        peco.requery_now();
        assert_eq!(peco.current_matches.lock().unwrap().len(), 1, "unfrozen query runs over the full source again");
    }

    #[test]
    fn range_mode_extends_and_shrinks_selection_on_cursor_move() {
        let peco = build_peco("a\nb\nc\nd\n", "");
        assert_eq!(peco.current_matches.lock().unwrap().len(), 4);
        let ids: Vec<u64> = peco.current_matches.lock().unwrap().iter().map(|l| l.id()).collect();

        peco.toggle_range_mode();
        peco.move_vertical(2);
        assert_eq!(peco.selection.len(), 3);

        peco.move_vertical(-1);
        assert_eq!(peco.selection.len(), 2);
        assert!(!peco.selection.has(ids[2]));
    }

    #[test]
    fn rotate_matcher_cycles_through_the_fixed_order() {
        let peco = build_peco("x\n", "");
        assert_eq!(*peco.current_filter.lock().unwrap(), "fuzzy");

        peco.rotate_matcher();
        assert_eq!(*peco.current_filter.lock().unwrap(), "SmartCase");
        peco.rotate_matcher();
        assert_eq!(*peco.current_filter.lock().unwrap(), "IgnoreCase");
        peco.rotate_matcher();
        assert_eq!(*peco.current_filter.lock().unwrap(), "CaseSensitive");
        peco.rotate_matcher();
        assert_eq!(*peco.current_filter.lock().unwrap(), "Fuzzy");
    }
}
