//! Peco: an interactive line-filtering terminal tool. Pipe lines in, type
//! to narrow them down with a live regexp/fuzzy/external filter, select one
//! or more, and get them back on stdout.
//!
//! `Peco` (`peco.rs`) is the orchestrator wiring every other module
//! together; start there. The module layout otherwise mirrors the donor
//! (`lotabout-skim`) component-per-file shape: a source of lines, a match
//! engine family, a selection set, a view/screen split, and an input loop
//! feeding a keymap-driven action dispatcher.
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

mod action;
mod cancellation;
mod config;
mod engine;
mod error;
mod hub;
mod id;
mod input_loop;
mod keymap;
mod layout;
mod line;
mod location;
mod peco;
mod query;
mod registry;
mod screen;
mod selection;
mod shell;
mod source;
mod spinlock;
mod theme;
mod util;
mod view;

#[cfg(feature = "cli")]
mod options;

pub use crate::action::Action;
pub use crate::cancellation::CancellationToken;
pub use crate::config::{Config, ConfigReader, CustomFilterSpec, NullConfigReader, OnCancel, SingleKeyJump};
pub use crate::engine::external::ExternalEngine;
pub use crate::engine::fuzzy::{FuzzyAlgorithm, FuzzyEngine};
pub use crate::engine::regexp::{CaseMatching, RegexEngine};
pub use crate::engine::MatchEngine;
pub use crate::error::{PecoError, Result};
pub use crate::layout::LayoutKind;
pub use crate::peco::{Peco, PecoOutput, RunOptions};
pub use crate::screen::{MouseButtonKind, Screen, ScreenEvent, TuikitScreen};
#[cfg(any(test, feature = "testing"))]
pub use crate::screen::RecordingScreen;
pub use crate::shell::{ShellRunner, SystemShellRunner};
pub use crate::theme::ColorTheme;

#[cfg(feature = "cli")]
pub use crate::options::PecoOptions;
