//! The CLI flag surface, parsed with `clap`'s builder API the way the
//! donor's own `src/bin/main.rs`/`src/options.rs` do for `sk`. Gated behind
//! the `cli` feature since `clap` is an optional dependency.
#![cfg(feature = "cli")]
use clap::{Arg, ArgMatches, Command};

#[derive(Debug, Clone)]
pub struct PecoOptions {
    pub file: Option<String>,
    pub query: Option<String>,
    pub rcfile: Option<String>,
    pub buffer_size: usize,
    pub null: bool,
    pub initial_index: usize,
    pub initial_filter: Option<String>,
    pub prompt: Option<String>,
    pub layout: Option<String>,
    pub select_1: bool,
    pub exit_0: bool,
    pub select_all: bool,
    pub on_cancel: Option<String>,
    pub selection_prefix: Option<String>,
    pub exec: Option<String>,
    pub print_query: bool,
    pub color: Option<String>,
    pub ansi: bool,
    pub height: Option<String>,
}

impl Default for PecoOptions {
    fn default() -> Self {
        PecoOptions {
            file: None,
            query: None,
            rcfile: None,
            buffer_size: 0,
            null: false,
            initial_index: 0,
            initial_filter: None,
            prompt: None,
            layout: None,
            select_1: false,
            exit_0: false,
            select_all: false,
            on_cancel: None,
            selection_prefix: None,
            exec: None,
            print_query: false,
            color: None,
            ansi: false,
            height: None,
        }
    }
}

impl PecoOptions {
    pub fn command() -> Command<'static> {
        Command::new("peco")
            .about("Interactive line-filtering terminal tool")
            .arg(Arg::new("file").index(1))
            .arg(Arg::new("query").long("query").takes_value(true))
            .arg(Arg::new("rcfile").long("rcfile").takes_value(true))
            .arg(Arg::new("buffer-size").short('b').long("buffer-size").takes_value(true))
            .arg(Arg::new("null").long("null"))
            .arg(Arg::new("initial-index").long("initial-index").takes_value(true))
            .arg(Arg::new("initial-filter").long("initial-filter").takes_value(true))
            .arg(Arg::new("prompt").long("prompt").takes_value(true))
            .arg(
                Arg::new("layout")
                    .long("layout")
                    .takes_value(true)
                    .possible_values(["top-down", "bottom-up", "top-down-query-bottom"]),
            )
            .arg(Arg::new("select-1").long("select-1"))
            .arg(Arg::new("exit-0").long("exit-0"))
            .arg(Arg::new("select-all").long("select-all"))
            .arg(Arg::new("on-cancel").long("on-cancel").takes_value(true).possible_values(["success", "error"]))
            .arg(Arg::new("selection-prefix").long("selection-prefix").takes_value(true))
            .arg(Arg::new("exec").long("exec").takes_value(true))
            .arg(Arg::new("print-query").long("print-query"))
            .arg(Arg::new("color").long("color").takes_value(true).possible_values(["auto", "none"]))
            .arg(Arg::new("ansi").long("ansi"))
            .arg(Arg::new("height").long("height").takes_value(true))
            .version(env!("CARGO_PKG_VERSION"))
    }

    pub fn from_matches(matches: &ArgMatches) -> PecoOptions {
        let ansi = matches.is_present("ansi");
        PecoOptions {
            file: matches.value_of("file").map(str::to_string),
            query: matches.value_of("query").map(str::to_string),
            rcfile: matches.value_of("rcfile").map(str::to_string),
            buffer_size: matches.value_of("buffer-size").and_then(|v| v.parse().ok()).unwrap_or(0),
            null: matches.is_present("null"),
            initial_index: matches.value_of("initial-index").and_then(|v| v.parse().ok()).unwrap_or(0),
            initial_filter: matches.value_of("initial-filter").map(str::to_string),
            prompt: matches.value_of("prompt").map(str::to_string),
            layout: matches.value_of("layout").map(str::to_string),
            select_1: matches.is_present("select-1"),
            exit_0: matches.is_present("exit-0"),
            select_all: matches.is_present("select-all"),
            on_cancel: matches.value_of("on-cancel").map(str::to_string),
            selection_prefix: matches.value_of("selection-prefix").map(str::to_string),
            exec: matches.value_of("exec").map(str::to_string),
            print_query: matches.is_present("print-query"),
            color: if ansi { Some("auto".to_string()) } else { matches.value_of("color").map(str::to_string) },
            ansi: ansi || matches.value_of("color") == Some("auto"),
            height: matches.value_of("height").map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_flags() {
        let matches = PecoOptions::command().try_get_matches_from(["peco", "--query", "foo", "--select-1"]).unwrap();
        let options = PecoOptions::from_matches(&matches);
        assert_eq!(options.query.as_deref(), Some("foo"));
        assert!(options.select_1);
        assert!(!options.exit_0);
    }

    #[test]
    fn ansi_flag_implies_color_auto() {
        let matches = PecoOptions::command().try_get_matches_from(["peco", "--ansi"]).unwrap();
        let options = PecoOptions::from_matches(&matches);
        assert!(options.ansi);
        assert_eq!(options.color.as_deref(), Some("auto"));
    }

    #[test]
    fn rejects_unknown_layout_value() {
        let result = PecoOptions::command().try_get_matches_from(["peco", "--layout", "sideways"]);
        assert!(result.is_err());
    }
}
