//! The config-file shape (`Prompt`/`Layout`/`Keymap`/`Action`/`Style`/...)
//! and the seam that decodes a file into it.
//!
//! Grounded on `src/theme.rs::from_options`'s `key:value` token-list
//! approach to style sections (reused here as `Config::style` feeding
//! `ColorTheme::from_style_map`) and `src/options.rs`'s `SkimOptions`
//! builder shape for the rest of the fields. JSON/YAML body decoding is out
//! of scope (a Non-goal): `ConfigReader` is a seam a caller can satisfy
//! with `serde_json`/`serde_yaml` without this crate depending on either.
use crate::keymap::{parse_key_sequence, Keymap, KeymapBuilder};
use crate::layout::LayoutKind;
use crate::registry::Registry;
use crate::theme::ColorTheme;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnCancel {
    Success,
    Error,
}

impl Default for OnCancel {
    fn default() -> Self {
        OnCancel::Success
    }
}

#[derive(Debug, Clone)]
pub struct CustomFilterSpec {
    pub cmd: String,
    pub args: Vec<String>,
    pub buffer_threshold: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SingleKeyJump {
    pub show_prefix: bool,
}

/// Everything a config file can say, decoded or defaulted.
#[derive(Debug, Clone)]
pub struct Config {
    pub prompt: String,
    pub initial_filter: String,
    pub layout: LayoutKind,
    pub keymap: HashMap<String, String>,
    pub action: HashMap<String, Vec<String>>,
    pub style: HashMap<String, Vec<String>>,
    pub custom_filter: HashMap<String, CustomFilterSpec>,
    pub single_key_jump: SingleKeyJump,
    pub sticky_selection: bool,
    pub suppress_status_msg: bool,
    pub on_cancel: OnCancel,
    pub max_scan_buffer_size: usize,
    pub ansi: bool,
    pub height: String,
    pub fuzzy_longest_sort: bool,
    pub selection_prefix: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            prompt: "QUERY> ".to_string(),
            initial_filter: "fuzzy".to_string(),
            layout: LayoutKind::TopDown,
            keymap: HashMap::new(),
            action: HashMap::new(),
            style: HashMap::new(),
            custom_filter: HashMap::new(),
            single_key_jump: SingleKeyJump::default(),
            sticky_selection: false,
            suppress_status_msg: false,
            on_cancel: OnCancel::default(),
            max_scan_buffer_size: 0,
            ansi: false,
            height: "100%".to_string(),
            fuzzy_longest_sort: false,
            selection_prefix: None,
        }
    }
}

impl Config {
    pub fn build_theme(&self) -> ColorTheme {
        ColorTheme::from_style_map(&self.style)
    }

    pub fn build_registry(&self) -> crate::error::Result<Registry> {
        let mut builder = Registry::builder();
        for (name, actions) in &self.action {
            builder = builder.define(name.clone(), actions.clone());
        }
        builder.build()
    }

    /// Build a `Keymap` from `self.keymap`, resolving each bound name
    /// through `registry` (so a binding can target either a built-in
    /// action or a config-defined composite) and falling back to
    /// `default_bindings` for any key sequence the config doesn't mention.
    pub fn build_keymap(&self, registry: &Registry, default_bindings: &[(&str, &str)]) -> crate::error::Result<Keymap> {
        let mut builder: KeymapBuilder = Keymap::builder();
        let mut seen = std::collections::HashSet::new();
        for (seq, name) in &self.keymap {
            builder = bind_one(builder, seq, name, registry)?;
            seen.insert(seq.clone());
        }
        for (seq, name) in default_bindings {
            if !seen.contains(*seq) {
                builder = bind_one(builder, seq, name, registry)?;
            }
        }
        Ok(builder.build())
    }
}

fn bind_one(builder: KeymapBuilder, seq: &str, name: &str, registry: &Registry) -> crate::error::Result<KeymapBuilder> {
    let keys = parse_key_sequence(seq)
        .ok_or_else(|| crate::error::PecoError::Config(format!("invalid key sequence \"{}\"", seq)))?;
    let actions = registry
        .resolve(name)
        .ok_or_else(|| crate::error::PecoError::Config(format!("action \"{}\" is not defined", name)))?;
    Ok(builder.bind(&keys, actions))
}

pub trait ConfigReader {
    fn read(&self, path: &Path) -> crate::error::Result<Config>;
}

/// Always returns `Config::default()`, ignoring `path` entirely. Decoding
/// an on-disk JSON/YAML file is left to a caller-supplied `ConfigReader`.
pub struct NullConfigReader;

impl ConfigReader for NullConfigReader {
    fn read(&self, _path: &Path) -> crate::error::Result<Config> {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_config_reader_always_returns_default() {
        let config = NullConfigReader.read(Path::new("/nonexistent")).unwrap();
        assert_eq!(config.prompt, "QUERY> ");
        assert_eq!(config.layout, LayoutKind::TopDown);
    }

    #[test]
    fn build_registry_expands_custom_actions_from_config() {
        let mut config = Config::default();
        config
            .action
            .insert("select-and-finish".to_string(), vec!["toggle-selection".to_string(), "finish".to_string()]);
        let registry = config.build_registry().unwrap();
        assert!(registry.resolve("select-and-finish").is_some());
    }

    #[test]
    fn config_keymap_entries_override_defaults_by_sequence() {
        let mut config = Config::default();
        config.keymap.insert("C-n".to_string(), "select-up".to_string());
        let registry = config.build_registry().unwrap();
        let keymap = config.build_keymap(&registry, &[("C-n", "select-down"), ("C-p", "select-up")]).unwrap();
        use crate::action::Action;
        use crate::keymap::AcceptResult;
        use tuikit::key::Key;
        assert_eq!(keymap.accept_key(Key::Ctrl('n')), AcceptResult::Done(vec![Action::SelectUp]));
        assert_eq!(keymap.accept_key(Key::Ctrl('p')), AcceptResult::Done(vec![Action::SelectUp]));
    }
}
