//! Per-instance action-name registry: expands a config file's named
//! composite actions (`Action` section: custom name to list of action
//! names, which may themselves reference other composites) into flat
//! `Vec<Action>` sequences, with a recursion depth cap to catch cycles.
//!
//! Lives on a `Registry` value built once at startup and owned by whatever
//! constructs the Keymap, rather than on a `lazy_static!`/process-wide
//! table the way the donor's `global.rs` keeps its id counter — two
//! independent `Peco` instances in the same process (as in tests) must not
//! share action definitions.
use crate::action::Action;
use crate::error::{PecoError, Result};
use std::collections::HashMap;

/// How many composite-action indirections to follow before giving up.
pub const DEFAULT_MAX_EXPANSION_DEPTH: usize = 100;

pub struct Registry {
    expanded: HashMap<String, Vec<Action>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Resolve a name to its primitive action sequence: a built-in action
    /// name resolves to itself, a custom name to its expanded definition.
    pub fn resolve(&self, name: &str) -> Option<Vec<Action>> {
        if let Some(action) = Action::from_name(name) {
            return Some(vec![action]);
        }
        self.expanded.get(name).cloned()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    raw: HashMap<String, Vec<String>>,
    max_depth: Option<usize>,
}

impl RegistryBuilder {
    /// Define (or redefine) a custom action as an ordered list of names,
    /// each either a built-in action name or another custom name.
    pub fn define(mut self, name: impl Into<String>, actions: Vec<String>) -> Self {
        self.raw.insert(name.into(), actions);
        self
    }

    pub fn max_expansion_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn build(self) -> Result<Registry> {
        let max_depth = self.max_depth.unwrap_or(DEFAULT_MAX_EXPANSION_DEPTH);
        let mut expanded = HashMap::new();
        for name in self.raw.keys() {
            let actions = expand(name, &self.raw, max_depth, 0)?;
            expanded.insert(name.clone(), actions);
        }
        Ok(Registry { expanded })
    }
}

fn expand(name: &str, raw: &HashMap<String, Vec<String>>, max_depth: usize, depth: usize) -> Result<Vec<Action>> {
    if depth > max_depth {
        return Err(PecoError::Config(format!("action \"{}\" exceeds max expansion depth {}", name, max_depth)));
    }
    let parts = match raw.get(name) {
        Some(parts) => parts,
        None => return Err(PecoError::Config(format!("action \"{}\" is not defined", name))),
    };
    let mut out = Vec::with_capacity(parts.len());
    for part in parts {
        if let Some(action) = Action::from_name(part) {
            out.push(action);
        } else {
            out.extend(expand(part, raw, max_depth, depth + 1)?);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_action_resolves_to_itself() {
        let registry = Registry::builder().build().unwrap();
        assert_eq!(registry.resolve("finish"), Some(vec![Action::Finish]));
    }

    #[test]
    fn composite_action_expands_in_order() {
        let registry = Registry::builder()
            .define("select-and-finish", vec!["toggle-selection".to_string(), "finish".to_string()])
            .build()
            .unwrap();
        assert_eq!(
            registry.resolve("select-and-finish"),
            Some(vec![Action::ToggleSelection, Action::Finish])
        );
    }

    #[test]
    fn nested_composite_actions_expand_transitively() {
        let registry = Registry::builder()
            .define("a", vec!["select-up".to_string()])
            .define("b", vec!["a".to_string(), "select-down".to_string()])
            .build()
            .unwrap();
        assert_eq!(registry.resolve("b"), Some(vec![Action::SelectUp, Action::SelectDown]));
    }

    #[test]
    fn cyclic_composite_actions_are_rejected() {
        let registry = Registry::builder()
            .define("a", vec!["b".to_string()])
            .define("b", vec!["a".to_string()])
            .max_expansion_depth(10)
            .build();
        assert!(registry.is_err());
    }

    #[test]
    fn undefined_name_is_an_error() {
        let registry = Registry::builder().define("a", vec!["does-not-exist".to_string()]).build();
        assert!(registry.is_err());
    }
}
