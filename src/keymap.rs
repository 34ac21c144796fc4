//! Key-sequence trie: resolves a stream of key presses into an `Action`
//! sequence, tracking in-progress multi-key chains.
//!
//! Grounded on the donor's `input.rs` keybinding-parsing idiom (translating
//! raw key input into named events) generalised from "one key, one event"
//! into "a sequence of keys, looked up in a trie, yields a composite
//! action list"; the trie itself and its prefix-overriding insert rule have
//! no direct donor analogue.
use crate::action::Action;
use std::cell::RefCell;
use std::collections::HashMap;
use tuikit::key::Key;
use tuikit::term::MouseButton;

enum KeyNode {
    Leaf(Vec<Action>),
    Chain(HashMap<Key, KeyNode>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptResult {
    /// A full sequence matched; the actions to run, in order.
    Done(Vec<Action>),
    /// Still inside a multi-key chain; wait for the next key.
    InProgress,
    /// No sequence starting with the keys seen so far exists.
    NoMatch,
}

pub struct Keymap {
    root: HashMap<Key, KeyNode>,
    pending: RefCell<Vec<Key>>,
}

impl Keymap {
    pub fn builder() -> KeymapBuilder {
        KeymapBuilder::default()
    }

    /// Step the resolver by one key. Resets to the root on `Done` or
    /// `NoMatch`; stays in the chain on `InProgress`.
    pub fn accept_key(&self, key: Key) -> AcceptResult {
        let mut pending = self.pending.borrow_mut();
        pending.push(key);
        match lookup(&self.root, &pending) {
            Lookup::Leaf(actions) => {
                pending.clear();
                AcceptResult::Done(actions)
            }
            Lookup::Chain => AcceptResult::InProgress,
            Lookup::NoMatch => {
                pending.clear();
                AcceptResult::NoMatch
            }
        }
    }

    /// Reset to the root, abandoning any in-progress chain.
    pub fn cancel_chain(&self) {
        self.pending.borrow_mut().clear();
    }

    pub fn in_middle_of_chain(&self) -> bool {
        !self.pending.borrow().is_empty()
    }
}

enum Lookup {
    Leaf(Vec<Action>),
    Chain,
    NoMatch,
}

fn lookup(root: &HashMap<Key, KeyNode>, path: &[Key]) -> Lookup {
    let mut node_map = root;
    for (i, key) in path.iter().enumerate() {
        let last = i == path.len() - 1;
        match node_map.get(key) {
            Some(KeyNode::Leaf(actions)) if last => return Lookup::Leaf(actions.clone()),
            Some(KeyNode::Leaf(_)) => return Lookup::NoMatch,
            Some(KeyNode::Chain(_)) if last => return Lookup::Chain,
            Some(KeyNode::Chain(next)) => node_map = next,
            None => return Lookup::NoMatch,
        }
    }
    Lookup::NoMatch
}

#[derive(Default)]
pub struct KeymapBuilder {
    root: HashMap<Key, KeyNode>,
}

impl KeymapBuilder {
    /// Bind a key sequence to an action list. A sequence whose prefix is
    /// already bound overrides that prefix: the shorter binding stops
    /// firing on its own and instead becomes the start of this chain.
    pub fn bind(mut self, keys: &[Key], actions: Vec<Action>) -> Self {
        insert(&mut self.root, keys, actions);
        self
    }

    pub fn build(self) -> Keymap {
        Keymap {
            root: self.root,
            pending: RefCell::new(Vec::new()),
        }
    }
}

fn insert(root: &mut HashMap<Key, KeyNode>, keys: &[Key], actions: Vec<Action>) {
    assert!(!keys.is_empty(), "key sequence must not be empty");
    let (first, rest) = keys.split_first().unwrap();
    if rest.is_empty() {
        root.insert(*first, KeyNode::Leaf(actions));
        return;
    }
    match root.get_mut(first) {
        Some(KeyNode::Chain(next)) => insert(next, rest, actions),
        Some(slot @ KeyNode::Leaf(_)) => {
            let mut next = HashMap::new();
            insert(&mut next, rest, actions);
            *slot = KeyNode::Chain(next);
        }
        None => {
            let mut next = HashMap::new();
            insert(&mut next, rest, actions);
            root.insert(*first, KeyNode::Chain(next));
        }
    }
}

/// Parse a single key token (`C-`/`M-`/`S-` modifier prefixes, special
/// names, or a bare printable character) into a `Key`. `MouseLeft`/
/// `MouseMiddle`/`MouseRight` resolve to `Key::MousePress` at coordinates
/// `(0, 0)`: a binding cares only which button was pressed, so the input
/// loop normalizes every real click to the same zeroed coordinates before
/// looking it up in the trie.
pub fn parse_key_token(token: &str) -> Option<Key> {
    let mut rest = token;
    let mut ctrl = false;
    let mut alt = false;
    loop {
        if let Some(stripped) = rest.strip_prefix("C-") {
            ctrl = true;
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix("M-") {
            alt = true;
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix("S-") {
            rest = stripped;
        } else {
            break;
        }
    }

    let base = match rest {
        "Esc" => Key::ESC,
        "Enter" => Key::Enter,
        "Tab" => Key::Tab,
        "BS" | "BS2" => Key::Backspace,
        "Space" => Key::Char(' '),
        "Insert" => Key::Insert,
        "Delete" => Key::Delete,
        "Home" => Key::Home,
        "End" => Key::End,
        "Pgup" => Key::PageUp,
        "Pgdn" => Key::PageDown,
        "ArrowUp" => Key::Up,
        "ArrowDown" => Key::Down,
        "ArrowLeft" => Key::Left,
        "ArrowRight" => Key::Right,
        "MouseLeft" => return Some(Key::MousePress(MouseButton::Left, 0, 0)),
        "MouseMiddle" => return Some(Key::MousePress(MouseButton::Middle, 0, 0)),
        "MouseRight" => return Some(Key::MousePress(MouseButton::Right, 0, 0)),
        _ if rest.len() >= 2 && rest.starts_with('F') && rest[1..].parse::<u8>().is_ok() => {
            Key::F(rest[1..].parse().unwrap())
        }
        _ => {
            let mut chars = rest.chars();
            let ch = chars.next()?;
            if chars.next().is_some() {
                return None;
            }
            Key::Char(ch)
        }
    };

    Some(match (ctrl, alt, base) {
        (true, _, Key::Char(c)) => Key::Ctrl(c),
        (_, true, Key::Char(c)) => Key::Alt(c),
        _ => base,
    })
}

/// Parse a comma-separated key sequence (`"C-x,C-s"`) into its `Key` list.
pub fn parse_key_sequence(seq: &str) -> Option<Vec<Key>> {
    seq.split(',').map(parse_key_token).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_key_binding_resolves_immediately() {
        let keymap = Keymap::builder().bind(&[Key::Ctrl('n')], vec![Action::SelectDown]).build();
        assert_eq!(keymap.accept_key(Key::Ctrl('n')), AcceptResult::Done(vec![Action::SelectDown]));
    }

    #[test]
    fn multi_key_chain_reports_in_progress_then_done() {
        let keymap = Keymap::builder()
            .bind(&[Key::Ctrl('x'), Key::Ctrl('s')], vec![Action::Finish])
            .build();
        assert_eq!(keymap.accept_key(Key::Ctrl('x')), AcceptResult::InProgress);
        assert!(keymap.in_middle_of_chain());
        assert_eq!(keymap.accept_key(Key::Ctrl('s')), AcceptResult::Done(vec![Action::Finish]));
        assert!(!keymap.in_middle_of_chain());
    }

    #[test]
    fn unmatched_key_in_chain_resets_to_root() {
        let keymap = Keymap::builder()
            .bind(&[Key::Ctrl('x'), Key::Ctrl('s')], vec![Action::Finish])
            .build();
        assert_eq!(keymap.accept_key(Key::Ctrl('x')), AcceptResult::InProgress);
        assert_eq!(keymap.accept_key(Key::Char('q')), AcceptResult::NoMatch);
        assert!(!keymap.in_middle_of_chain());
    }

    #[test]
    fn longer_sequence_overrides_existing_prefix_leaf() {
        let keymap = Keymap::builder()
            .bind(&[Key::Ctrl('x')], vec![Action::Cancel])
            .bind(&[Key::Ctrl('x'), Key::Ctrl('s')], vec![Action::Finish])
            .build();
        assert_eq!(keymap.accept_key(Key::Ctrl('x')), AcceptResult::InProgress);
        keymap.cancel_chain();
        assert_eq!(keymap.accept_key(Key::Ctrl('x')), AcceptResult::InProgress);
        assert_eq!(keymap.accept_key(Key::Ctrl('s')), AcceptResult::Done(vec![Action::Finish]));
    }

    #[test]
    fn parses_modifier_prefixes_and_special_names() {
        assert_eq!(parse_key_token("C-n"), Some(Key::Ctrl('n')));
        assert_eq!(parse_key_token("M-f"), Some(Key::Alt('f')));
        assert_eq!(parse_key_token("Enter"), Some(Key::Enter));
        assert_eq!(parse_key_token("F5"), Some(Key::F(5)));
        assert_eq!(parse_key_token("a"), Some(Key::Char('a')));
    }

    #[test]
    fn parses_comma_separated_sequence() {
        assert_eq!(parse_key_sequence("C-x,C-s"), Some(vec![Key::Ctrl('x'), Key::Ctrl('s')]));
    }

    #[test]
    fn parses_mouse_button_tokens() {
        assert_eq!(parse_key_token("MouseLeft"), Some(Key::MousePress(MouseButton::Left, 0, 0)));
        assert_eq!(parse_key_token("MouseMiddle"), Some(Key::MousePress(MouseButton::Middle, 0, 0)));
        assert_eq!(parse_key_token("MouseRight"), Some(Key::MousePress(MouseButton::Right, 0, 0)));
    }

    #[test]
    fn mouse_binding_resolves_through_the_same_trie_as_key_bindings() {
        let keymap = Keymap::builder()
            .bind(&[Key::MousePress(MouseButton::Left, 0, 0)], vec![Action::SelectDown])
            .build();
        assert_eq!(
            keymap.accept_key(Key::MousePress(MouseButton::Left, 0, 0)),
            AcceptResult::Done(vec![Action::SelectDown])
        );
    }
}
