//! The primitive operations a key sequence (or a config-file composite
//! action) resolves to. Grounded on the donor's `event.rs` `Event` enum
//! (plain `Ev*`/`EvAct*` variants, `Copy`+`Hash`+`Eq`) generalised from
//! "things the UI loop reacts to" into "things a key press can do".
//!
//! Resolution (Keymap/Registry, turning a key sequence or a name into one
//! of these) is deliberately kept separate from execution: the orchestrator
//! that owns the running query/selection/location state is what actually
//! carries out an `Action`, given `(ctx, state, event)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ForwardChar,
    BackwardChar,
    ForwardWord,
    BackwardWord,
    BeginningOfLine,
    EndOfLine,
    DeleteForwardChar,
    DeleteBackwardChar,
    KillEndOfLine,
    KillBeginningOfLine,
    DeleteAll,
    SelectUp,
    SelectDown,
    ScrollPageUp,
    ScrollPageDown,
    ScrollLeft,
    ScrollRight,
    ToggleSelection,
    ToggleSelectionAndSelectNext,
    SelectAll,
    SelectNone,
    ToggleSelectMode,
    RotateMatcher,
    Freeze,
    Unfreeze,
    ZoomIn,
    ZoomOut,
    Refresh,
    Finish,
    Cancel,
}

impl Action {
    /// Parse one of the fixed, built-in action names (as they'd appear in
    /// a config file's Keymap/Action sections). Unlike key tokens, these
    /// names are hyphen-separated lowercase words.
    pub fn from_name(name: &str) -> Option<Action> {
        Some(match name {
            "forward-char" => Action::ForwardChar,
            "backward-char" => Action::BackwardChar,
            "forward-word" => Action::ForwardWord,
            "backward-word" => Action::BackwardWord,
            "beginning-of-line" => Action::BeginningOfLine,
            "end-of-line" => Action::EndOfLine,
            "delete-forward-char" => Action::DeleteForwardChar,
            "delete-backward-char" => Action::DeleteBackwardChar,
            "kill-end-of-line" => Action::KillEndOfLine,
            "kill-beginning-of-line" => Action::KillBeginningOfLine,
            "delete-all" => Action::DeleteAll,
            "select-up" => Action::SelectUp,
            "select-down" => Action::SelectDown,
            "scroll-page-up" => Action::ScrollPageUp,
            "scroll-page-down" => Action::ScrollPageDown,
            "scroll-left" => Action::ScrollLeft,
            "scroll-right" => Action::ScrollRight,
            "toggle-selection" => Action::ToggleSelection,
            "toggle-selection-and-select-next" => Action::ToggleSelectionAndSelectNext,
            "select-all" => Action::SelectAll,
            "select-none" => Action::SelectNone,
            "toggle-select-mode" => Action::ToggleSelectMode,
            "rotate-matcher" => Action::RotateMatcher,
            "freeze" => Action::Freeze,
            "unfreeze" => Action::Unfreeze,
            "zoom-in" => Action::ZoomIn,
            "zoom-out" => Action::ZoomOut,
            "refresh" => Action::Refresh,
            "finish" => Action::Finish,
            "cancel" => Action::Cancel,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::ForwardChar => "forward-char",
            Action::BackwardChar => "backward-char",
            Action::ForwardWord => "forward-word",
            Action::BackwardWord => "backward-word",
            Action::BeginningOfLine => "beginning-of-line",
            Action::EndOfLine => "end-of-line",
            Action::DeleteForwardChar => "delete-forward-char",
            Action::DeleteBackwardChar => "delete-backward-char",
            Action::KillEndOfLine => "kill-end-of-line",
            Action::KillBeginningOfLine => "kill-beginning-of-line",
            Action::DeleteAll => "delete-all",
            Action::SelectUp => "select-up",
            Action::SelectDown => "select-down",
            Action::ScrollPageUp => "scroll-page-up",
            Action::ScrollPageDown => "scroll-page-down",
            Action::ScrollLeft => "scroll-left",
            Action::ScrollRight => "scroll-right",
            Action::ToggleSelection => "toggle-selection",
            Action::ToggleSelectionAndSelectNext => "toggle-selection-and-select-next",
            Action::SelectAll => "select-all",
            Action::SelectNone => "select-none",
            Action::ToggleSelectMode => "toggle-select-mode",
            Action::RotateMatcher => "rotate-matcher",
            Action::Freeze => "freeze",
            Action::Unfreeze => "unfreeze",
            Action::ZoomIn => "zoom-in",
            Action::ZoomOut => "zoom-out",
            Action::Refresh => "refresh",
            Action::Finish => "finish",
            Action::Cancel => "cancel",
        }
    }
}
