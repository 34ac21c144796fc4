//! Pulls `Screen` events and resolves them into either a literal character
//! (fed to the query buffer) or a resolved `Action` list (fed to whatever
//! executes them), stopping as soon as a `CancellationToken` up its tree is
//! cancelled.
//!
//! Grounded on `Skim::run_with`'s dedicated input-polling thread in
//! `src/lib.rs` (`term.poll_event()` in a loop, breaking on
//! `TermEvent::User1`) but collapsed from "two threads talking over an
//! `mpsc` channel" into "one loop calling back into a handler", since this
//! crate already has `Hub` for cross-thread messaging and doesn't need a
//! second channel just to get input out of this loop. There is deliberately
//! no Esc/Alt disambiguation timer: `Key::ESC` and `Key::Alt(_)` arrive as
//! already-distinct events from the terminal backend.
use crate::action::Action;
use crate::cancellation::CancellationToken;
use crate::error::Result;
use crate::keymap::{AcceptResult, Keymap};
use crate::screen::{MouseButtonKind, Screen, ScreenEvent};
use tuikit::key::Key;
use tuikit::term::MouseButton;

/// What the loop does with a resolved event. Implemented by whatever owns
/// the running query/selection/location state (the orchestrator in
/// `peco.rs`); kept as a trait so this loop can be tested without one.
pub trait InputHandler {
    fn on_char(&self, ch: char);
    fn on_actions(&self, actions: Vec<Action>);
    fn on_resize(&self, width: usize, height: usize);
}

/// Run until the screen is closed, a `Wake` event arrives, or `ctx` (or an
/// ancestor) is cancelled.
pub fn run(screen: &dyn Screen, keymap: &Keymap, handler: &dyn InputHandler, ctx: &CancellationToken) -> Result<()> {
    loop {
        if ctx.is_cancelled() {
            return Ok(());
        }
        let event = match screen.poll_event() {
            Ok(event) => event,
            Err(_) => return Ok(()),
        };
        match event {
            ScreenEvent::Wake => return Ok(()),
            ScreenEvent::Resize { width, height } => handler.on_resize(width, height),
            ScreenEvent::MousePress { button, .. } => dispatch_key(keymap, handler, mouse_key(button)),
            ScreenEvent::Key(key) => dispatch_key(keymap, handler, key),
        }
    }
}

fn dispatch_key(keymap: &Keymap, handler: &dyn InputHandler, key: Key) {
    match keymap.accept_key(key) {
        AcceptResult::Done(actions) => handler.on_actions(actions),
        AcceptResult::InProgress => {}
        AcceptResult::NoMatch => {
            if let Key::Char(ch) = key {
                handler.on_char(ch);
            }
        }
    }
}

/// Collapse a real click's coordinates to the canonical `(0, 0)` form a
/// `MouseLeft`/`MouseMiddle`/`MouseRight` binding resolves to, so clicking
/// anywhere on the screen with a bound button looks the same to the trie.
fn mouse_key(button: MouseButtonKind) -> Key {
    Key::MousePress(
        match button {
            MouseButtonKind::Left => MouseButton::Left,
            MouseButtonKind::Middle => MouseButton::Middle,
            MouseButtonKind::Right => MouseButton::Right,
        },
        0,
        0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::RecordingScreen;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingHandler {
        chars: RefCell<Vec<char>>,
        actions: RefCell<Vec<Vec<Action>>>,
        resizes: RefCell<Vec<(usize, usize)>>,
    }

    impl InputHandler for RecordingHandler {
        fn on_char(&self, ch: char) {
            self.chars.borrow_mut().push(ch);
        }
        fn on_actions(&self, actions: Vec<Action>) {
            self.actions.borrow_mut().push(actions);
        }
        fn on_resize(&self, width: usize, height: usize) {
            self.resizes.borrow_mut().push((width, height));
        }
    }

    #[test]
    fn unbound_char_keys_reach_on_char() {
        let screen = RecordingScreen::new(80, 24);
        screen.push_event(ScreenEvent::Key(Key::Char('a')));
        screen.push_event(ScreenEvent::Wake);
        let keymap = Keymap::builder().build();
        let handler = RecordingHandler::default();
        run(&screen, &keymap, &handler, &CancellationToken::new()).unwrap();
        assert_eq!(*handler.chars.borrow(), vec!['a']);
    }

    #[test]
    fn bound_key_reaches_on_actions_not_on_char() {
        let screen = RecordingScreen::new(80, 24);
        screen.push_event(ScreenEvent::Key(Key::Ctrl('n')));
        screen.push_event(ScreenEvent::Wake);
        let keymap = Keymap::builder().bind(&[Key::Ctrl('n')], vec![Action::SelectDown]).build();
        let handler = RecordingHandler::default();
        run(&screen, &keymap, &handler, &CancellationToken::new()).unwrap();
        assert!(handler.chars.borrow().is_empty());
        assert_eq!(*handler.actions.borrow(), vec![vec![Action::SelectDown]]);
    }

    #[test]
    fn resize_event_reaches_on_resize() {
        let screen = RecordingScreen::new(80, 24);
        screen.push_event(ScreenEvent::Resize { width: 100, height: 40 });
        screen.push_event(ScreenEvent::Wake);
        let keymap = Keymap::builder().build();
        let handler = RecordingHandler::default();
        run(&screen, &keymap, &handler, &CancellationToken::new()).unwrap();
        assert_eq!(*handler.resizes.borrow(), vec![(100, 40)]);
    }

    #[test]
    fn bound_mouse_click_reaches_on_actions_regardless_of_coordinates() {
        let screen = RecordingScreen::new(80, 24);
        screen.push_event(ScreenEvent::MousePress {
            button: MouseButtonKind::Left,
            row: 7,
            col: 13,
        });
        screen.push_event(ScreenEvent::Wake);
        let keymap = Keymap::builder()
            .bind(&[Key::MousePress(MouseButton::Left, 0, 0)], vec![Action::Finish])
            .build();
        let handler = RecordingHandler::default();
        run(&screen, &keymap, &handler, &CancellationToken::new()).unwrap();
        assert_eq!(*handler.actions.borrow(), vec![vec![Action::Finish]]);
    }

    #[test]
    fn cancelled_token_stops_the_loop_before_polling() {
        let screen = RecordingScreen::new(80, 24);
        let keymap = Keymap::builder().build();
        let handler = RecordingHandler::default();
        let ctx = CancellationToken::new();
        ctx.cancel();
        run(&screen, &keymap, &handler, &ctx).unwrap();
        assert!(handler.chars.borrow().is_empty());
    }
}
