//! The terminal surface the view draws onto and the input loop polls
//! events from, behind a trait so tests can drive the whole crate without a
//! real terminal.
//!
//! Grounded on `Skim::run_with`'s direct use of `tuikit::term::Term` in
//! `src/lib.rs` (`Term::with_options`, `poll_event`, `send_event`,
//! `enable_mouse_support`, `pause`); `TuikitScreen` wraps that API behind
//! `Screen` instead of calling it inline from the orchestrator.
use crate::error::{PecoError, Result};
use tuikit::attr::Attr;
use tuikit::key::Key;
use tuikit::prelude::{Event as TermEvent, Term, TermHeight, TermOptions};
use tuikit::term::MouseButton;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenEvent {
    Key(Key),
    Resize { width: usize, height: usize },
    MousePress { button: MouseButtonKind, row: usize, col: usize },
    /// A wake-up signal sent to interrupt a blocked `poll_event`, the way
    /// the donor's `TermEvent::User1` interrupts the input thread on
    /// shutdown.
    Wake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButtonKind {
    Left,
    Middle,
    Right,
}

/// Everything the core needs from a terminal: init/teardown, drawing
/// primitives, and an event source.
pub trait Screen: Send + Sync {
    fn init(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
    /// `(width, height)` in cells.
    fn size(&self) -> (usize, usize);
    fn put_cell(&self, row: usize, col: usize, ch: char, attr: Attr);
    fn print(&self, row: usize, col: usize, text: &str, attr: Attr);
    fn flush(&self) -> Result<()>;
    fn sync(&self) -> Result<()>;
    fn poll_event(&self) -> Result<ScreenEvent>;
    fn suspend(&self) -> Result<()>;
    fn resume(&self) -> Result<()>;
    fn send_event(&self, event: ScreenEvent) -> Result<()>;
}

pub struct TuikitScreen {
    term: Term,
}

impl TuikitScreen {
    pub fn new(min_height: usize, height: usize) -> Result<Self> {
        let term = Term::with_options(TermOptions::default().min_height(TermHeight::Fixed(min_height)).height(TermHeight::Fixed(height)))
            .map_err(|e| PecoError::Internal(format!("failed to open terminal: {}", e)))?;
        Ok(TuikitScreen { term })
    }
}

impl Screen for TuikitScreen {
    fn init(&self) -> Result<()> {
        let _ = self.term.enable_mouse_support();
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.term.pause().map_err(|e| PecoError::Internal(format!("failed to release terminal: {}", e)))
    }

    fn size(&self) -> (usize, usize) {
        self.term.term_size().unwrap_or((80, 24))
    }

    fn put_cell(&self, row: usize, col: usize, ch: char, attr: Attr) {
        let _ = self.term.print_with_attr(row, col, &ch.to_string(), attr);
    }

    fn print(&self, row: usize, col: usize, text: &str, attr: Attr) {
        let _ = self.term.print_with_attr(row, col, text, attr);
    }

    fn flush(&self) -> Result<()> {
        self.term.present().map_err(|e| PecoError::Internal(format!("failed to present terminal: {}", e)))?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.term.clear().map_err(|e| PecoError::Internal(format!("failed to clear terminal: {}", e)))
    }

    fn poll_event(&self) -> Result<ScreenEvent> {
        loop {
            let event = self
                .term
                .poll_event()
                .map_err(|e| PecoError::Internal(format!("failed to poll terminal event: {}", e)))?;
            match event {
                TermEvent::Key(Key::MousePress(button, row, col)) => {
                    return Ok(ScreenEvent::MousePress {
                        button: match button {
                            MouseButton::Left => MouseButtonKind::Left,
                            MouseButton::Middle => MouseButtonKind::Middle,
                            MouseButton::Right => MouseButtonKind::Right,
                        },
                        row: row as usize,
                        col: col as usize,
                    })
                }
                TermEvent::Key(key) => return Ok(ScreenEvent::Key(key)),
                TermEvent::Resize { width, height } => {
                    return Ok(ScreenEvent::Resize {
                        width: width as usize,
                        height: height as usize,
                    })
                }
                TermEvent::User1 => return Ok(ScreenEvent::Wake),
                _ => continue,
            }
        }
    }

    fn suspend(&self) -> Result<()> {
        self.term.pause().map_err(|e| PecoError::Internal(format!("failed to suspend terminal: {}", e)))
    }

    fn resume(&self) -> Result<()> {
        self.term.restart().map_err(|e| PecoError::Internal(format!("failed to resume terminal: {}", e)))
    }

    fn send_event(&self, event: ScreenEvent) -> Result<()> {
        let term_event = match event {
            ScreenEvent::Wake => TermEvent::User1,
            ScreenEvent::Key(key) => TermEvent::Key(key),
            ScreenEvent::Resize { width, height } => TermEvent::Resize {
                width: width as u32,
                height: height as u32,
            },
            ScreenEvent::MousePress { button, row, col } => TermEvent::Key(Key::MousePress(
                match button {
                    MouseButtonKind::Left => MouseButton::Left,
                    MouseButtonKind::Middle => MouseButton::Middle,
                    MouseButtonKind::Right => MouseButton::Right,
                },
                row as u32,
                col as u32,
            )),
        };
        self.term
            .send_event(term_event)
            .map_err(|e| PecoError::Internal(format!("failed to send terminal event: {}", e)))
    }
}

#[cfg(any(test, feature = "testing"))]
pub use test_double::RecordingScreen;

#[cfg(any(test, feature = "testing"))]
mod test_double {
    use super::*;
    use std::sync::Mutex;

    /// In-memory `Screen` for driving the whole crate in tests without a
    /// real terminal: `print`/`put_cell` calls append to `draws`, and
    /// `poll_event` replays a scripted queue of events.
    pub struct RecordingScreen {
        width: usize,
        height: usize,
        events: Mutex<std::collections::VecDeque<ScreenEvent>>,
        draws: Mutex<Vec<String>>,
    }

    impl RecordingScreen {
        pub fn new(width: usize, height: usize) -> Self {
            RecordingScreen {
                width,
                height,
                events: Mutex::new(std::collections::VecDeque::new()),
                draws: Mutex::new(Vec::new()),
            }
        }

        pub fn push_event(&self, event: ScreenEvent) {
            self.events.lock().unwrap().push_back(event);
        }

        pub fn draws(&self) -> Vec<String> {
            self.draws.lock().unwrap().clone()
        }
    }

    impl Screen for RecordingScreen {
        fn init(&self) -> Result<()> {
            Ok(())
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }

        fn size(&self) -> (usize, usize) {
            (self.width, self.height)
        }

        fn put_cell(&self, row: usize, col: usize, ch: char, _attr: Attr) {
            self.draws.lock().unwrap().push(format!("cell({row},{col})={ch}"));
        }

        fn print(&self, row: usize, col: usize, text: &str, _attr: Attr) {
            self.draws.lock().unwrap().push(format!("print({row},{col})={text}"));
        }

        fn flush(&self) -> Result<()> {
            Ok(())
        }

        fn sync(&self) -> Result<()> {
            Ok(())
        }

        fn poll_event(&self) -> Result<ScreenEvent> {
            self.events
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| PecoError::Internal("no more scripted events".to_string()))
        }

        fn suspend(&self) -> Result<()> {
            Ok(())
        }

        fn resume(&self) -> Result<()> {
            Ok(())
        }

        fn send_event(&self, event: ScreenEvent) -> Result<()> {
            self.push_event(event);
            Ok(())
        }
    }

    #[test]
    fn recording_screen_replays_scripted_events_in_order() {
        let screen = RecordingScreen::new(80, 24);
        screen.push_event(ScreenEvent::Key(Key::Char('a')));
        screen.push_event(ScreenEvent::Resize { width: 100, height: 40 });
        assert_eq!(screen.poll_event().unwrap(), ScreenEvent::Key(Key::Char('a')));
        assert_eq!(screen.poll_event().unwrap(), ScreenEvent::Resize { width: 100, height: 40 });
        assert!(screen.poll_event().is_err());
    }

    #[test]
    fn draws_are_recorded_in_call_order() {
        let screen = RecordingScreen::new(80, 24);
        screen.print(0, 0, "hello", Attr::default());
        screen.put_cell(1, 0, 'x', Attr::default());
        assert_eq!(screen.draws(), vec!["print(0,0)=hello".to_string(), "cell(1,0)=x".to_string()]);
    }
}
