//! Process-wide monotonic id generator.
//!
//! Generalises the donor's `global.rs` atomic-counter pattern into a
//! channel-backed producer: a dedicated thread counts up and pushes each id
//! onto a bounded channel, so handing out an id is a single non-allocating
//! channel receive.
use crossbeam::channel::{bounded, Receiver};
use std::thread;

const ID_CHANNEL_SIZE: usize = 1024;

pub struct IdGen {
    rx: Receiver<u64>,
}

impl IdGen {
    /// Spawn the producer thread. The first id handed out is 1.
    pub fn new() -> Self {
        let (tx, rx) = bounded(ID_CHANNEL_SIZE);
        thread::spawn(move || {
            let mut next: u64 = 1;
            loop {
                if tx.send(next).is_err() {
                    break;
                }
                next += 1;
            }
        });
        IdGen { rx }
    }

    /// Take the next id. Blocks only if the producer hasn't caught up yet,
    /// which in practice never happens given the channel's buffer.
    pub fn next_id(&self) -> u64 {
        self.rx.recv().expect("id generator thread died")
    }
}

impl Default for IdGen {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_start_at_one_and_increase() {
        let gen = IdGen::new();
        assert_eq!(gen.next_id(), 1);
        assert_eq!(gen.next_id(), 2);
        assert_eq!(gen.next_id(), 3);
    }

    #[test]
    fn ids_are_unique_under_many_calls() {
        let gen = IdGen::new();
        let mut seen = HashSet::new();
        for _ in 0..2000 {
            assert!(seen.insert(gen.next_id()));
        }
    }
}
