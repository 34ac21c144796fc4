//! Ordered set of lines keyed by id.
use crate::line::Line;
use crate::spinlock::SpinLock;
use std::collections::BTreeMap;

#[derive(Default)]
struct Inner {
    lines: BTreeMap<u64, Line>,
}

/// Guarded by the donor's CAS-based `SpinLock` (kept nearly verbatim — see
/// DESIGN.md) rather than a `std::sync::Mutex`, matching the low-contention,
/// short-critical-section access pattern this type sees.
pub struct Selection {
    inner: SpinLock<Inner>,
}

impl Selection {
    pub fn new() -> Self {
        Selection {
            inner: SpinLock::new(Inner::default()),
        }
    }

    pub fn add(&self, line: Line) {
        let mut inner = self.inner.lock();
        inner.lines.insert(line.id(), line);
    }

    pub fn remove(&self, id: u64) {
        let mut inner = self.inner.lock();
        inner.lines.remove(&id);
    }

    pub fn has(&self, id: u64) -> bool {
        self.inner.lock().lines.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) {
        self.inner.lock().lines.clear();
    }

    /// Visits every selected line in strictly ascending id order exactly
    /// once.
    pub fn ascend(&self, mut visitor: impl FnMut(&Line)) {
        let inner = self.inner.lock();
        for line in inner.lines.values() {
            visitor(line);
        }
    }

    /// Copy this selection's contents into `dst`. A no-op if `dst` is the
    /// same selection. Crossed copies (A→B concurrent with B→A) cannot
    /// deadlock because at most one lock is ever held at a time: this
    /// snapshots its own map under its own lock, releases it, then takes
    /// `dst`'s lock once to install the snapshot.
    pub fn copy(&self, dst: &Selection) {
        if std::ptr::eq(self, dst) {
            return;
        }
        let snapshot = self.inner.lock().lines.clone();
        let mut dst_inner = dst.inner.lock();
        dst_inner.lines = snapshot;
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn ascend_is_strictly_increasing_and_len_matches() {
        let sel = Selection::new();
        sel.add(Line::new(5, "e", false));
        sel.add(Line::new(1, "a", false));
        sel.add(Line::new(3, "c", false));
        let mut seen = Vec::new();
        sel.ascend(|line| seen.push(line.id()));
        assert_eq!(seen, vec![1, 3, 5]);
        assert_eq!(sel.len(), 3);

        sel.remove(3);
        assert_eq!(sel.len(), 2);
    }

    #[test]
    fn copy_to_self_is_a_no_op() {
        let sel = Selection::new();
        sel.add(Line::new(1, "a", false));
        sel.copy(&sel);
        assert_eq!(sel.len(), 1);
    }

    #[test]
    fn crossed_copies_do_not_deadlock() {
        let a = Arc::new(Selection::new());
        let b = Arc::new(Selection::new());
        a.add(Line::new(1, "a", false));
        b.add(Line::new(2, "b", false));

        let a1 = a.clone();
        let b1 = b.clone();
        let t1 = thread::spawn(move || {
            for _ in 0..200 {
                a1.copy(&b1);
            }
        });
        let a2 = a.clone();
        let b2 = b.clone();
        let t2 = thread::spawn(move || {
            for _ in 0..200 {
                b2.copy(&a2);
            }
        });
        t1.join().unwrap();
        t2.join().unwrap();
    }
}
