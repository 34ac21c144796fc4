//! Streaming ingest with capped memory, and the buffer family consumers read
//! from.
use crate::error::{PecoError, Result};
use crate::line::Line;
use crossbeam::channel::{bounded, Receiver, Sender};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

const READY_CHANNEL_SIZE: usize = 1;
const LINE_CHANNEL_SIZE: usize = 10_240;
/// Default cap on a single scanned line before a separator is seen.
pub const DEFAULT_MAX_SCAN_BUFFER_SIZE: usize = 256 * 1024;

/// Anything that can report its size and hand back a line by index. Shared
/// by `RingBuffer` (live), `MemoryBuffer` (frozen snapshot), `ContextBuffer`
/// (zoom-in view) and `FilteredBuffer` (page crop).
pub trait Buffer: Send + Sync {
    fn size(&self) -> usize;
    fn line_at(&self, i: usize) -> Option<Line>;
}

struct RingInner {
    capacity: usize,
    lines: Vec<Line>,
    completed: bool,
}

/// Bounded ordered sequence of lines read from a streaming source.
pub struct RingBuffer {
    inner: Mutex<RingInner>,
    ready_once: Arc<AtomicBool>,
    ready_rx: Receiver<()>,
    line_rx: Receiver<Line>,
}

impl RingBuffer {
    /// `capacity` of 0 means unbounded. `ansi` strips SGR escapes from
    /// each line's display text (see `Line::new_with_ansi`).
    #[allow(clippy::too_many_arguments)]
    pub fn new<R: BufRead + Send + 'static>(
        mut reader: R,
        capacity: usize,
        null_separator: bool,
        max_scan_buffer_size: usize,
        ansi: bool,
        id_source: impl Fn() -> u64 + Send + 'static,
    ) -> Arc<Self> {
        let (ready_tx, ready_rx) = bounded::<()>(READY_CHANNEL_SIZE);
        let (line_tx, line_rx): (Sender<Line>, Receiver<Line>) = bounded(LINE_CHANNEL_SIZE);

        let this = Arc::new(RingBuffer {
            inner: Mutex::new(RingInner {
                capacity,
                lines: Vec::new(),
                completed: false,
            }),
            ready_once: Arc::new(AtomicBool::new(false)),
            ready_rx,
            line_rx: line_rx.clone(),
        });

        let started = Arc::new(AtomicBool::new(false));
        let started_clone = started.clone();
        let ready_once = this.ready_once.clone();
        let separator = if null_separator { b'\0' } else { b'\n' };

        thread::spawn(move || {
            started_clone.store(true, Ordering::SeqCst);
            debug!("source: reader thread start");
            let mut buffer = Vec::with_capacity(1024);
            let line_ending = b'\n';
            let _ = separator;
            loop {
                buffer.clear();
                match read_capped_line(&mut reader, &mut buffer, line_ending, max_scan_buffer_size) {
                    Ok(0) => break,
                    Ok(_n) => {
                        strip_line_ending(&mut buffer);
                        let text = String::from_utf8_lossy(&buffer).to_string();
                        let id = id_source();
                        let line = Line::new_with_ansi(id, text, null_separator, ansi);
                        if !ready_once.swap(true, Ordering::SeqCst) {
                            let _ = ready_tx.send(());
                        }
                        if line_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            if !ready_once.swap(true, Ordering::SeqCst) {
                let _ = ready_tx.send(());
            }
            debug!("source: reader thread stop");
        });

        while !started.load(Ordering::SeqCst) {
            // busy-wait for the reader thread to register, matching the
            // donor's item_collector.rs start-synchronisation idiom.
        }

        this
    }

    /// Begin asynchronous reading. Blocks the caller until the first
    /// successful read (or EOF) has been observed, per the one-shot "ready"
    /// signal contract.
    pub fn setup(&self) {
        let _ = self.ready_rx.recv();
    }

    /// Drain any lines the reader thread has produced since the last call
    /// into the ring, evicting the oldest on overflow.
    pub fn drain_available(&self) {
        let mut inner = self.inner.lock().expect("RingBuffer poisoned");
        while let Ok(line) = self.line_rx.try_recv() {
            if inner.capacity > 0 && inner.lines.len() >= inner.capacity {
                inner.lines.remove(0);
            }
            inner.lines.push(line);
        }
    }

    /// Idempotent: mark end-of-input.
    pub fn mark_complete(&self) {
        let mut inner = self.inner.lock().expect("RingBuffer poisoned");
        inner.completed = true;
    }

    pub fn is_complete(&self) -> bool {
        self.inner.lock().expect("RingBuffer poisoned").completed
    }

    /// Re-emit all currently held lines via `visitor`, in id order.
    pub fn replay(&self, mut visitor: impl FnMut(&Line)) {
        self.drain_available();
        let inner = self.inner.lock().expect("RingBuffer poisoned");
        for line in inner.lines.iter() {
            visitor(line);
        }
    }
}

impl Buffer for RingBuffer {
    fn size(&self) -> usize {
        self.drain_available();
        self.inner.lock().expect("RingBuffer poisoned").lines.len()
    }

    fn line_at(&self, i: usize) -> Option<Line> {
        self.drain_available();
        self.inner.lock().expect("RingBuffer poisoned").lines.get(i).cloned()
    }
}

fn strip_line_ending(buffer: &mut Vec<u8>) {
    if buffer.ends_with(&[b'\r', b'\n']) {
        buffer.pop();
        buffer.pop();
    } else if buffer.ends_with(&[b'\n']) || buffer.ends_with(&[b'\0']) {
        buffer.pop();
    }
}

fn read_capped_line<R: BufRead>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
    delimiter: u8,
    max_scan_buffer_size: usize,
) -> Result<usize> {
    let mut total = 0;
    loop {
        let (done, used) = {
            let available = reader.fill_buf()?;
            if available.is_empty() {
                (true, 0)
            } else {
                match available.iter().position(|&b| b == delimiter) {
                    Some(i) => {
                        buffer.extend_from_slice(&available[..=i]);
                        (true, i + 1)
                    }
                    None => {
                        buffer.extend_from_slice(available);
                        (false, available.len())
                    }
                }
            }
        };
        reader.consume(used);
        total += used;
        if total > max_scan_buffer_size {
            return Err(PecoError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "line exceeded max scan buffer size",
            )));
        }
        if done {
            return Ok(total);
        }
    }
}

/// A frozen snapshot of another buffer's contents at the moment of freeze.
pub struct MemoryBuffer {
    lines: Vec<Line>,
}

impl MemoryBuffer {
    pub fn snapshot(source: &dyn Buffer) -> Self {
        let mut lines = Vec::with_capacity(source.size());
        for i in 0..source.size() {
            if let Some(line) = source.line_at(i) {
                lines.push(line);
            }
        }
        MemoryBuffer { lines }
    }
}

impl Buffer for MemoryBuffer {
    fn size(&self) -> usize {
        self.lines.len()
    }

    fn line_at(&self, i: usize) -> Option<Line> {
        self.lines.get(i).cloned()
    }
}

/// A crop of another buffer to `[offset, offset+len)`, used by the view to
/// present one page without copying the whole filtered result.
pub struct FilteredBuffer<'a> {
    inner: &'a dyn Buffer,
    offset: usize,
    len: usize,
}

impl<'a> FilteredBuffer<'a> {
    pub fn new(inner: &'a dyn Buffer, offset: usize, len: usize) -> Self {
        FilteredBuffer { inner, offset, len }
    }
}

impl<'a> Buffer for FilteredBuffer<'a> {
    fn size(&self) -> usize {
        self.len.min(self.inner.size().saturating_sub(self.offset))
    }

    fn line_at(&self, i: usize) -> Option<Line> {
        if i >= self.size() {
            return None;
        }
        self.inner.line_at(self.offset + i)
    }
}

/// A filtered-buffer view expanded with up to `context_radius` surrounding
/// source lines around every match, overlapping windows merged.
pub struct ContextBuffer {
    lines: Vec<Line>,
    /// Maps a filtered-buffer index to its position in the expanded sequence.
    match_entry_indices: Vec<usize>,
}

impl ContextBuffer {
    pub fn build(filtered: &dyn Buffer, source: &dyn Buffer, context_radius: usize) -> Self {
        // Determine the source index of every filtered line by matching ids.
        let mut source_by_id = std::collections::HashMap::new();
        for i in 0..source.size() {
            if let Some(line) = source.line_at(i) {
                source_by_id.insert(line.id(), i);
            }
        }

        let mut windows: Vec<(usize, usize)> = Vec::new();
        let mut match_source_indices = Vec::new();
        for i in 0..filtered.size() {
            if let Some(line) = filtered.line_at(i) {
                if let Some(&src_idx) = source_by_id.get(&line.id()) {
                    match_source_indices.push(src_idx);
                    let start = src_idx.saturating_sub(context_radius);
                    let end = (src_idx + context_radius).min(source.size().saturating_sub(1));
                    windows.push((start, end));
                }
            }
        }

        // merge overlapping/adjacent windows
        windows.sort_unstable();
        let mut merged: Vec<(usize, usize)> = Vec::new();
        for (s, e) in windows {
            if let Some(last) = merged.last_mut() {
                if s <= last.1 + 1 {
                    last.1 = last.1.max(e);
                    continue;
                }
            }
            merged.push((s, e));
        }

        let mut lines = Vec::new();
        let mut index_of_source = std::collections::HashMap::new();
        for (s, e) in merged {
            for idx in s..=e {
                if let Some(line) = source.line_at(idx) {
                    index_of_source.insert(idx, lines.len());
                    lines.push(line);
                }
            }
        }

        let match_entry_indices = match_source_indices
            .into_iter()
            .map(|src_idx| *index_of_source.get(&src_idx).expect("window covers every match"))
            .collect();

        ContextBuffer { lines, match_entry_indices }
    }

    pub fn match_entry_indices(&self) -> &[usize] {
        &self.match_entry_indices
    }
}

impl Buffer for ContextBuffer {
    fn size(&self) -> usize {
        self.lines.len()
    }

    fn line_at(&self, i: usize) -> Option<Line> {
        self.lines.get(i).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::AtomicU64;

    fn id_counter() -> impl Fn() -> u64 {
        let counter = AtomicU64::new(0);
        move || counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    #[test]
    fn ids_strictly_increase_and_capacity_is_enforced() {
        let data = Cursor::new("1\n2\n3\n4\n5\n".to_string());
        let ring = RingBuffer::new(data, 3, false, DEFAULT_MAX_SCAN_BUFFER_SIZE, false, id_counter());
        ring.setup();
        // give the reader thread a moment to push everything through
        while !ring.is_complete() {
            ring.drain_available();
            if ring.line_rx.is_empty() && ring.size() >= 3 {
                break;
            }
        }
        ring.drain_available();
        assert!(ring.size() <= 3);
        let mut prev = 0;
        for i in 0..ring.size() {
            let line = ring.line_at(i).unwrap();
            assert!(line.id() > prev);
            prev = line.id();
        }
    }

    #[test]
    fn null_separator_mode_splits_lines() {
        let data = Cursor::new("one\x00A\ntwo\x00B\nthree\x00C\n".to_string());
        let ring = RingBuffer::new(data, 0, true, DEFAULT_MAX_SCAN_BUFFER_SIZE, false, id_counter());
        ring.setup();
        loop {
            ring.drain_available();
            if ring.size() >= 3 {
                break;
            }
        }
        assert_eq!(ring.line_at(0).unwrap().output(), "A");
        assert_eq!(ring.line_at(2).unwrap().output(), "C");
    }

    #[test]
    fn memory_buffer_is_a_frozen_snapshot() {
        let data = Cursor::new("a\nb\nc\n".to_string());
        let ring = RingBuffer::new(data, 0, false, DEFAULT_MAX_SCAN_BUFFER_SIZE, false, id_counter());
        ring.setup();
        loop {
            ring.drain_available();
            if ring.size() >= 3 {
                break;
            }
        }
        let snapshot = MemoryBuffer::snapshot(&*ring);
        assert_eq!(snapshot.size(), 3);
        assert_eq!(snapshot.line_at(0).unwrap().display(), "a");
    }

    #[test]
    fn context_buffer_merges_overlapping_windows() {
        let data = Cursor::new("l0\nl1\nl2\nl3\nl4\nl5\n".to_string());
        let ring = RingBuffer::new(data, 0, false, DEFAULT_MAX_SCAN_BUFFER_SIZE, false, id_counter());
        ring.setup();
        loop {
            ring.drain_available();
            if ring.size() >= 6 {
                break;
            }
        }
        // pretend lines 1 and 2 matched: radius-1 windows [0,2] and [1,3] merge
        let l1 = ring.line_at(1).unwrap();
        let l2 = ring.line_at(2).unwrap();
        let filtered = MemoryBuffer { lines: vec![l1, l2] };
        let ctx = ContextBuffer::build(&filtered, &*ring, 1);
        assert_eq!(ctx.size(), 4); // l0..l3
        assert_eq!(ctx.match_entry_indices(), &[1, 2]);
    }
}
