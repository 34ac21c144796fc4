//! Typed message channels between the worker threads (query execution,
//! the reader) and the UI driver, plus batch mode.
//!
//! Grounded on `Skim::run_with`'s `std::sync::mpsc::channel()` event wiring
//! in `src/lib.rs` (a single `EventSender`/`EventReceiver` pair shuttling
//! one enum between the input thread and the model loop); generalised here
//! into one bounded `crossbeam_channel` per message kind, each send
//! rendezvousing on a one-shot `std::sync::mpsc` ack the way the donor's
//! `term.send_event(TermEvent::User1)` / input-thread-join shutdown
//! handshake does.
use crate::error::{PecoError, Result};
use crossbeam::channel::{bounded, Receiver, Sender};
use std::sync::mpsc;
use std::sync::Mutex;

const CHANNEL_CAPACITY: usize = 5;

#[derive(Debug, Clone)]
pub struct DrawMsg;

#[derive(Debug, Clone)]
pub struct DrawPromptMsg;

#[derive(Debug, Clone)]
pub struct QueryMsg {
    pub query: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PagingMsg {
    pub delta: isize,
}

#[derive(Debug, Clone)]
pub struct StatusMsg {
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ClearStatusMsg;

/// A delivered message plus the one-shot channel its receiver must signal
/// once it has finished handling it.
pub struct Envelope<T> {
    payload: T,
    done_tx: mpsc::Sender<()>,
}

impl<T> Envelope<T> {
    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Signal that this message has been handled. Dropping an `Envelope`
    /// without calling `ack` also unblocks the sender (the `done_tx` side
    /// closes), but the sender cannot distinguish that from a handled
    /// message, so receivers should always call `ack` explicitly.
    pub fn ack(self) {
        let _ = self.done_tx.send(());
    }
}

struct Channel<T> {
    tx: Sender<Envelope<T>>,
    rx: Receiver<Envelope<T>>,
}

impl<T> Channel<T> {
    fn new() -> Self {
        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        Channel { tx, rx }
    }

    /// Send `payload` and block until the receiver acks it.
    fn send(&self, payload: T) -> Result<()> {
        let (done_tx, done_rx) = mpsc::channel();
        self.tx
            .send(Envelope { payload, done_tx })
            .map_err(|_| PecoError::Internal("hub channel closed".to_string()))?;
        done_rx
            .recv()
            .map_err(|_| PecoError::Internal("hub receiver dropped message without acking".to_string()))
    }

    fn recv(&self) -> Result<Envelope<T>> {
        self.rx.recv().map_err(|_| PecoError::Internal("hub channel closed".to_string()))
    }
}

/// One message dispatched through `Batcher`, deferred until the batch
/// flushes, then replayed against the real channel in original send order.
type QueuedSend = Box<dyn FnOnce(&Hub) -> Result<()> + Send>;

pub struct Hub {
    draw: Channel<DrawMsg>,
    draw_prompt: Channel<DrawPromptMsg>,
    query: Channel<QueryMsg>,
    paging: Channel<PagingMsg>,
    status: Channel<StatusMsg>,
    clear_status: Channel<ClearStatusMsg>,
    /// `Some` while a batch is in progress; sends made through a `Batcher`
    /// append here instead of rendezvousing immediately. An explicit field
    /// on `Hub`, not a context value or thread-local, per the redesign this
    /// crate follows.
    active_batch: Mutex<Option<Vec<QueuedSend>>>,
}

impl Hub {
    pub fn new() -> Self {
        Hub {
            draw: Channel::new(),
            draw_prompt: Channel::new(),
            query: Channel::new(),
            paging: Channel::new(),
            status: Channel::new(),
            clear_status: Channel::new(),
            active_batch: Mutex::new(None),
        }
    }

    pub fn send_draw(&self, msg: DrawMsg) -> Result<()> {
        self.dispatch(msg, |hub, m| hub.draw.send(m))
    }

    pub fn send_draw_prompt(&self, msg: DrawPromptMsg) -> Result<()> {
        self.dispatch(msg, |hub, m| hub.draw_prompt.send(m))
    }

    pub fn send_query(&self, msg: QueryMsg) -> Result<()> {
        self.dispatch(msg, |hub, m| hub.query.send(m))
    }

    pub fn send_paging(&self, msg: PagingMsg) -> Result<()> {
        self.dispatch(msg, |hub, m| hub.paging.send(m))
    }

    pub fn send_status(&self, msg: StatusMsg) -> Result<()> {
        self.dispatch(msg, |hub, m| hub.status.send(m))
    }

    pub fn send_clear_status(&self, msg: ClearStatusMsg) -> Result<()> {
        self.dispatch(msg, |hub, m| hub.clear_status.send(m))
    }

    pub fn recv_draw(&self) -> Result<Envelope<DrawMsg>> {
        self.draw.recv()
    }

    pub fn recv_draw_prompt(&self) -> Result<Envelope<DrawPromptMsg>> {
        self.draw_prompt.recv()
    }

    pub fn recv_query(&self) -> Result<Envelope<QueryMsg>> {
        self.query.recv()
    }

    pub fn recv_paging(&self) -> Result<Envelope<PagingMsg>> {
        self.paging.recv()
    }

    pub fn recv_status(&self) -> Result<Envelope<StatusMsg>> {
        self.status.recv()
    }

    pub fn recv_clear_status(&self) -> Result<Envelope<ClearStatusMsg>> {
        self.clear_status.recv()
    }

    /// Queue `msg` if a batch is active, otherwise send it immediately.
    fn dispatch<T: Send + 'static>(&self, msg: T, send: impl Fn(&Hub, T) -> Result<()> + Send + 'static) -> Result<()> {
        let mut active = self.active_batch.lock().expect("hub batch mutex poisoned");
        if let Some(queue) = active.as_mut() {
            queue.push(Box::new(move |hub: &Hub| send(hub, msg)));
            return Ok(());
        }
        drop(active);
        send(self, msg)
    }

    /// Run `f` with a `Batcher`: sends made through it are queued and
    /// flushed in order once `f` returns. A `batch` call nested inside
    /// another (on the same `Hub`) runs `f` inline against the already-active
    /// queue instead of starting a second one, and does not flush early.
    pub fn batch(&self, f: impl FnOnce(&Batcher)) -> Result<()> {
        let already_active = self.active_batch.lock().expect("hub batch mutex poisoned").is_some();
        if already_active {
            let batcher = Batcher { hub: self };
            f(&batcher);
            return Ok(());
        }

        *self.active_batch.lock().expect("hub batch mutex poisoned") = Some(Vec::new());
        let batcher = Batcher { hub: self };
        f(&batcher);

        let queued = self
            .active_batch
            .lock()
            .expect("hub batch mutex poisoned")
            .take()
            .unwrap_or_default();
        for send in queued {
            send(self)?;
        }
        Ok(())
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// One message pulled off whichever of the six channels had something
/// ready, for a single thread that wants to multiplex all of them instead
/// of dedicating one thread per channel.
pub enum HubEvent {
    Draw(Envelope<DrawMsg>),
    DrawPrompt(Envelope<DrawPromptMsg>),
    Query(Envelope<QueryMsg>),
    Paging(Envelope<PagingMsg>),
    Status(Envelope<StatusMsg>),
    ClearStatus(Envelope<ClearStatusMsg>),
}

impl Hub {
    /// Block until any channel has a message ready, then return it. Used by
    /// the view loop, which is the single reader across all six kinds.
    pub fn select(&self) -> Result<HubEvent> {
        use crossbeam::channel::Select;
        let mut sel = Select::new();
        let i_draw = sel.recv(&self.draw.rx);
        let i_draw_prompt = sel.recv(&self.draw_prompt.rx);
        let i_query = sel.recv(&self.query.rx);
        let i_paging = sel.recv(&self.paging.rx);
        let i_status = sel.recv(&self.status.rx);
        let i_clear_status = sel.recv(&self.clear_status.rx);
        let oper = sel.select();
        let idx = oper.index();
        let closed = || PecoError::Internal("hub channel closed".to_string());
        if idx == i_draw {
            oper.recv(&self.draw.rx).map(HubEvent::Draw).map_err(|_| closed())
        } else if idx == i_draw_prompt {
            oper.recv(&self.draw_prompt.rx).map(HubEvent::DrawPrompt).map_err(|_| closed())
        } else if idx == i_query {
            oper.recv(&self.query.rx).map(HubEvent::Query).map_err(|_| closed())
        } else if idx == i_paging {
            oper.recv(&self.paging.rx).map(HubEvent::Paging).map_err(|_| closed())
        } else if idx == i_status {
            oper.recv(&self.status.rx).map(HubEvent::Status).map_err(|_| closed())
        } else {
            oper.recv(&self.clear_status.rx).map(HubEvent::ClearStatus).map_err(|_| closed())
        }
    }
}

/// Handed to the closure passed to `Hub::batch`. Every `send_*` call here
/// queues instead of blocking; the real sends happen once the batch
/// returns.
pub struct Batcher<'h> {
    hub: &'h Hub,
}

impl<'h> Batcher<'h> {
    pub fn send_draw(&self, msg: DrawMsg) {
        let _ = self.hub.send_draw(msg);
    }

    pub fn send_draw_prompt(&self, msg: DrawPromptMsg) {
        let _ = self.hub.send_draw_prompt(msg);
    }

    pub fn send_query(&self, msg: QueryMsg) {
        let _ = self.hub.send_query(msg);
    }

    pub fn send_paging(&self, msg: PagingMsg) {
        let _ = self.hub.send_paging(msg);
    }

    pub fn send_status(&self, msg: StatusMsg) {
        let _ = self.hub.send_status(msg);
    }

    pub fn send_clear_status(&self, msg: ClearStatusMsg) {
        let _ = self.hub.send_clear_status(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn send_blocks_until_receiver_acks() {
        let hub = Arc::new(Hub::new());
        let worker = thread::spawn({
            let hub = hub.clone();
            move || {
                let envelope = hub.recv_draw().unwrap();
                envelope.ack();
            }
        });
        hub.send_draw(DrawMsg).expect("send should complete once acked");
        worker.join().unwrap();
    }

    #[test]
    fn batch_defers_sends_until_closure_returns_then_flushes_in_order() {
        let hub = Arc::new(Hub::new());
        let worker = thread::spawn({
            let hub = hub.clone();
            move || {
                let mut received = Vec::new();
                for _ in 0..2 {
                    let envelope = hub.recv_status().unwrap();
                    received.push(envelope.payload().text.clone());
                    envelope.ack();
                }
                received
            }
        });
        hub.batch(|b| {
            b.send_status(StatusMsg { text: "first".into() });
            b.send_status(StatusMsg { text: "second".into() });
        })
        .unwrap();
        assert_eq!(worker.join().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn nested_batch_runs_inline_against_the_same_queue() {
        let hub = Arc::new(Hub::new());
        let worker = thread::spawn({
            let hub = hub.clone();
            move || {
                for _ in 0..2 {
                    let envelope = hub.recv_clear_status().unwrap();
                    envelope.ack();
                }
            }
        });
        hub.batch(|outer| {
            outer.send_clear_status(ClearStatusMsg);
            hub.batch(|inner| {
                inner.send_clear_status(ClearStatusMsg);
            })
            .unwrap();
        })
        .unwrap();
        worker.join().unwrap();
    }

    #[test]
    fn select_multiplexes_across_every_channel_kind() {
        let hub = Arc::new(Hub::new());
        let sender = thread::spawn({
            let hub = hub.clone();
            move || {
                hub.send_status(StatusMsg { text: "hi".into() }).unwrap();
            }
        });
        match hub.select().unwrap() {
            HubEvent::Status(envelope) => {
                assert_eq!(envelope.payload().text, "hi");
                envelope.ack();
            }
            _ => panic!("expected a Status event"),
        }
        sender.join().unwrap();
    }
}
