use chaingraph_core::BusConfig;
use metrics::counter;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};

use crate::error::{BusError, HandlerError, Result};
use crate::history::HistoryEntry;
use crate::publisher::{BusCounters, BusStats, Publisher};
use crate::vocabulary::{Delivery, Vocabulary};
use crate::BusMessage;

pub type HandlerResult = std::result::Result<(), HandlerError>;

pub type Handler<S, M> =
    Box<dyn FnMut(&mut S, M, &mut BusContext<'_, M>) -> HandlerResult + Send + 'static>;

/// What a handler sees of the bus while it runs.
pub struct BusContext<'a, M: BusMessage> {
    publisher: &'a Publisher<M>,
    immediate: &'a mut VecDeque<M>,
    clear_history: &'a mut bool,
}

impl<'a, M: BusMessage> BusContext<'a, M> {
    /// Synchronous messages run right after the current handler returns, ahead of
    /// everything already queued. Deferred messages join the queue. A no-op while
    /// replaying.
    pub fn publish(&mut self, message: M) -> Result<()> {
        let spec = self.publisher.vocabulary().spec(message.name())?;
        if self.publisher.is_replaying() {
            self.publisher.suppress(&message);
            return Ok(());
        }
        match spec.delivery {
            Delivery::Synchronous => {
                self.publisher.counters().published.fetch_add(1, Ordering::Relaxed);
                counter!("bus_messages_published").increment(1);
                self.immediate.push_back(message);
            }
            Delivery::Deferred => self.publisher.enqueue(message),
        }
        Ok(())
    }

    /// See [`Publisher::map_result`].
    pub fn map_result<T, E, F, S, R>(&self, fetch: F, on_success: S, on_error: R)
    where
        T: Send + 'static,
        E: Send + 'static,
        F: std::future::Future<Output = std::result::Result<T, E>> + Send + 'static,
        S: FnOnce(T) -> M + Send + 'static,
        R: FnOnce(E) -> M + Send + 'static,
    {
        self.publisher.map_result(fetch, on_success, on_error)
    }

    pub fn is_replaying(&self) -> bool {
        self.publisher.is_replaying()
    }

    pub fn publisher(&self) -> Publisher<M> {
        self.publisher.clone()
    }

    /// Drops the recorded history once the current message is handled. The
    /// message itself is not recorded.
    pub fn clear_history(&mut self) {
        *self.clear_history = true;
    }
}

/// Single-threaded event loop over a closed message vocabulary.
///
/// `S` is the state every handler mutates. Deferred messages and fetch results
/// arrive over an unbounded channel and are dispatched one at a time by
/// [`MessageBus::run_until_idle`].
pub struct MessageBus<S, M: BusMessage> {
    vocabulary: Arc<Vocabulary>,
    handlers: HashMap<&'static str, Vec<Handler<S, M>>>,
    publisher: Publisher<M>,
    rx: UnboundedReceiver<M>,
    history: Vec<HistoryEntry<M>>,
    record_history: bool,
    snapshot_idle: Duration,
    snapshot_message: Option<M>,
    undo_redo_message: Option<M>,
    deadline: Option<Instant>,
    dirty: bool,
    counters: Arc<BusCounters>,
}

enum Wake<M> {
    Message(Option<M>),
    /// A fetch finished; its message, if any, is already queued.
    Settled,
    Timer,
}

impl<S, M: BusMessage> MessageBus<S, M> {
    pub fn new(vocabulary: Vocabulary, config: &BusConfig) -> Self {
        let vocabulary = Arc::new(vocabulary);
        let counters = Arc::new(BusCounters::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let publisher = Publisher::new(tx, vocabulary.clone(), counters.clone());
        Self {
            vocabulary,
            handlers: HashMap::new(),
            publisher,
            rx,
            history: Vec::new(),
            record_history: config.record_history,
            snapshot_idle: Duration::from_millis(config.snapshot_idle_ms),
            snapshot_message: None,
            undo_redo_message: None,
            deadline: None,
            dirty: false,
            counters,
        }
    }

    /// Message published when the graph has been idle for the snapshot window.
    pub fn with_snapshot_message(mut self, message: M) -> Result<Self> {
        self.check_control(&message)?;
        self.snapshot_message = Some(message);
        Ok(self)
    }

    /// Message dispatched right after every dirty message.
    pub fn with_undo_redo_message(mut self, message: M) -> Result<Self> {
        self.check_control(&message)?;
        self.undo_redo_message = Some(message);
        Ok(self)
    }

    fn check_control(&self, message: &M) -> Result<()> {
        let spec = self.vocabulary.spec(message.name())?;
        if spec.dirty {
            return Err(BusError::InvalidControlMessage {
                name: spec.name.to_string(),
                reason: "control messages must not be dirty".to_string(),
            });
        }
        Ok(())
    }

    pub fn subscribe<F>(&mut self, name: &str, handler: F) -> Result<()>
    where
        F: FnMut(&mut S, M, &mut BusContext<'_, M>) -> HandlerResult + Send + 'static,
    {
        let spec = self.vocabulary.spec(name)?;
        self.handlers
            .entry(spec.name)
            .or_default()
            .push(Box::new(handler));
        Ok(())
    }

    pub fn publisher(&self) -> Publisher<M> {
        self.publisher.clone()
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Synchronous messages are handled before this returns; deferred ones are
    /// queued for [`Self::run_until_idle`].
    pub fn publish(&mut self, state: &mut S, message: M) -> Result<()> {
        let spec = self.vocabulary.spec(message.name())?;
        if self.publisher.is_replaying() {
            self.publisher.suppress(&message);
            return Ok(());
        }
        match spec.delivery {
            Delivery::Synchronous => {
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                counter!("bus_messages_published").increment(1);
                self.dispatch(state, message)
            }
            Delivery::Deferred => {
                self.publisher.enqueue(message);
                Ok(())
            }
        }
    }

    /// Dispatches queued messages and fetch results until nothing is queued, no
    /// fetch is in flight and no snapshot is pending.
    pub async fn run_until_idle(&mut self, state: &mut S) -> Result<()> {
        self.drive(state, None).await
    }

    /// Like [`Self::run_until_idle`] but returns once `window` has elapsed, even if
    /// work remains.
    pub async fn run_for(&mut self, state: &mut S, window: Duration) -> Result<()> {
        self.drive(state, Some(Instant::now() + window)).await
    }

    async fn drive(&mut self, state: &mut S, until: Option<Instant>) -> Result<()> {
        loop {
            // Read before polling the queue: fetch tasks enqueue before they
            // decrement, so zero here plus an empty queue means nothing is coming.
            let in_flight = self.publisher.in_flight();
            match self.rx.try_recv() {
                Ok(message) => {
                    self.dispatch(state, message)?;
                    continue;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => return Ok(()),
            }

            let now = Instant::now();
            if let Some(deadline) = self.deadline.filter(|d| *d <= now) {
                debug!(?deadline, "snapshot deadline reached");
                self.fire_snapshot(state)?;
                continue;
            }
            match until {
                Some(until) if now >= until => return Ok(()),
                None if in_flight == 0 && self.deadline.is_none() => return Ok(()),
                _ => {}
            }

            let wake_at = match (self.deadline, until) {
                (Some(d), Some(u)) => Some(d.min(u)),
                (d, u) => d.or(u),
            };
            let wake = tokio::select! {
                biased;
                message = self.rx.recv() => Wake::Message(message),
                _ = self.publisher.settled(), if in_flight > 0 => Wake::Settled,
                _ = sleep_until(wake_at.unwrap_or(now)), if wake_at.is_some() => Wake::Timer,
            };
            match wake {
                Wake::Message(Some(message)) => self.dispatch(state, message)?,
                Wake::Message(None) => return Ok(()),
                Wake::Settled | Wake::Timer => {}
            }
        }
    }

    fn fire_snapshot(&mut self, state: &mut S) -> Result<()> {
        self.deadline = None;
        let Some(message) = self.snapshot_message.clone() else {
            return Ok(());
        };
        self.counters.snapshots.fetch_add(1, Ordering::Relaxed);
        counter!("bus_snapshots").increment(1);
        self.dispatch(state, message)
    }

    /// Handles `message` and every synchronous message published while doing so.
    fn dispatch(&mut self, state: &mut S, message: M) -> Result<()> {
        let mut immediate = VecDeque::from([message]);
        while let Some(message) = immediate.pop_front() {
            self.dispatch_one(state, message, &mut immediate)?;
        }
        Ok(())
    }

    fn dispatch_one(&mut self, state: &mut S, message: M, immediate: &mut VecDeque<M>) -> Result<()> {
        let spec = self.vocabulary.spec(message.name())?;
        let replaying = self.publisher.is_replaying();
        let mut clear_history = false;

        if self.record_history && !replaying {
            self.history.push(HistoryEntry::new(message.clone()));
        }
        debug!(message = spec.name, replaying, "calling");
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        counter!("bus_messages_dispatched").increment(1);

        if let Some(handlers) = self.handlers.get_mut(spec.name) {
            let mut ctx = BusContext {
                publisher: &self.publisher,
                immediate: &mut *immediate,
                clear_history: &mut clear_history,
            };
            for handler in handlers.iter_mut() {
                if let Err(source) = handler(state, message.clone(), &mut ctx) {
                    error!(message = spec.name, "handler failed: {}", source);
                    return Err(BusError::Handler {
                        name: spec.name,
                        source,
                    });
                }
            }
        } else {
            debug!(message = spec.name, "no handler subscribed");
        }

        if clear_history {
            info!(dropped = self.history.len(), "call history cleared");
            self.history.clear();
            self.deadline = None;
            self.dirty = false;
            return Ok(());
        }

        if spec.dirty && !replaying {
            self.dirty = true;
            if let Some(disable) = self.undo_redo_message.clone() {
                self.dispatch_one(state, disable, immediate)?;
            }
            if self.snapshot_message.is_some() {
                self.deadline = Some(Instant::now() + self.snapshot_idle);
            }
        }
        Ok(())
    }

    /// Re-dispatches the recorded history with publishing and fetching disabled.
    /// The history itself is left as it was.
    pub fn replay(&mut self, state: &mut S) -> Result<()> {
        let history: Vec<M> = self.history.iter().map(|e| e.message.clone()).collect();
        info!(messages = history.len(), "replaying call history");
        self.publisher.set_replaying(true);
        let result = self.replay_messages(state, history);
        self.publisher.set_replaying(false);
        result
    }

    fn replay_messages(&mut self, state: &mut S, messages: Vec<M>) -> Result<()> {
        for message in messages {
            let mut immediate = VecDeque::new();
            self.dispatch_one(state, message, &mut immediate)?;
        }
        Ok(())
    }

    pub fn history(&self) -> &[HistoryEntry<M>] {
        &self.history
    }

    pub fn history_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.history)?)
    }

    /// Replaces the history, e.g. to recover a session with [`Self::replay`].
    pub fn load_history_json(&mut self, json: &str) -> Result<()> {
        let history: Vec<HistoryEntry<M>> = serde_json::from_str(json)?;
        for entry in &history {
            self.vocabulary.spec(entry.message.name())?;
        }
        self.history = history;
        Ok(())
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// True once a dirty message has been handled since the last `mark_clean`.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn snapshot_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.counters.published.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            suppressed: self.counters.suppressed.load(Ordering::Relaxed),
            snapshots: self.counters.snapshots.load(Ordering::Relaxed),
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            fetches_in_flight: self.publisher.in_flight(),
        }
    }
}
