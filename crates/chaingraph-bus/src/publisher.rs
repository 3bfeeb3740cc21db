use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::Result;
use crate::vocabulary::Vocabulary;
use crate::BusMessage;

/// Counters shared between the bus and its publishers.
#[derive(Debug, Default)]
pub(crate) struct BusCounters {
    pub published: AtomicU64,
    pub dispatched: AtomicU64,
    pub suppressed: AtomicU64,
    pub snapshots: AtomicU64,
    pub fetches: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    pub published: u64,
    pub dispatched: u64,
    pub suppressed: u64,
    pub snapshots: u64,
    pub fetches: u64,
    pub fetches_in_flight: usize,
}

/// Cloneable handle that enqueues deferred messages and spawns fetches.
pub struct Publisher<M> {
    tx: UnboundedSender<M>,
    vocabulary: Arc<Vocabulary>,
    replaying: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    settled: Arc<Notify>,
    counters: Arc<BusCounters>,
}

/// Holds one in-flight slot for a spawned fetch. Released on completion and on
/// unwind alike.
struct FetchGuard {
    in_flight: Arc<AtomicUsize>,
    settled: Arc<Notify>,
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        let pending = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        gauge!("bus_fetches_in_flight").set(pending as f64);
        self.settled.notify_one();
    }
}

impl<M> Clone for Publisher<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            vocabulary: self.vocabulary.clone(),
            replaying: self.replaying.clone(),
            in_flight: self.in_flight.clone(),
            settled: self.settled.clone(),
            counters: self.counters.clone(),
        }
    }
}

impl<M: BusMessage> Publisher<M> {
    pub(crate) fn new(
        tx: UnboundedSender<M>,
        vocabulary: Arc<Vocabulary>,
        counters: Arc<BusCounters>,
    ) -> Self {
        Self {
            tx,
            vocabulary,
            replaying: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            settled: Arc::new(Notify::new()),
            counters,
        }
    }

    /// Queues a message for a later turn of the event loop, whatever its declared
    /// delivery mode. A no-op while replaying.
    pub fn publish(&self, message: M) -> Result<()> {
        self.vocabulary.spec(message.name())?;
        if self.is_replaying() {
            self.suppress(&message);
            return Ok(());
        }
        self.enqueue(message);
        Ok(())
    }

    pub(crate) fn enqueue(&self, message: M) {
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        counter!("bus_messages_published").increment(1);
        if let Err(e) = self.tx.send(message) {
            warn!("bus receiver dropped, message lost: {:?}", e.0);
        }
    }

    pub(crate) fn suppress(&self, message: &M) {
        self.counters.suppressed.fetch_add(1, Ordering::Relaxed);
        counter!("bus_messages_suppressed").increment(1);
        debug!(message = message.name(), "omit publishing while replaying");
    }

    /// The single fetch boundary. Spawns `fetch` and routes its outcome back as a
    /// deferred message. While replaying nothing is spawned; a continuation that
    /// completes during a replay is dropped.
    pub fn map_result<T, E, F, S, R>(&self, fetch: F, on_success: S, on_error: R)
    where
        T: Send + 'static,
        E: Send + 'static,
        F: Future<Output = std::result::Result<T, E>> + Send + 'static,
        S: FnOnce(T) -> M + Send + 'static,
        R: FnOnce(E) -> M + Send + 'static,
    {
        if self.is_replaying() {
            self.counters.suppressed.fetch_add(1, Ordering::Relaxed);
            counter!("bus_fetches_suppressed").increment(1);
            debug!("omit fetch while replaying");
            return;
        }

        self.counters.fetches.fetch_add(1, Ordering::Relaxed);
        counter!("bus_fetches_spawned").increment(1);
        let pending = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!("bus_fetches_in_flight").set(pending as f64);

        let guard = FetchGuard {
            in_flight: self.in_flight.clone(),
            settled: self.settled.clone(),
        };
        let publisher = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let message = match fetch.await {
                Ok(value) => on_success(value),
                Err(error) => on_error(error),
            };
            if publisher.is_replaying() {
                publisher.suppress(&message);
            } else {
                publisher.enqueue(message);
            }
        });
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying.load(Ordering::SeqCst)
    }

    pub(crate) fn set_replaying(&self, replaying: bool) {
        self.replaying.store(replaying, Ordering::SeqCst);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resolves once a fetch has finished since the last wake-up, whether it
    /// produced a message or not.
    pub(crate) async fn settled(&self) {
        self.settled.notified().await
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub(crate) fn counters(&self) -> &BusCounters {
        &self.counters
    }
}
