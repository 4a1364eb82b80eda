//! In-process pub/sub event bus (§4.9).
//!
//! Delivery to any one subscriber preserves emission order. Delivery is
//! best-effort and non-blocking: a full subscriber queue drops its oldest
//! event and increments a per-subscriber drop counter instead of
//! backpressuring the emitter.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::error;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::event::TelemetryEvent;

pub const DEFAULT_SUBSCRIBER_QUEUE_SIZE: usize = 1024;

struct SubscriberQueue {
    id: u64,
    buf: Mutex<VecDeque<TelemetryEvent>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
    closed: std::sync::atomic::AtomicBool,
}

impl SubscriberQueue {
    fn push(&self, event: TelemetryEvent) -> Option<u64> {
        let mut buf = self.buf.lock();
        let dropped = if buf.len() >= self.capacity {
            buf.pop_front();
            Some(self.dropped.fetch_add(1, Ordering::SeqCst) + 1)
        } else {
            None
        };
        buf.push_back(event);
        drop(buf);
        self.notify.notify_one();
        dropped
    }
}

/// A handle that unsubscribes its handler when dropped or when
/// `unsubscribe()` is called explicitly.
pub struct Unsubscribe {
    queue: Arc<SubscriberQueue>,
    task: Option<JoinHandle<()>>,
}

impl Unsubscribe {
    pub fn unsubscribe(mut self) {
        self.do_unsubscribe();
    }

    fn do_unsubscribe(&mut self) {
        self.queue.closed.store(true, Ordering::SeqCst);
        self.queue.notify.notify_one();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.do_unsubscribe();
    }
}

/// The process's single event bus instance (§3 Ownership). Subscriber set
/// mutation uses its own lock, independent from the per-subscriber queue
/// locks, so emitters never block behind subscribe/unsubscribe churn.
pub struct EventBus {
    subscribers: Mutex<Vec<Arc<SubscriberQueue>>>,
    next_id: AtomicU64,
    on_drop: Mutex<Option<Arc<dyn Fn(u64, u64) + Send + Sync>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            on_drop: Mutex::new(None),
        }
    }

    /// Registers a callback invoked whenever any subscriber drops an
    /// event for being over capacity; used by the connector to emit a
    /// `TELEMETRY_DROPPED` event without this crate depending on the
    /// event store.
    pub fn on_subscriber_drop(&self, callback: Arc<dyn Fn(u64, u64) + Send + Sync>) {
        *self.on_drop.lock() = Some(callback);
    }

    /// Subscribes `handler` with the default queue capacity.
    pub fn subscribe<H>(&self, handler: H) -> Unsubscribe
    where
        H: Fn(TelemetryEvent) + Send + Sync + 'static,
    {
        self.subscribe_with_capacity(handler, DEFAULT_SUBSCRIBER_QUEUE_SIZE)
    }

    pub fn subscribe_with_capacity<H>(&self, handler: H, capacity: usize) -> Unsubscribe
    where
        H: Fn(TelemetryEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let queue = Arc::new(SubscriberQueue {
            id,
            buf: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
            closed: std::sync::atomic::AtomicBool::new(false),
        });
        self.subscribers.lock().push(queue.clone());

        let worker_queue = queue.clone();
        let task = tokio::spawn(async move {
            loop {
                if worker_queue.closed.load(Ordering::SeqCst) {
                    break;
                }
                let batch: Vec<TelemetryEvent> = {
                    let mut buf = worker_queue.buf.lock();
                    buf.drain(..).collect()
                };
                if batch.is_empty() {
                    worker_queue.notify.notified().await;
                    continue;
                }
                for event in batch {
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                        error!("telemetry subscriber handler panicked: {:?}", panic);
                    }
                }
            }
        });

        Unsubscribe {
            queue,
            task: Some(task),
        }
    }

    /// Publishes `event` to every live subscriber. Never blocks: a full
    /// queue silently drops its oldest entry.
    pub fn emit(&self, event: TelemetryEvent) {
        let subscribers = self.subscribers.lock();
        for subscriber in subscribers.iter() {
            if subscriber.closed.load(Ordering::SeqCst) {
                continue;
            }
            if let Some(total_dropped) = subscriber.push(event.clone()) {
                if let Some(callback) = self.on_drop.lock().clone() {
                    callback(subscriber.id, total_dropped);
                }
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .iter()
            .filter(|s| !s.closed.load(Ordering::SeqCst))
            .count()
    }
}
