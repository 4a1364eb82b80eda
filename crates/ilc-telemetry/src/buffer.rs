//! `TelemetryBuffer`: batches events and flushes them to a pluggable sink
//! on a size/time trigger, with in-order retry on flush failure (§4.10).
//!
//! The pending queue is guarded by a `tokio::sync::Mutex`, not a
//! `parking_lot` one: flushing deliberately holds the lock across the
//! `flush_fn.flush().await` call so that at most one flush is ever in
//! flight and a retry cannot interleave with a newer batch out of order.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info};
use tokio::sync::Mutex;

use crate::event::TelemetryEvent;

#[derive(Debug, Clone)]
pub struct FlushError(pub String);

impl std::fmt::Display for FlushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "flush failed: {}", self.0)
    }
}

impl std::error::Error for FlushError {}

/// The pluggable sink a `TelemetryBuffer` flushes batches to: the event
/// store, a remote collector, stdout, whatever the node wires in.
#[async_trait]
pub trait FlushFn: Send + Sync {
    async fn flush(&self, batch: Vec<TelemetryEvent>) -> Result<(), FlushError>;
}

pub trait BufferObserver: Send + Sync {
    fn on_batch_flushed(&self, count: usize) {
        let _ = count;
    }
    fn on_flush_error(&self, error: &FlushError) {
        let _ = error;
    }
}

#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub buffer_size: usize,
    pub flush_interval_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig {
            buffer_size: 1000,
            flush_interval_ms: 100,
        }
    }
}

/// The process's single telemetry buffer instance (§3 Ownership),
/// sitting between the event bus and whatever durably stores events.
pub struct TelemetryBuffer {
    config: BufferConfig,
    pending: Mutex<VecDeque<TelemetryEvent>>,
    flush_fn: Arc<dyn FlushFn>,
    observer: Option<Arc<dyn BufferObserver>>,
}

impl TelemetryBuffer {
    pub fn new(config: BufferConfig, flush_fn: Arc<dyn FlushFn>) -> Self {
        TelemetryBuffer {
            config,
            pending: Mutex::new(VecDeque::new()),
            flush_fn,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn BufferObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Appends `event`, flushing full batches immediately. Holding the
    /// mutex across the flush means a second `push` arriving mid-flush
    /// simply waits rather than racing a second flush into flight.
    pub async fn push(&self, event: TelemetryEvent) {
        let mut pending = self.pending.lock().await;
        pending.push_back(event);
        while pending.len() >= self.config.buffer_size {
            self.drain_and_flush(&mut pending, self.config.buffer_size).await;
        }
    }

    /// Flushes whatever is pending, even a partial batch; called by the
    /// node's periodic timer task every `flush_interval_ms`.
    pub async fn flush_tick(&self) {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return;
        }
        let batch_size = pending.len().min(self.config.buffer_size);
        self.drain_and_flush(&mut pending, batch_size).await;
    }

    /// Flushes everything, in full-size batches, blocking until the
    /// queue is empty. Used at process shutdown.
    pub async fn shutdown(&self) {
        loop {
            let mut pending = self.pending.lock().await;
            if pending.is_empty() {
                return;
            }
            let batch_size = pending.len().min(self.config.buffer_size);
            self.drain_and_flush(&mut pending, batch_size).await;
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Drains `count` events, attempts to flush them, and on failure
    /// pushes them back to the front in their original order so a
    /// subsequent retry observes the same ordering it would have without
    /// the failure.
    async fn drain_and_flush(&self, pending: &mut VecDeque<TelemetryEvent>, count: usize) {
        let batch: Vec<TelemetryEvent> = pending.drain(..count).collect();
        let len = batch.len();
        match self.flush_fn.flush(batch.clone()).await {
            Ok(()) => {
                info!("flushed {} telemetry events", len);
                if let Some(observer) = &self.observer {
                    observer.on_batch_flushed(len);
                }
            }
            Err(err) => {
                error!("{}", err);
                if let Some(observer) = &self.observer {
                    observer.on_flush_error(&err);
                }
                // Re-queue at the front in original order; the batch was
                // never durably flushed, so the next tick retries it
                // ahead of anything pushed in the meantime.
                for event in batch.into_iter().rev() {
                    pending.push_front(event);
                }
            }
        }
    }
}
