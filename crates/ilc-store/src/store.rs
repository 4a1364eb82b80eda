//! `EventStore`: an append-only, size-capped log of `StoredEvent`s with
//! filtered query (§4.11).
//!
//! Grounded on the teacher's `InMemoryStore` shape (a single
//! `parking_lot::RwLock`-guarded map behind a cheap `Clone` handle), but
//! the data structure here is a `VecDeque` kept in insertion order rather
//! than a hashmap, since queries need cheap newest-first/oldest-first
//! iteration and FIFO eviction.

use std::collections::VecDeque;
use std::sync::Arc;

use ilc_telemetry::TelemetryEvent;
use log::warn;
use parking_lot::RwLock;

use crate::filter::{EventFilter, FilterError, SortOrder};
use crate::stored::StoredEvent;

pub const DEFAULT_CAPACITY_BYTES: u64 = 100 * 1024 * 1024;
pub const MAX_QUERY_LIMIT: usize = 100;
pub const MAX_HYDRATION_LIMIT: usize = 5000;

/// Observes store-level conditions the connector surfaces as telemetry
/// without this crate depending on `ilc-telemetry`'s bus (same pattern
/// as `RateLimitObserver`/`FraudObserver`).
pub trait StoreObserver: Send + Sync {
    fn on_size_exceeded(&self, size_bytes: u64, cap_bytes: u64);
}

struct Inner {
    events: VecDeque<StoredEvent>,
    next_seq: u64,
    size_bytes: u64,
}

/// The process's single event store instance (§3 Ownership).
#[derive(Clone)]
pub struct EventStore {
    inner: Arc<RwLock<Inner>>,
    cap_bytes: u64,
    observer: Option<Arc<dyn StoreObserver>>,
}

impl EventStore {
    pub fn new(cap_bytes: u64) -> Self {
        EventStore {
            inner: Arc::new(RwLock::new(Inner {
                events: VecDeque::new(),
                next_seq: 1,
                size_bytes: 0,
            })),
            cap_bytes,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn StoreObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Appends `event`, assigning the next sequence number, then evicts
    /// oldest entries in FIFO order until under the size cap.
    pub fn store(&self, event: TelemetryEvent) -> u64 {
        let approx_size = serde_json::to_vec(&event).map(|b| b.len() as u64).unwrap_or(0);
        let mut inner = self.inner.write();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.size_bytes += approx_size;
        inner.events.push_back(StoredEvent { seq, event });

        if inner.size_bytes > self.cap_bytes {
            while inner.size_bytes > self.cap_bytes {
                match inner.events.pop_front() {
                    Some(evicted) => {
                        let evicted_size = serde_json::to_vec(&evicted.event).map(|b| b.len() as u64).unwrap_or(0);
                        inner.size_bytes = inner.size_bytes.saturating_sub(evicted_size);
                    }
                    None => break,
                }
            }
            warn!(
                "event store exceeded cap ({} > {} bytes); oldest events evicted",
                inner.size_bytes, self.cap_bytes
            );
            if let Some(observer) = &self.observer {
                observer.on_size_exceeded(inner.size_bytes, self.cap_bytes);
            }
        }

        seq
    }

    pub fn query(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>, FilterError> {
        filter.validate(MAX_QUERY_LIMIT)?;
        Ok(self.query_unchecked(filter))
    }

    /// Like `query`, but validates against the larger hydration limit
    /// rather than the standard API page-size cap.
    pub fn query_hydration(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>, FilterError> {
        filter.validate(MAX_HYDRATION_LIMIT)?;
        Ok(self.query_unchecked(filter))
    }

    fn query_unchecked(&self, filter: &EventFilter) -> Vec<StoredEvent> {
        let inner = self.inner.read();
        let mut matched: Vec<StoredEvent> = inner.events.iter().filter(|e| filter.matches(e)).cloned().collect();
        match filter.order {
            SortOrder::NewestFirst => matched.reverse(),
            SortOrder::OldestFirst => {}
        }
        matched.into_iter().skip(filter.offset).take(filter.limit).collect()
    }

    pub fn count(&self, filter: &EventFilter) -> usize {
        self.inner.read().events.iter().filter(|e| filter.matches(e)).count()
    }

    pub fn size(&self) -> u64 {
        self.inner.read().size_bytes
    }

    pub fn total(&self) -> usize {
        self.inner.read().events.len()
    }

    #[cfg(test)]
    fn last_seq(&self) -> u64 {
        self.inner.read().next_seq - 1
    }
}
