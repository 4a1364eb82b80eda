//! Request-id allocation and outstanding-response bookkeeping for one
//! session (§4.7 "requestId allocation MUST be collision-free for the
//! lifetime of any outstanding sink").

use std::collections::HashMap;

use ilc_service::IlpResult;
use parking_lot::Mutex;
use rand::random;
use tokio::sync::oneshot;

struct Inner {
    sinks: HashMap<u32, oneshot::Sender<IlpResult>>,
}

pub struct PendingRequests {
    inner: Mutex<Inner>,
}

impl PendingRequests {
    pub fn new() -> Self {
        PendingRequests {
            inner: Mutex::new(Inner { sinks: HashMap::new() }),
        }
    }

    /// Allocates a fresh request id with no outstanding sink registered
    /// under it, and registers `sink` for it atomically.
    pub fn register(&self) -> (u32, oneshot::Receiver<IlpResult>) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        loop {
            let candidate: u32 = random();
            if !inner.sinks.contains_key(&candidate) {
                inner.sinks.insert(candidate, tx);
                return (candidate, rx);
            }
        }
    }

    /// Completes the sink registered for `request_id`, if any is still
    /// outstanding (it may have already timed out and been removed).
    pub fn complete(&self, request_id: u32, result: IlpResult) {
        if let Some(tx) = self.inner.lock().sinks.remove(&request_id) {
            let _ = tx.send(result);
        }
    }

    pub fn remove(&self, request_id: u32) {
        self.inner.lock().sinks.remove(&request_id);
    }

    /// Fails every outstanding sink; called when the session closes.
    pub fn fail_all(&self) {
        let mut inner = self.inner.lock();
        for (_, _tx) in inner.sinks.drain() {
            // Dropping the sender fails the corresponding receiver with
            // RecvError, which `send()` below maps to ConnectionClosed.
        }
    }

    pub fn outstanding_count(&self) -> usize {
        self.inner.lock().sinks.len()
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        PendingRequests::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ilc_packet::{FulfillBuilder, Packet};

    #[tokio::test]
    async fn register_then_complete_delivers_result() {
        let pending = PendingRequests::new();
        let (request_id, rx) = pending.register();
        let fulfill = FulfillBuilder {
            fulfillment: [0u8; 32],
            data: bytes::Bytes::new(),
        }
        .build();
        pending.complete(request_id, Ok(fulfill.clone()));
        let result = rx.await.unwrap();
        assert_eq!(result.unwrap(), fulfill);
    }

    #[tokio::test]
    async fn fail_all_fails_outstanding_receivers() {
        let pending = PendingRequests::new();
        let (_request_id, rx) = pending.register();
        pending.fail_all();
        assert!(rx.await.is_err());
    }

    #[test]
    fn allocated_ids_are_unique_while_outstanding() {
        let pending = PendingRequests::new();
        let mut ids = std::collections::HashSet::new();
        for _ in 0..1000 {
            let (id, _rx) = pending.register();
            assert!(ids.insert(id));
        }
        assert_eq!(pending.outstanding_count(), 1000);
    }

    #[allow(dead_code)]
    fn _unused(_: Packet) {}
}
