//! `/ws`: fans out every bus event to every connected client (§4.12).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use ilc_telemetry::{EventBus, TelemetryEvent, Unsubscribe};
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

const CLOSE_GOING_AWAY: u16 = 1001;

struct Client {
    sender: mpsc::UnboundedSender<Message>,
}

/// The live set of connected explorer WS clients, plus a bus subscription
/// that serializes every emitted event once and pushes it to each.
pub struct WsHub {
    clients: Mutex<HashMap<u64, Client>>,
    next_id: AtomicU64,
    // Holds `attach`'s subscription alive for the hub's lifetime; an
    // `Unsubscribe` unsubscribes on drop, so letting this go out of scope
    // immediately after `bus.subscribe(...)` would silently stop delivery.
    subscription: Mutex<Option<Unsubscribe>>,
}

impl Default for WsHub {
    fn default() -> Self {
        WsHub::new()
    }
}

impl WsHub {
    pub fn new() -> Self {
        WsHub {
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            subscription: Mutex::new(None),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Subscribes this hub to `bus`; every subsequent event is serialized
    /// once and forwarded to every currently-connected client.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) {
        let hub = self.clone();
        let subscription = bus.subscribe(move |event: TelemetryEvent| hub.broadcast(&event));
        *self.subscription.lock() = Some(subscription);
    }

    fn broadcast(&self, event: &TelemetryEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(err) => {
                warn!("failed to serialize telemetry event for ws fan-out: {}", err);
                return;
            }
        };
        let mut clients = self.clients.lock();
        clients.retain(|id, client| match client.sender.send(Message::text(payload.clone())) {
            Ok(()) => true,
            Err(_) => {
                debug!("dropping ws client {} (send failed)", id);
                false
            }
        });
    }

    /// Drives one client's socket until it closes, registering it with the
    /// hub for the duration of the connection.
    pub async fn handle_connection(self: Arc<Self>, socket: WebSocket) {
        let (mut ws_tx, mut ws_rx) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.clients.lock().insert(id, Client { sender: tx });

        let forward = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if ws_tx.send(message).await.is_err() {
                    break;
                }
            }
        });

        // Explorer clients don't send anything meaningful; drain their
        // frames so the underlying connection stays alive until they
        // disconnect or the hub closes it.
        while ws_rx.next().await.is_some() {}

        self.clients.lock().remove(&id);
        forward.abort();
    }

    /// Graceful shutdown (§5 Cancellation & timeouts): every connected
    /// client receives close code 1001 before the HTTP server itself is
    /// torn down.
    pub async fn close_all(&self) {
        let senders: Vec<mpsc::UnboundedSender<Message>> =
            self.clients.lock().drain().map(|(_, client)| client.sender).collect();
        for sender in senders {
            let _ = sender.send(Message::close_with(CLOSE_GOING_AWAY, "going away"));
        }
    }
}
