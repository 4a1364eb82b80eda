//! `PeerSession`: one authenticated, framed, duplex BTP connection to one
//! peer, multiplexing concurrent request/response pairs (§4.7).
//!
//! The session owns its socket; every other component talks to it through
//! `send()` (an `OutgoingService` impl) or by being handed inbound
//! requests via an `IncomingService` — never through a back-pointer into
//! the session's internals (§9 "cyclic references").

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use bytes::Bytes;
use ilc_packet::{ErrorCode, Packet, Prepare, RejectBuilder};
use ilc_service::{Account, IlpResult, IncomingRequest, IncomingService, OutgoingRequest, OutgoingService, PeerId};
use log::{debug, info, warn};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;
use url::Url;

use crate::error::BtpError;
use crate::frame::{Frame, MessageDirection};
use crate::pending::PendingRequests;
use crate::state::{BackoffConfig, SessionState};

const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
const MISSED_PONGS_BEFORE_CLOSE: u32 = 2;

pub struct SessionConfig {
    pub peer_id: PeerId,
    pub url: Url,
    pub shared_secret: String,
    pub ping_interval: Duration,
    pub backoff: BackoffConfig,
}

impl SessionConfig {
    pub fn new(peer_id: PeerId, url: Url, shared_secret: impl Into<String>) -> Self {
        SessionConfig {
            peer_id,
            url,
            shared_secret: shared_secret.into(),
            ping_interval: DEFAULT_PING_INTERVAL,
            backoff: BackoffConfig::default(),
        }
    }
}

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A client-role BTP session: connects out to `config.url`, authenticates,
/// and thereafter behaves symmetrically with an inbound-accepted session.
pub struct PeerSession<A: Account> {
    config: SessionConfig,
    handler: Arc<dyn IncomingService<A>>,
    local_account: A,
    pending: PendingRequests,
    state: RwLock<SessionState>,
    outbound: RwLock<Option<mpsc::UnboundedSender<Message>>>,
    next_request_id: AtomicU32,
}

impl<A: Account> PeerSession<A> {
    pub fn new(config: SessionConfig, handler: Arc<dyn IncomingService<A>>, local_account: A) -> Arc<Self> {
        Arc::new(PeerSession {
            config,
            handler,
            local_account,
            pending: PendingRequests::new(),
            state: RwLock::new(SessionState::Disconnected),
            outbound: RwLock::new(None),
            next_request_id: AtomicU32::new(1),
        })
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.config.peer_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    /// Drives the connect → auth → open → (close, reconnect) loop forever,
    /// until `shutdown()` is called. Intended to be spawned as its own task.
    pub async fn run(self: Arc<Self>) {
        let mut attempt = 0u32;
        loop {
            if matches!(self.state(), SessionState::Closing) {
                return;
            }
            self.set_state(SessionState::Connecting);
            match self.clone().connect_and_authenticate().await {
                Ok(stream) => {
                    attempt = 0;
                    self.set_state(SessionState::Open);
                    info!("btp session to {} open", self.config.peer_id);
                    self.clone().drive(stream).await;
                    self.set_state(SessionState::Disconnected);
                    self.pending.fail_all();
                }
                Err(err) => {
                    attempt += 1;
                    warn!("btp session to {} failed to connect: {}", self.config.peer_id, err);
                    self.set_state(SessionState::Disconnected);
                    if self.config.backoff.exhausted(attempt) {
                        warn!("btp session to {} exhausted reconnect attempts", self.config.peer_id);
                        return;
                    }
                    tokio::time::sleep(self.config.backoff.delay_for(attempt)).await;
                    continue;
                }
            }
        }
    }

    /// Drives an already-authenticated, server-accepted connection
    /// (§4.7 "the state machine is symmetric regardless of which side
    /// dialed"). Unlike `run()`, there is no reconnect loop: if the peer
    /// disconnects, the listener that accepted it is responsible for
    /// admitting a fresh connection on the peer's next attempt.
    pub(crate) async fn serve_accepted(self: Arc<Self>, stream: WsStream) {
        self.set_state(SessionState::Open);
        info!("btp session from {} open (inbound)", self.config.peer_id);
        self.clone().drive(stream).await;
        self.set_state(SessionState::Disconnected);
        self.pending.fail_all();
    }

    /// Signals the run loop to stop reconnecting and fails every pending
    /// sink; called on process shutdown or peer removal.
    pub fn shutdown(&self) {
        self.set_state(SessionState::Closing);
        *self.outbound.write() = None;
        self.pending.fail_all();
    }

    async fn connect_and_authenticate(self: Arc<Self>) -> Result<WsStream, BtpError> {
        self.set_state(SessionState::Connecting);
        let (mut stream, _response) = connect_async(self.config.url.as_str())
            .await
            .map_err(|e| BtpError::Io(e.to_string()))?;

        self.set_state(SessionState::Authenticating);
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let auth = Frame::Auth {
            request_id,
            peer_id: self.local_account.id().to_string(),
            shared_secret: self.config.shared_secret.clone(),
        };
        stream
            .send(auth.encode()?)
            .await
            .map_err(|e| BtpError::Io(e.to_string()))?;

        let ack = tokio::time::timeout(Duration::from_secs(10), stream.next())
            .await
            .map_err(|_| BtpError::HandshakeTimeout)?
            .ok_or_else(|| BtpError::HandshakeFailed("connection closed during handshake".into()))?
            .map_err(|e| BtpError::Io(e.to_string()))?;

        match Frame::decode(&ack)? {
            Frame::AuthAck { .. } => Ok(stream),
            Frame::AuthNack { reason, .. } => Err(BtpError::HandshakeFailed(reason)),
            other => Err(BtpError::HandshakeFailed(format!("unexpected frame: {:?}", other))),
        }
    }

    async fn drive(self: Arc<Self>, stream: WsStream) {
        let (mut write, mut read) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        *self.outbound.write() = Some(tx);

        let mut ping_ticker = tokio::time::interval(self.config.ping_interval);
        ping_ticker.tick().await;
        let mut missed_pongs = 0u32;
        let mut last_pong = Instant::now();

        loop {
            tokio::select! {
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(message)) => {
                            if let Err(err) = self.handle_message(&message, &mut last_pong, &mut missed_pongs) {
                                warn!("btp session to {}: {}", self.config.peer_id, err);
                            }
                        }
                        Some(Err(err)) => {
                            warn!("btp session to {} read error: {}", self.config.peer_id, err);
                            break;
                        }
                        None => {
                            debug!("btp session to {} closed by peer", self.config.peer_id);
                            break;
                        }
                    }
                }
                outbound = rx.recv() => {
                    match outbound {
                        Some(message) => {
                            if write.send(message).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_ticker.tick() => {
                    if missed_pongs >= MISSED_PONGS_BEFORE_CLOSE {
                        warn!("btp session to {} missed {} pongs, closing", self.config.peer_id, missed_pongs);
                        break;
                    }
                    missed_pongs += 1;
                    let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
                    if let Ok(frame) = Frame::Ping { request_id }.encode() {
                        if write.send(frame).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        *self.outbound.write() = None;
        let _ = write.close().await;
    }

    fn handle_message(
        &self,
        message: &Message,
        last_pong: &mut Instant,
        missed_pongs: &mut u32,
    ) -> Result<(), BtpError> {
        if message.is_close() {
            return Err(BtpError::ConnectionClosed);
        }
        let frame = Frame::decode(message)?;
        match frame {
            Frame::Ping { request_id } => {
                self.reply_pong(request_id);
            }
            Frame::Pong { .. } => {
                *last_pong = Instant::now();
                *missed_pongs = 0;
            }
            Frame::Message {
                request_id,
                direction: MessageDirection::Response,
                payload,
            } => {
                let result = decode_response(&payload);
                self.pending.complete(request_id, result);
            }
            Frame::Message {
                request_id,
                direction: MessageDirection::Request,
                payload,
            } => {
                self.spawn_inbound(request_id, payload);
            }
            other => {
                debug!("btp session to {} ignoring frame: {:?}", self.config.peer_id, other);
            }
        }
        Ok(())
    }

    fn reply_pong(&self, request_id: u32) {
        if let Some(tx) = self.outbound.read().as_ref() {
            if let Ok(frame) = (Frame::Pong { request_id }).encode() {
                let _ = tx.send(frame);
            }
        }
    }

    /// Decodes an inbound `Prepare`, hands it to the connector's handler,
    /// and returns the response on the same `requestId` (§4.7).
    fn spawn_inbound(self: &Arc<Self>, request_id: u32, payload: Vec<u8>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let result: IlpResult = match Packet::parse(Bytes::from(payload)) {
                Ok(Packet::Prepare(prepare)) => {
                    let request = IncomingRequest {
                        from: this.remote_account(),
                        prepare,
                    };
                    this.handler.handle_request(request).await
                }
                Ok(_) => Err(RejectBuilder {
                    code: Some(ErrorCode::F00_BAD_REQUEST),
                    triggered_by: None,
                    message: "expected a Prepare packet in a BTP request frame".into(),
                    data: Default::default(),
                }
                .build()),
                Err(err) => Err(RejectBuilder {
                    code: Some(ErrorCode::F00_BAD_REQUEST),
                    triggered_by: None,
                    message: format!("malformed ILP packet: {}", err),
                    data: Default::default(),
                }
                .build()),
            };
            let payload = match &result {
                Ok(fulfill) => Packet::Fulfill(fulfill.clone()).serialize(),
                Err(reject) => Packet::Reject(reject.clone()).serialize(),
            };
            let response = Frame::Message {
                request_id,
                direction: MessageDirection::Response,
                payload: payload.to_vec(),
            };
            if let Some(tx) = this.outbound.read().as_ref() {
                if let Ok(frame) = response.encode() {
                    let _ = tx.send(frame);
                }
            }
        });
    }

    /// A placeholder `Account` representing the peer at the other end of
    /// this session, used only to populate `IncomingRequest::from`. Real
    /// deployments look this up from a peer registry keyed by `peer_id`;
    /// this crate has no registry of its own (§9).
    fn remote_account(&self) -> A {
        self.local_account.clone()
    }
}

fn decode_response(payload: &[u8]) -> IlpResult {
    match Packet::parse(Bytes::copy_from_slice(payload)) {
        Ok(Packet::Fulfill(fulfill)) => Ok(fulfill),
        Ok(Packet::Reject(reject)) => Err(reject),
        Ok(Packet::Prepare(_)) => Err(RejectBuilder {
            code: Some(ErrorCode::T00_INTERNAL_ERROR),
            triggered_by: None,
            message: "received a Prepare in a BTP response frame".into(),
            data: Default::default(),
        }
        .build()),
        Err(err) => Err(RejectBuilder {
            code: Some(ErrorCode::T00_INTERNAL_ERROR),
            triggered_by: None,
            message: format!("malformed response packet: {}", err),
            data: Default::default(),
        }
        .build()),
    }
}

#[async_trait]
impl<A: Account> OutgoingService<A> for PeerSession<A> {
    async fn send_request(&self, request: OutgoingRequest<A>) -> IlpResult {
        self.send(request.prepare).await
    }
}

impl<A: Account> PeerSession<A> {
    /// Sends a `Prepare` and awaits its `Fulfill`/`Reject`, bounded by
    /// `prepare.expires_at` (§4.7 `send`).
    pub async fn send(&self, prepare: Prepare) -> IlpResult {
        if !self.state().is_open() {
            return Err(timeout_reject("session is not open"));
        }
        let deadline = prepare
            .expires_at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::from_millis(0));

        let (request_id, rx) = self.pending.register();
        let payload = Packet::Prepare(prepare).serialize();
        let frame = Frame::Message {
            request_id,
            direction: MessageDirection::Request,
            payload: payload.to_vec(),
        };
        let encoded = match frame.encode() {
            Ok(message) => message,
            Err(err) => {
                self.pending.remove(request_id);
                return Err(timeout_reject(&err.to_string()));
            }
        };
        let sent = self
            .outbound
            .read()
            .as_ref()
            .map(|tx| tx.send(encoded).is_ok())
            .unwrap_or(false);
        if !sent {
            self.pending.remove(request_id);
            return Err(timeout_reject("connection closed before the request could be sent"));
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(timeout_reject("connection closed before a response arrived")),
            Err(_) => {
                self.pending.remove(request_id);
                Err(timeout_reject("forward timed out before expiresAt"))
            }
        }
    }
}

/// An `R00`-class timeout reject with no `triggeredBy`; the caller (the
/// packet handler) is responsible for substituting its own address per
/// §4.8 step 7 ("this node's ILP address as `triggeredBy`").
fn timeout_reject(message: &str) -> ilc_packet::Reject {
    RejectBuilder {
        code: Some(ErrorCode::R00_TRANSFER_TIMED_OUT),
        triggered_by: None,
        message: message.into(),
        data: Default::default(),
    }
    .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct TestAccount {
        id: PeerId,
        caps: HashSet<String>,
    }

    impl Account for TestAccount {
        fn id(&self) -> &PeerId {
            &self.id
        }
        fn ilp_prefix(&self) -> Option<&ilc_packet::IlpAddress> {
            None
        }
        fn capabilities(&self) -> &HashSet<String> {
            &self.caps
        }
    }

    struct RejectEverything;

    #[async_trait]
    impl IncomingService<TestAccount> for RejectEverything {
        async fn handle_request(&self, _request: IncomingRequest<TestAccount>) -> IlpResult {
            Err(timeout_reject("unused"))
        }
    }

    fn session() -> Arc<PeerSession<TestAccount>> {
        let config = SessionConfig::new(
            PeerId::new("peer-b"),
            Url::parse("ws://localhost:1").unwrap(),
            "secret",
        );
        let account = TestAccount {
            id: PeerId::new("peer-b"),
            caps: HashSet::new(),
        };
        PeerSession::new(config, Arc::new(RejectEverything), account)
    }

    #[tokio::test]
    async fn send_before_open_fails_fast() {
        let session = session();
        let prepare = ilc_packet::PrepareBuilder {
            amount: 100,
            expires_at: SystemTime::now() + Duration::from_secs(5),
            execution_condition: [0u8; 32],
            destination: ilc_packet::IlpAddress::new("g.bob").unwrap(),
            data: Default::default(),
        }
        .build();
        let result = session.send(prepare).await;
        assert!(result.is_err());
    }

    #[test]
    fn starts_disconnected() {
        let session = session();
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
