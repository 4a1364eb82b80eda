//! Server-role counterpart to `session.rs`'s client-dial loop: accepts
//! inbound BTP-over-WebSocket connections, performs the AUTH handshake
//! from the listening side, and hands each authenticated connection off
//! to a `PeerSession` running in server mode (§4.7, §6 "First frame
//! after open is AUTH").

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use ilc_service::{Account, IncomingService, PeerId};
use log::{info, warn};
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, MaybeTlsStream};
use url::Url;

use crate::error::BtpError;
use crate::frame::{Frame, CLOSE_CODE_AUTH_FAILED};
use crate::session::{PeerSession, SessionConfig};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Looks up the configured peer for an inbound AUTH frame and resolves
/// it to the `Account` record the packet handler should see as `from`
/// (§3 `Peer`: `sharedSecret` is part of that record, checked here).
pub trait AuthVerifier<A: Account>: Send + Sync {
    /// `Some(account)` iff `peer_id` is configured and `shared_secret`
    /// matches; `None` closes the connection with code `4001`.
    fn verify(&self, peer_id: &str, shared_secret: &str) -> Option<A>;
}

/// Accepts connections on `addr` forever, spawning one task per peer
/// that lives as long as that connection (§5 "Each Peer Session runs its
/// own cooperative task").
pub async fn listen<A, V>(
    addr: SocketAddr,
    verifier: Arc<V>,
    handler: Arc<dyn IncomingService<A>>,
) -> Result<(), BtpError>
where
    A: Account,
    V: AuthVerifier<A> + 'static,
{
    let listener = TcpListener::bind(addr).await.map_err(|e| BtpError::Io(e.to_string()))?;
    info!("btp listener bound on {}", addr);
    loop {
        let (tcp, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                warn!("btp listener accept error: {}", err);
                continue;
            }
        };
        let verifier = verifier.clone();
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(err) = accept_one(tcp, peer_addr, verifier, handler).await {
                warn!("btp inbound connection from {} failed: {}", peer_addr, err);
            }
        });
    }
}

async fn accept_one<A, V>(
    tcp: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    verifier: Arc<V>,
    handler: Arc<dyn IncomingService<A>>,
) -> Result<(), BtpError>
where
    A: Account,
    V: AuthVerifier<A> + 'static,
{
    // Wrapped in `MaybeTlsStream::Plain` so the accepted stream's type
    // lines up with `session::WsStream`, which `PeerSession` (built for
    // the client-dial path, where `connect_async` returns a
    // `MaybeTlsStream`) expects on both sides of the connection.
    let mut stream = accept_async(MaybeTlsStream::Plain(tcp)).await.map_err(|e| BtpError::Io(e.to_string()))?;

    let first = tokio::time::timeout(HANDSHAKE_TIMEOUT, stream.next())
        .await
        .map_err(|_| BtpError::HandshakeTimeout)?
        .ok_or_else(|| BtpError::HandshakeFailed("connection closed before AUTH".into()))?
        .map_err(|e| BtpError::Io(e.to_string()))?;

    let (request_id, peer_id, shared_secret) = match Frame::decode(&first)? {
        Frame::Auth {
            request_id,
            peer_id,
            shared_secret,
        } => (request_id, peer_id, shared_secret),
        other => {
            let _ = stream.close(None).await;
            return Err(BtpError::HandshakeFailed(format!("expected AUTH, got {:?}", other)));
        }
    };

    let account = match verifier.verify(&peer_id, &shared_secret) {
        Some(account) => account,
        None => {
            warn!("btp inbound connection from {} ({}): auth rejected", peer_addr, peer_id);
            let nack = Frame::AuthNack {
                request_id,
                reason: "invalid peer id or shared secret".into(),
            }
            .encode()?;
            let _ = stream.send(nack).await;
            let _ = stream
                .close(Some(tungstenite::protocol::CloseFrame {
                    code: tungstenite::protocol::frame::coding::CloseCode::from(CLOSE_CODE_AUTH_FAILED),
                    reason: "auth failed".into(),
                }))
                .await;
            return Err(BtpError::HandshakeFailed("auth rejected".into()));
        }
    };

    let ack = Frame::AuthAck { request_id }.encode()?;
    stream.send(ack).await.map_err(|e| BtpError::Io(e.to_string()))?;

    info!("btp inbound connection from {} authenticated as {}", peer_addr, peer_id);

    // `SessionConfig::url`/`backoff` are meaningless for an accepted
    // connection (there is no dial-out to retry); they're populated with
    // inert placeholders purely to satisfy `PeerSession::new`'s shape.
    let placeholder_url = Url::parse(&format!("btp+inbound://{}", peer_id)).expect("valid placeholder url");
    let config = SessionConfig::new(PeerId::new(peer_id), placeholder_url, shared_secret);
    let session = PeerSession::new(config, handler, account);
    session.serve_accepted(stream).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tokio_tungstenite::connect_async;

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

    struct EchoHandler;

    #[async_trait::async_trait]
    impl IncomingService<TestAccount> for EchoHandler {
        async fn handle_request(&self, _request: ilc_service::IncomingRequest<TestAccount>) -> ilc_service::IlpResult {
            unreachable!("these tests close before any Prepare is forwarded")
        }
    }

    struct AllowOnly(&'static str, &'static str);

    impl AuthVerifier<TestAccount> for AllowOnly {
        fn verify(&self, peer_id: &str, shared_secret: &str) -> Option<TestAccount> {
            if peer_id == self.0 && shared_secret == self.1 {
                Some(TestAccount {
                    id: PeerId::new(peer_id),
                    caps: HashSet::new(),
                })
            } else {
                None
            }
        }
    }

    #[tokio::test]
    async fn accepted_connection_completes_auth_handshake() {
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let verifier = Arc::new(AllowOnly("peer-a", "s3cret"));
        let handler: Arc<dyn IncomingService<TestAccount>> = Arc::new(EchoHandler);

        tokio::spawn(async move {
            let (conn, peer_addr) = tcp.accept().await.unwrap();
            let _ = accept_one(conn, peer_addr, verifier, handler).await;
        });

        let url = format!("ws://{}", addr);
        let (mut client, _) = connect_async(url).await.unwrap();
        let auth = Frame::Auth {
            request_id: 1,
            peer_id: "peer-a".to_string(),
            shared_secret: "s3cret".to_string(),
        }
        .encode()
        .unwrap();
        client.send(auth).await.unwrap();

        let response = client.next().await.unwrap().unwrap();
        match Frame::decode(&response).unwrap() {
            Frame::AuthAck { request_id } => assert_eq!(request_id, 1),
            other => panic!("expected AuthAck, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn wrong_shared_secret_is_rejected() {
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let verifier = Arc::new(AllowOnly("peer-a", "s3cret"));
        let handler: Arc<dyn IncomingService<TestAccount>> = Arc::new(EchoHandler);

        tokio::spawn(async move {
            let (conn, peer_addr) = tcp.accept().await.unwrap();
            let _ = accept_one(conn, peer_addr, verifier, handler).await;
        });

        let url = format!("ws://{}", addr);
        let (mut client, _) = connect_async(url).await.unwrap();
        let auth = Frame::Auth {
            request_id: 1,
            peer_id: "peer-a".to_string(),
            shared_secret: "wrong".to_string(),
        }
        .encode()
        .unwrap();
        client.send(auth).await.unwrap();

        let response = client.next().await.unwrap().unwrap();
        match Frame::decode(&response).unwrap() {
            Frame::AuthNack { request_id, .. } => assert_eq!(request_id, 1),
            other => panic!("expected AuthNack, got {:?}", other),
        }
    }
}
