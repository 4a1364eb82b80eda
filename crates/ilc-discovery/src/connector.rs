//! Bounded-retry connect for newly discovered peers (§4.15 "per-peer max
//! 3 retries; after exhaustion, the peer is skipped until the next
//! discovery cycle"), in the idiom of
//! `interledger_btp::client::connect_to_service_account`'s
//! connect-then-auth-then-register shape.

use async_trait::async_trait;
use std::time::Duration;

use crate::descriptor::PeerDescriptor;

pub const MAX_CONNECT_RETRIES: u32 = 3;

#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(&self, peer: &PeerDescriptor) -> Result<(), String>;
}

/// Attempts `connector.connect(peer)` up to `MAX_CONNECT_RETRIES` times
/// with a short fixed delay between attempts, returning `Ok(())` on the
/// first success. All failures are logged as warnings, never escalated:
/// the caller skips the peer until the next discovery cycle.
pub async fn connect_with_retries(connector: &dyn PeerConnector, peer: &PeerDescriptor, retry_delay: Duration) -> bool {
    for attempt in 1..=MAX_CONNECT_RETRIES {
        match connector.connect(peer).await {
            Ok(()) => return true,
            Err(reason) => {
                log::warn!(
                    "discovery: connect attempt {}/{} to peer {} failed: {}",
                    attempt,
                    MAX_CONNECT_RETRIES,
                    peer.node_id,
                    reason
                );
                if attempt < MAX_CONNECT_RETRIES {
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }
    log::warn!(
        "discovery: exhausted {} connect attempts to peer {}, skipping until next cycle",
        MAX_CONNECT_RETRIES,
        peer.node_id
    );
    false
}
