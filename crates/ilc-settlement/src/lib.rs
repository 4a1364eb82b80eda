//! Abstract `SettlementDriver` (§1 "out of scope: on-chain settlement
//! drivers ... the core calls an abstract `SettlementDriver`").
//!
//! This crate deliberately carries no EVM/XRP payment-channel code: it
//! defines the small interface the data plane and telemetry pipeline call
//! through, the way the teacher's `interledger-settlement` crate exposes
//! `SettlementAccount`/engine-notification traits for drivers it does not
//! itself implement.

use async_trait::async_trait;
use ilc_service::PeerId;
use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum SettlementError {
        Unavailable(reason: String) {
            display("settlement driver unavailable: {}", reason)
        }
        Rejected(reason: String) {
            display("settlement engine rejected the request: {}", reason)
        }
    }
}

/// A handle to one on-chain payment channel (EVM, XRP, ...), opaque to
/// the core beyond its identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEventKind {
    Opened,
    Closed,
}

/// Notification the driver hands back to the core when a channel's state
/// changes out of band (e.g. a watcher observed an on-chain event).
#[derive(Debug, Clone)]
pub struct ChannelNotification {
    pub peer: PeerId,
    pub channel: ChannelId,
    pub kind: ChannelEventKind,
}

/// The interface a settlement subsystem exposes to the core (§1, §4 design
/// notes "dynamic dispatch"). The core never signs anything, never touches
/// a wallet key, and never speaks a chain's RPC directly; it only calls
/// `trigger` when accumulated balance crosses a threshold and reports the
/// outcome on the telemetry bus.
#[async_trait]
pub trait SettlementDriver: Send + Sync {
    /// Instructs the driver to settle `amount` owed to `peer`, returning
    /// once the driver has accepted (not necessarily finalized) the
    /// request. The core treats this as fire-and-forget from the data
    /// plane's perspective: forwarding is never blocked on settlement.
    async fn trigger(&self, peer: &PeerId, amount: u64) -> Result<ChannelId, SettlementError>;

    /// The driver's best-known balance owed to `peer`, in the core's base
    /// units, for use by the spending-limit guard and explorer endpoints.
    async fn balance(&self, peer: &PeerId) -> Result<i64, SettlementError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingDriver {
        calls: AtomicU64,
    }

    #[async_trait]
    impl SettlementDriver for CountingDriver {
        async fn trigger(&self, _peer: &PeerId, _amount: u64) -> Result<ChannelId, SettlementError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChannelId(format!("channel-{}", n)))
        }

        async fn balance(&self, _peer: &PeerId) -> Result<i64, SettlementError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn trigger_is_callable_through_the_trait_object() {
        let driver: Box<dyn SettlementDriver> = Box::new(CountingDriver { calls: AtomicU64::new(0) });
        let channel = driver.trigger(&PeerId::new("peer-a"), 100).await.unwrap();
        assert_eq!(channel, ChannelId("channel-0".to_string()));
    }
}
