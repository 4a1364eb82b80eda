//! Shared `Account`/`IncomingService`/`OutgoingService` traits.
//!
//! Every other connector crate (`ilc-btp`, `ilc-router`, `ilc-connector`,
//! ...) is generic over `A: Account`, exactly as `interledger-service` is
//! in the teacher workspace: this keeps the session ↔ handler ↔ router
//! cycle broken via message passing (§9) instead of strong back-pointers.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use ilc_packet::{Fulfill, IlpAddress, Prepare, Reject};

/// Unique, stable identifier for a peer across reconnects (§3 `Peer`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        PeerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        PeerId::new(s)
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        PeerId::new(s)
    }
}

/// A peer (§3 `Peer`), generic over whatever transport-specific fields a
/// caller wants to hang off it (BTP url, shared secret, ...). The trait
/// exposes only the fields the data plane needs to make decisions.
pub trait Account: Clone + fmt::Debug + Send + Sync + 'static {
    fn id(&self) -> &PeerId;

    /// The ILP address prefix this peer announces packets under, if any.
    fn ilp_prefix(&self) -> Option<&IlpAddress>;

    fn capabilities(&self) -> &HashSet<String>;

    fn has_capability(&self, capability: &str) -> bool {
        self.capabilities().contains(capability)
    }
}

/// A `Prepare` arriving from `from`, ready for the data plane to process.
#[derive(Debug, Clone)]
pub struct IncomingRequest<A: Account> {
    pub from: A,
    pub prepare: Prepare,
}

/// A `Prepare` about to be forwarded to `to` on behalf of `from`.
#[derive(Debug, Clone)]
pub struct OutgoingRequest<A: Account> {
    pub from: A,
    pub to: A,
    pub original_amount: u64,
    pub prepare: Prepare,
}

pub type IlpResult = Result<Fulfill, Reject>;

/// Handles a `Prepare` received from one of our peers (the inbound half of
/// a `Peer Session`, feeding the `Packet Handler`).
#[async_trait]
pub trait IncomingService<A: Account>: Send + Sync {
    async fn handle_request(&self, request: IncomingRequest<A>) -> IlpResult;
}

/// Sends a `Prepare` to a next-hop peer (the outbound half of a `Peer
/// Session`, invoked by the `Packet Handler` after a routing decision).
#[async_trait]
pub trait OutgoingService<A: Account>: Send + Sync {
    async fn send_request(&self, request: OutgoingRequest<A>) -> IlpResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct TestAccount {
        id: PeerId,
        caps: HashSet<String>,
    }

    impl Account for TestAccount {
        fn id(&self) -> &PeerId {
            &self.id
        }
        fn ilp_prefix(&self) -> Option<&IlpAddress> {
            None
        }
        fn capabilities(&self) -> &HashSet<String> {
            &self.caps
        }
    }

    #[test]
    fn capability_lookup() {
        let mut caps = HashSet::new();
        caps.insert("settlement".to_string());
        let account = TestAccount {
            id: PeerId::new("peer-a"),
            caps,
        };
        assert!(account.has_capability("settlement"));
        assert!(!account.has_capability("ccp"));
    }
}
