//! `PeerRegistry`: looks up the outbound session for a peer by id.
//!
//! Breaks the session ↔ handler ↔ router cycle (§9): the connector holds a
//! registry, not a direct reference to any one session, and a session
//! never holds a back-pointer to the connector beyond the
//! `IncomingService` it was constructed with.

use std::sync::Arc;

use ilc_service::{Account, OutgoingService, PeerId};

pub trait PeerRegistry<A: Account>: Send + Sync {
    /// The session to use to forward a `Prepare` to `peer`, if one is
    /// currently connected.
    fn route(&self, peer: &PeerId) -> Option<Arc<dyn OutgoingService<A>>>;

    /// The `Account` record for `peer`, if known (used to populate
    /// `OutgoingRequest::to`).
    fn account(&self, peer: &PeerId) -> Option<A>;
}
