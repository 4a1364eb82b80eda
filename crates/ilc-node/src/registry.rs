//! `InMemoryPeerRegistry`: the node's single source of truth for "what
//! accounts do we know about" and "which session reaches them right now"
//! (§9 "breaks the session ↔ handler ↔ router cycle").

use std::collections::HashMap;
use std::sync::Arc;

use ilc_btp::AuthVerifier;
use ilc_connector::PeerRegistry;
use ilc_service::{Account, OutgoingService, PeerId};
use parking_lot::RwLock;

use crate::account::NodeAccount;

pub struct InMemoryPeerRegistry<A: Account> {
    accounts: RwLock<HashMap<PeerId, A>>,
    sessions: RwLock<HashMap<PeerId, Arc<dyn OutgoingService<A>>>>,
}

impl<A: Account> InMemoryPeerRegistry<A> {
    pub fn new() -> Self {
        InMemoryPeerRegistry {
            accounts: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_account(&self, account: A) {
        self.accounts.write().insert(account.id().clone(), account);
    }

    /// Installs the live outbound session for `peer`, overwriting any
    /// earlier one (a reconnect replaces the session wholesale rather
    /// than mutating it in place).
    pub fn set_session(&self, peer: PeerId, session: Arc<dyn OutgoingService<A>>) {
        self.sessions.write().insert(peer, session);
    }

    pub fn remove_session(&self, peer: &PeerId) {
        self.sessions.write().remove(peer);
    }

    pub fn accounts(&self) -> Vec<A> {
        self.accounts.read().values().cloned().collect()
    }
}

impl<A: Account> Default for InMemoryPeerRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Account> PeerRegistry<A> for InMemoryPeerRegistry<A> {
    fn route(&self, peer: &PeerId) -> Option<Arc<dyn OutgoingService<A>>> {
        self.sessions.read().get(peer).cloned()
    }

    fn account(&self, peer: &PeerId) -> Option<A> {
        self.accounts.read().get(peer).cloned()
    }
}

/// Verifies an inbound BTP AUTH frame against the configured peer's
/// `auth_token` (§4.7, §6 "shared secret is part of the Peer record").
/// Tied to `NodeAccount` specifically since `Account` itself carries no
/// notion of a shared secret.
impl AuthVerifier<NodeAccount> for InMemoryPeerRegistry<NodeAccount> {
    fn verify(&self, peer_id: &str, shared_secret: &str) -> Option<NodeAccount> {
        let accounts = self.accounts.read();
        let account = accounts.get(&PeerId::new(peer_id))?;
        if account.auth_token == shared_secret {
            Some(account.clone())
        } else {
            None
        }
    }
}
