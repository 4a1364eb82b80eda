//! `NodeAccount`: the concrete `Account` the node wires through every
//! `ilc-*` crate generic over `A: Account` (§3 `Peer`).

use std::collections::HashSet;

use ilc_packet::IlpAddress;
use ilc_service::{Account, PeerId};
use url::Url;

#[derive(Debug, Clone)]
pub struct NodeAccount {
    id: PeerId,
    ilp_prefix: Option<IlpAddress>,
    capabilities: HashSet<String>,
    /// BTP endpoint to dial for an outbound peer; `None` for a peer that
    /// only ever connects inbound.
    pub btp_url: Option<Url>,
    pub auth_token: String,
}

impl NodeAccount {
    pub fn new(id: PeerId, auth_token: impl Into<String>) -> Self {
        NodeAccount {
            id,
            ilp_prefix: None,
            capabilities: HashSet::new(),
            btp_url: None,
            auth_token: auth_token.into(),
        }
    }

    pub fn with_ilp_prefix(mut self, prefix: IlpAddress) -> Self {
        self.ilp_prefix = Some(prefix);
        self
    }

    pub fn with_capabilities(mut self, capabilities: HashSet<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_btp_url(mut self, url: Url) -> Self {
        self.btp_url = Some(url);
        self
    }
}

impl Account for NodeAccount {
    fn id(&self) -> &PeerId {
        &self.id
    }

    fn ilp_prefix(&self) -> Option<&IlpAddress> {
        self.ilp_prefix.as_ref()
    }

    fn capabilities(&self) -> &HashSet<String> {
        &self.capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_round_trip() {
        let mut caps = HashSet::new();
        caps.insert("settlement".to_string());
        let account = NodeAccount::new(PeerId::new("peer-a"), "s3cret").with_capabilities(caps);
        assert!(account.has_capability("settlement"));
    }
}
