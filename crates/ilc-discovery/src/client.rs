//! `DiscoveryClient`: the HTTP surface the discovery loop calls through
//! (§4.15). The core never speaks HTTP directly; callers supply a
//! concrete client (e.g. a `reqwest`-backed one) the way `ilc-pool`
//! callers supply a `ConnectionFactory`.

use async_trait::async_trait;

use crate::descriptor::PeerDescriptor;

#[derive(Debug)]
pub enum DiscoveryClientError {
    Unreachable(String),
    Malformed(String),
}

impl std::fmt::Display for DiscoveryClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryClientError::Unreachable(msg) => write!(f, "discovery endpoint unreachable: {}", msg),
            DiscoveryClientError::Malformed(msg) => write!(f, "malformed discovery response: {}", msg),
        }
    }
}

impl std::error::Error for DiscoveryClientError {}

#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// POSTs `self_descriptor` to `endpoint`.
    async fn announce(&self, endpoint: &str, self_descriptor: &PeerDescriptor) -> Result<(), DiscoveryClientError>;

    /// GETs `{endpoint}/api/v1/peers`.
    async fn fetch_peers(&self, endpoint: &str) -> Result<Vec<PeerDescriptor>, DiscoveryClientError>;
}
