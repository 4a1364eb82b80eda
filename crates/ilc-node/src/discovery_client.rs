//! `reqwest`-backed `DiscoveryClient` (§4.15), the way a settlement engine
//! client in the teacher workspace would reach a peer's HTTP API.

use async_trait::async_trait;
use ilc_discovery::{DiscoveryClient, DiscoveryClientError, PeerDescriptor, PeerListResponse};

pub struct HttpDiscoveryClient {
    http: reqwest::Client,
}

impl HttpDiscoveryClient {
    pub fn new() -> Self {
        HttpDiscoveryClient {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpDiscoveryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiscoveryClient for HttpDiscoveryClient {
    async fn announce(&self, endpoint: &str, self_descriptor: &PeerDescriptor) -> Result<(), DiscoveryClientError> {
        let url = format!("{}/api/v1/peers/announce", endpoint.trim_end_matches('/'));
        self.http
            .post(&url)
            .json(self_descriptor)
            .send()
            .await
            .map_err(|e| DiscoveryClientError::Unreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| DiscoveryClientError::Unreachable(e.to_string()))?;
        Ok(())
    }

    async fn fetch_peers(&self, endpoint: &str) -> Result<Vec<PeerDescriptor>, DiscoveryClientError> {
        let url = format!("{}/api/v1/peers", endpoint.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| DiscoveryClientError::Unreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| DiscoveryClientError::Unreachable(e.to_string()))?;
        let body: PeerListResponse = response
            .json()
            .await
            .map_err(|e| DiscoveryClientError::Malformed(e.to_string()))?;
        Ok(body.peers)
    }
}
