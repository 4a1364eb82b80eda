//! `DiscoveryService`: the periodic announce/fetch/merge loop (§4.15).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::client::DiscoveryClient;
use crate::connector::{connect_with_retries, PeerConnector};
use crate::descriptor::PeerDescriptor;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub self_descriptor: PeerDescriptor,
    pub discovery_endpoints: Vec<String>,
    pub broadcast_interval: Duration,
    pub connect_retry_delay: Duration,
}

impl DiscoveryConfig {
    pub fn new(self_descriptor: PeerDescriptor, discovery_endpoints: Vec<String>) -> Self {
        DiscoveryConfig {
            self_descriptor,
            discovery_endpoints,
            broadcast_interval: Duration::from_secs(60),
            connect_retry_delay: Duration::from_millis(500),
        }
    }
}

/// Owns the set of peers discovered so far (§3 Ownership: one instance
/// per process). `connect_known_peers` is split out from `run_cycle` so
/// callers can drive it independently of the broadcast timer in tests.
pub struct DiscoveryService {
    config: DiscoveryConfig,
    client: Arc<dyn DiscoveryClient>,
    connector: Arc<dyn PeerConnector>,
    discovered: RwLock<HashMap<String, PeerDescriptor>>,
}

impl DiscoveryService {
    pub fn new(config: DiscoveryConfig, client: Arc<dyn DiscoveryClient>, connector: Arc<dyn PeerConnector>) -> Self {
        DiscoveryService {
            config,
            client,
            connector,
            discovered: RwLock::new(HashMap::new()),
        }
    }

    pub fn discovered_peers(&self) -> Vec<PeerDescriptor> {
        self.discovered.read().values().cloned().collect()
    }

    /// One announce+fetch+merge+connect pass across every configured
    /// endpoint. Every network failure is a warning (§4.15 "never
    /// fatal"); one endpoint's failure does not stop the others.
    pub async fn run_cycle(&self) {
        for endpoint in &self.config.discovery_endpoints {
            if let Err(err) = self.client.announce(endpoint, &self.config.self_descriptor).await {
                log::warn!("discovery: announce to {} failed: {}", endpoint, err);
            }

            match self.client.fetch_peers(endpoint).await {
                Ok(peers) => self.merge_and_connect(peers).await,
                Err(err) => log::warn!("discovery: fetch from {} failed: {}", endpoint, err),
            }
        }
    }

    async fn merge_and_connect(&self, fetched: Vec<PeerDescriptor>) {
        let self_id = self.config.self_descriptor.node_id.clone();
        let mut newly_discovered = Vec::new();
        {
            let mut discovered = self.discovered.write();
            for peer in fetched {
                if peer.node_id == self_id {
                    continue;
                }
                if discovered.insert(peer.node_id.clone(), peer.clone()).is_none() {
                    newly_discovered.push(peer);
                }
            }
        }
        for peer in newly_discovered {
            connect_with_retries(self.connector.as_ref(), &peer, self.config.connect_retry_delay).await;
        }
    }

    /// Runs `run_cycle` on `config.broadcast_interval` until `shutdown`
    /// resolves. The caller drives shutdown the same way the telemetry
    /// buffer and connection pool background loops are stopped (§5).
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.broadcast_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_cycle().await,
                _ = &mut shutdown => {
                    log::info!("discovery: shutting down");
                    break;
                }
            }
        }
    }
}
