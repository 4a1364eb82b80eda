//! `Node`: the composition root wiring every `ilc-*` crate into one
//! running connector process (§3 Ownership, §5 lifecycle).

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ilc_audit::{AuditOperation, AuditSink, InMemoryAuditSink};
use ilc_btp::{PeerSession, SessionConfig};
use ilc_connector::{HandlerConfig, PacketHandler};
use ilc_discovery::{DiscoveryConfig, DiscoveryService, PeerConnector, PeerDescriptor};
use ilc_explorer::{ExplorerServer, ExplorerState, Fetcher, Fetchers, OriginAllowlist, WsHub};
use ilc_fraud::{
    FraudDetector, FraudDetectorConfig, FraudObserver, PauseReason, RapidFundingRule, Rule, Severity,
    StatisticalOutlierRule,
};
use ilc_packet::IlpAddress;
use ilc_ratelimit::{RateLimitConfig, RateLimiter, SystemClock};
use ilc_router::RoutingTable;
use ilc_service::{Account, IncomingService, PeerId};
use ilc_store::EventStore;
use ilc_telemetry::{BufferConfig, EventBus, FlushError, FlushFn, TelemetryBuffer, TelemetryEvent, Unsubscribe};
use log::{error, info, warn};
use parking_lot::RwLock;
use tokio::sync::oneshot;
use url::Url;

use crate::account::NodeAccount;
use crate::config::NodeConfig;
use crate::discovery_client::HttpDiscoveryClient;
use crate::registry::InMemoryPeerRegistry;

#[derive(Debug)]
pub enum NodeError {
    InvalidAddress(String),
    InvalidConfig(String),
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeError::InvalidAddress(msg) => write!(f, "invalid ILP address: {}", msg),
            NodeError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for NodeError {}

/// Flushes telemetry batches into the durable `EventStore` and fans each
/// event out to the explorer's WebSocket hub via the bus it was already
/// emitted on (the store is the sink; the bus already delivered the
/// live copy, so this flush only needs to persist).
struct StoreFlush {
    store: EventStore,
}

#[async_trait]
impl FlushFn for StoreFlush {
    async fn flush(&self, batch: Vec<TelemetryEvent>) -> Result<(), FlushError> {
        for event in batch {
            self.store.store(event);
        }
        Ok(())
    }
}

/// Connects a freshly discovered peer by dialing its announced BTP
/// endpoint and registering the resulting session (§4.15). Discovered
/// peers carry no shared secret of their own — discovery seeds routing
/// reachability among nodes that still authenticate bilaterally; a
/// peer this connects is accepted only if its `AuthVerifier` already
/// has a statically configured account for it (see DESIGN.md).
struct DiscoveredPeerConnector {
    handler: Arc<dyn IncomingService<NodeAccount>>,
    registry: Arc<InMemoryPeerRegistry<NodeAccount>>,
    sessions: Arc<RwLock<Vec<Arc<PeerSession<NodeAccount>>>>>,
    self_account: NodeAccount,
}

#[async_trait]
impl PeerConnector for DiscoveredPeerConnector {
    async fn connect(&self, peer: &PeerDescriptor) -> Result<(), String> {
        let existing = self
            .registry
            .accounts()
            .into_iter()
            .find(|a| a.id().as_str() == peer.node_id);
        let account = match existing {
            Some(account) => account,
            None => return Err(format!("no statically configured account for discovered peer {}", peer.node_id)),
        };
        let url = Url::parse(&peer.btp_endpoint).map_err(|e| e.to_string())?;
        let config = SessionConfig::new(account.id().clone(), url, account.auth_token.clone());
        let session = PeerSession::new(config, self.handler.clone(), self.self_account.clone());
        self.registry.set_session(account.id().clone(), session.clone());
        self.sessions.write().push(session.clone());
        tokio::spawn(session.run());
        Ok(())
    }
}

/// Bridges fraud-detector decisions into the audit log (§4.14 names
/// `FraudDetected`/`PeerPaused`/`PeerResumed` as audit-relevant
/// operations).
struct AuditFraudObserver {
    audit: Arc<dyn AuditSink>,
}

impl FraudObserver for AuditFraudObserver {
    fn on_fraud_detected(&self, peer: &PeerId, rule: &str, severity: Severity, details: &str) {
        self.audit.record(
            AuditOperation::FraudDetected,
            peer.as_str(),
            serde_json::json!({ "rule": rule, "severity": format!("{:?}", severity), "details": details }),
        );
    }

    fn on_peer_paused(&self, peer: &PeerId, reason: &PauseReason) {
        self.audit.record(
            AuditOperation::PeerPaused,
            peer.as_str(),
            serde_json::json!({ "rule": reason.rule, "severity": format!("{:?}", reason.severity), "reason": reason.reason }),
        );
    }

    fn on_peer_resumed(&self, peer: &PeerId) {
        self.audit.record(AuditOperation::PeerResumed, peer.as_str(), serde_json::json!({}));
    }
}

/// Backs `/api/peers`: the explorer has no account state of its own, so
/// the node hands it a fetcher over the live registry (§4.12).
struct RegistryPeersFetcher {
    registry: Arc<InMemoryPeerRegistry<NodeAccount>>,
}

#[async_trait]
impl Fetcher for RegistryPeersFetcher {
    async fn fetch(&self) -> serde_json::Value {
        let accounts = self.registry.accounts();
        serde_json::json!(accounts
            .iter()
            .map(|a| serde_json::json!({
                "id": a.id().as_str(),
                "ilpPrefix": a.ilp_prefix().map(|p| p.as_str()),
                "capabilities": a.capabilities().iter().collect::<Vec<_>>(),
            }))
            .collect::<Vec<_>>())
    }
}

/// Backs `/api/routes` over the live `RoutingTable` (§4.12).
struct RoutingTableFetcher {
    routes: Arc<RoutingTable>,
}

#[async_trait]
impl Fetcher for RoutingTableFetcher {
    async fn fetch(&self) -> serde_json::Value {
        let routes = self.routes.routes();
        serde_json::json!(routes
            .iter()
            .map(|r| serde_json::json!({
                "prefix": r.prefix.as_str(),
                "nextHop": r.next_hop.as_str(),
                "priority": r.priority,
            }))
            .collect::<Vec<_>>())
    }
}

fn parse_severity(value: &str) -> Severity {
    match value.to_ascii_lowercase().as_str() {
        "low" => Severity::Low,
        "medium" => Severity::Medium,
        "critical" => Severity::Critical,
        _ => Severity::High,
    }
}

/// The running process's full set of wired-together singletons (§3
/// Ownership: "one instance per process" for every component named
/// here).
pub struct Node {
    config: NodeConfig,
    self_address: IlpAddress,
    registry: Arc<InMemoryPeerRegistry<NodeAccount>>,
    routes: Arc<RoutingTable>,
    rate_limiter: Arc<RateLimiter>,
    fraud: Arc<FraudDetector>,
    events: Arc<EventBus>,
    store: EventStore,
    telemetry: Arc<TelemetryBuffer>,
    audit: Arc<dyn AuditSink>,
    handler: Arc<dyn IncomingService<NodeAccount>>,
    /// Concrete session handles, kept alongside the registry's type-erased
    /// `OutgoingService` entries so shutdown can call `PeerSession::shutdown`
    /// directly (the registry only hands back `Arc<dyn OutgoingService<_>>`,
    /// which has no shutdown hook).
    sessions: Arc<RwLock<Vec<Arc<PeerSession<NodeAccount>>>>>,
    // Keeps the bus subscription that feeds the telemetry buffer alive;
    // `Unsubscribe` tears the subscription down when dropped.
    _telemetry_subscription: Unsubscribe,
}

impl Node {
    pub fn bootstrap(config: NodeConfig) -> Result<Self, NodeError> {
        let self_id = PeerId::new(config.node.node_id.clone());
        let self_address =
            IlpAddress::new(config.node.ilp_address.clone()).map_err(|e| NodeError::InvalidAddress(e.to_string()))?;

        let routes = Arc::new(RoutingTable::new(self_id.clone()));
        for route in &config.routes {
            let prefix = IlpAddress::new(route.prefix.clone()).map_err(|e| NodeError::InvalidAddress(e.to_string()))?;
            routes
                .add(prefix, PeerId::new(route.next_hop.clone()), route.priority)
                .map_err(|e| NodeError::InvalidConfig(e.to_string()))?;
        }

        let registry: Arc<InMemoryPeerRegistry<NodeAccount>> = Arc::new(InMemoryPeerRegistry::new());
        for peer in &config.peers {
            let mut account = NodeAccount::new(PeerId::new(peer.id.clone()), peer.auth_token.clone());
            if let Some(prefix) = &peer.ilp_prefix {
                account = account
                    .with_ilp_prefix(IlpAddress::new(prefix.clone()).map_err(|e| NodeError::InvalidAddress(e.to_string()))?);
            }
            account = account.with_capabilities(peer.capabilities.iter().cloned().collect());
            let url = Url::parse(&peer.url).map_err(|e| NodeError::InvalidConfig(e.to_string()))?;
            account = account.with_btp_url(url);
            registry.register_account(account);
        }

        let rate_limit_config = RateLimitConfig {
            max_requests_per_second: config.rate_limits.max_requests_per_second,
            max_requests_per_minute: config.rate_limits.max_requests_per_minute,
            burst_size: config.rate_limits.burst_size,
            block_duration: Duration::from_secs(config.rate_limits.block_duration_secs),
            violation_threshold: config.rate_limits.violation_threshold,
            violation_window: Duration::from_secs(config.rate_limits.violation_window_secs),
            adaptive: config.rate_limits.adaptive,
        };
        let rate_limiter = Arc::new(RateLimiter::new(Arc::new(SystemClock), rate_limit_config.clone()));
        for (peer_id, overrides) in &config.rate_limits.peer_limits {
            let mut peer_config = rate_limit_config.clone();
            if let Some(v) = overrides.max_requests_per_second {
                peer_config.max_requests_per_second = v;
            }
            if let Some(v) = overrides.max_requests_per_minute {
                peer_config.max_requests_per_minute = v;
            }
            if let Some(v) = overrides.burst_size {
                peer_config.burst_size = v;
            }
            rate_limiter.set_peer_config(PeerId::new(peer_id.clone()), peer_config);
        }
        let trusted: HashSet<PeerId> = config.rate_limits.trusted_peers.iter().map(|p| PeerId::new(p.clone())).collect();
        rate_limiter.set_trusted_peers(trusted);

        let fraud_rules: Vec<Arc<dyn Rule>> = if config.fraud.enabled {
            vec![
                Arc::new(RapidFundingRule {
                    threshold: config.fraud.rapid_funding_threshold,
                }),
                Arc::new(StatisticalOutlierRule {
                    std_dev_threshold: config.fraud.unusual_transaction_std_dev,
                    min_samples: 10,
                }),
            ]
        } else {
            Vec::new()
        };
        let audit: Arc<dyn AuditSink> = Arc::new(InMemoryAuditSink::new());

        let fraud = Arc::new(
            FraudDetector::new(
                fraud_rules,
                FraudDetectorConfig {
                    auto_pause_threshold: parse_severity(&config.fraud.auto_pause_threshold),
                },
                Arc::new(SystemClock),
            )
            .with_observer(Arc::new(AuditFraudObserver { audit: audit.clone() })),
        );

        let events = Arc::new(EventBus::new());
        let store = EventStore::new(config.telemetry.max_database_bytes);
        let telemetry = Arc::new(TelemetryBuffer::new(
            BufferConfig {
                buffer_size: config.telemetry.buffer_size,
                flush_interval_ms: config.telemetry.flush_interval_ms,
            },
            Arc::new(StoreFlush { store: store.clone() }),
        ));
        let telemetry_subscription = {
            let telemetry = telemetry.clone();
            events.subscribe(move |event| {
                let telemetry = telemetry.clone();
                tokio::spawn(async move { telemetry.push(event).await });
            })
        };

        let spending_limits = Arc::new(ilc_connector::InMemorySpendingLimitGuard::new(
            ilc_connector::SpendingLimitConfig::default(),
        ));

        let handler_config = HandlerConfig::new(config.node.node_id.clone(), self_id.clone(), self_address.clone());
        let handler: Arc<dyn IncomingService<NodeAccount>> = Arc::new(PacketHandler::new(
            handler_config,
            routes.clone(),
            rate_limiter.clone(),
            fraud.clone(),
            registry.clone(),
            spending_limits,
            events.clone(),
        ));

        Ok(Node {
            config,
            self_address,
            registry,
            routes,
            rate_limiter,
            fraud,
            events,
            store,
            telemetry,
            audit,
            handler,
            sessions: Arc::new(RwLock::new(Vec::new())),
            _telemetry_subscription: telemetry_subscription,
        })
    }

    /// The node's audit log, exposed for an operator-facing admin surface
    /// to query (§4.14); the explorer itself only ever reads telemetry.
    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    fn self_account(&self) -> NodeAccount {
        NodeAccount::new(PeerId::new(self.config.node.node_id.clone()), String::new())
            .with_ilp_prefix(self.self_address.clone())
    }

    /// Runs until `Ctrl-C`, coordinating shutdown of every background
    /// loop within the explorer's shutdown timeout (§5 "Cancellation &
    /// timeouts").
    pub async fn run(self) -> Result<(), NodeError> {
        let node = Arc::new(self);
        let mut shutdown_handles = Vec::new();

        let listen_addr: SocketAddr = ([0, 0, 0, 0], node.config.node.btp_server_port).into();
        {
            let registry = node.registry.clone();
            let handler = node.handler.clone();
            tokio::spawn(async move {
                if let Err(err) = ilc_btp::listen(listen_addr, registry, handler).await {
                    error!("btp listener exited: {}", err);
                }
            });
            info!("btp listener spawned on {}", listen_addr);
        }

        for account in node.registry.accounts() {
            let Some(url) = account.btp_url.clone() else { continue };
            let config = SessionConfig::new(account.id().clone(), url, account.auth_token.clone());
            let session = PeerSession::new(config, node.handler.clone(), node.self_account());
            node.registry.set_session(account.id().clone(), session.clone());
            node.sessions.write().push(session.clone());
            let peer_id = account.id().clone();
            tokio::spawn(async move {
                info!("dialing peer {}", peer_id);
                session.run().await;
            });
        }

        {
            let telemetry = node.telemetry.clone();
            let interval = Duration::from_millis(node.config.telemetry.flush_interval_ms);
            let (tx, mut rx) = oneshot::channel::<()>();
            shutdown_handles.push(tx);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => telemetry.flush_tick().await,
                        _ = &mut rx => break,
                    }
                }
            });
        }

        if let Some(port) = node.config.node.explorer_port {
            let addr: SocketAddr = ([0, 0, 0, 0], port).into();
            let state = ExplorerState {
                node_id: node.config.node.node_id.clone(),
                store: node.store.clone(),
                bus: node.events.clone(),
                ws_hub: Arc::new(WsHub::new()),
                started_at: ilc_explorer::StartedAt::default(),
                cors: Arc::new(OriginAllowlist::new(Vec::new())),
                fetchers: Arc::new(Fetchers {
                    balances: None,
                    peers: Some(Arc::new(RegistryPeersFetcher {
                        registry: node.registry.clone(),
                    })),
                    routes: Some(Arc::new(RoutingTableFetcher { routes: node.routes.clone() })),
                }),
            };
            state.ws_hub.attach(&node.events);
            let (tx, rx) = oneshot::channel::<()>();
            shutdown_handles.push(tx);
            tokio::spawn(async move {
                ExplorerServer::new(state).serve(addr, rx).await;
            });
            info!("explorer server spawned on {}", addr);
        }

        let discovery_service = if node.config.discovery.enabled {
            let self_descriptor = PeerDescriptor {
                node_id: node.config.node.node_id.clone(),
                btp_endpoint: node
                    .config
                    .discovery
                    .announce_address
                    .clone()
                    .unwrap_or_else(|| format!("ws://0.0.0.0:{}", node.config.node.btp_server_port)),
                ilp_address: node.config.node.ilp_address.clone(),
                capabilities: Vec::new(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            };
            let discovery_config =
                DiscoveryConfig::new(self_descriptor, node.config.discovery.discovery_endpoints.clone());
            let connector = Arc::new(DiscoveredPeerConnector {
                handler: node.handler.clone(),
                registry: node.registry.clone(),
                sessions: node.sessions.clone(),
                self_account: node.self_account(),
            });
            let service = Arc::new(DiscoveryService::new(
                discovery_config,
                Arc::new(HttpDiscoveryClient::new()),
                connector,
            ));
            let (tx, rx) = oneshot::channel::<()>();
            shutdown_handles.push(tx);
            let service_clone = service.clone();
            tokio::spawn(async move { service_clone.run(rx).await });
            Some(service)
        } else {
            None
        };
        let _ = discovery_service;

        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for shutdown signal: {}", err);
        }
        info!("shutting down");

        for session in node.sessions.read().iter() {
            session.shutdown();
        }
        for tx in shutdown_handles {
            let _ = tx.send(());
        }
        node.telemetry.shutdown().await;

        Ok(())
    }
}
