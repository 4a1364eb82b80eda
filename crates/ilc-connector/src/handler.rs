//! `PacketHandler`: the Prepare → Fulfill/Reject state machine composing
//! routing, rate limiting, and fraud defense (§4.8). This is the
//! composition root the spec calls "the heart of the data plane".

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::Utc;
use ilc_fraud::{FraudDetector, FraudEvent, PacketEvent};
use ilc_packet::{check_condition, packet, ErrorCode, IlpAddress, Prepare, RejectBuilder};
use ilc_ratelimit::{CheckOutcome, RateLimiter, RequestClass};
use ilc_router::RoutingTable;
use ilc_service::{Account, IlpResult, IncomingRequest, IncomingService, OutgoingRequest, PeerId};
use ilc_telemetry::{PacketOutcome, TelemetryEvent};
use log::info;
use uuid::Uuid;

use crate::registry::PeerRegistry;
use crate::spending_limit::{SpendingLimitError, SpendingLimitGuard};

/// Minimum slack a Prepare's `expiresAt` must have over "now" to be
/// accepted at all (§4.8 step 3, `ε_min ≥ round-trip budget`).
pub const DEFAULT_MIN_EXPIRY_MARGIN: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub node_id: String,
    pub self_peer_id: PeerId,
    pub self_address: IlpAddress,
    /// Budget subtracted from `expiresAt` for every hop this node forwards
    /// through (§4.8 step 6).
    pub hop_budget: Duration,
    /// Absolute ceiling on how long this node will hold a packet open
    /// regardless of the upstream deadline (§4.8 step 6 `max_hold`).
    pub max_hold: Duration,
    pub min_expiry_margin: Duration,
    /// Asset/currency tag this node reports transaction amounts under to
    /// the fraud detector's statistical-outlier rule (§4.6).
    pub asset_code: String,
}

impl HandlerConfig {
    pub fn new(node_id: impl Into<String>, self_peer_id: PeerId, self_address: IlpAddress) -> Self {
        HandlerConfig {
            node_id: node_id.into(),
            self_peer_id,
            self_address,
            hop_budget: Duration::from_millis(500),
            max_hold: Duration::from_secs(30),
            min_expiry_margin: DEFAULT_MIN_EXPIRY_MARGIN,
            asset_code: "USD".to_string(),
        }
    }
}

/// The process's single packet handler instance (§3 Ownership). Generic
/// over `A: Account` so it never depends on a concrete transport; the
/// `PeerRegistry` is how it reaches an `OutgoingService` for the chosen
/// next hop (§9 "cyclic references... break with message passing").
pub struct PacketHandler<A: Account> {
    config: HandlerConfig,
    routes: Arc<RoutingTable>,
    rate_limiter: Arc<RateLimiter>,
    fraud: Arc<FraudDetector>,
    registry: Arc<dyn PeerRegistry<A>>,
    spending_limits: Arc<dyn SpendingLimitGuard>,
    events: Arc<ilc_telemetry::EventBus>,
    /// Handles Prepares destined under this node's own prefix, e.g. a
    /// STREAM receiver. `None` means this node forwards only.
    local_receiver: Option<Arc<dyn IncomingService<A>>>,
}

impl<A: Account> PacketHandler<A> {
    pub fn new(
        config: HandlerConfig,
        routes: Arc<RoutingTable>,
        rate_limiter: Arc<RateLimiter>,
        fraud: Arc<FraudDetector>,
        registry: Arc<dyn PeerRegistry<A>>,
        spending_limits: Arc<dyn SpendingLimitGuard>,
        events: Arc<ilc_telemetry::EventBus>,
    ) -> Self {
        PacketHandler {
            config,
            routes,
            rate_limiter,
            fraud,
            registry,
            spending_limits,
            events,
            local_receiver: None,
        }
    }

    pub fn with_local_receiver(mut self, receiver: Arc<dyn IncomingService<A>>) -> Self {
        self.local_receiver = Some(receiver);
        self
    }

    fn reject(&self, code: ErrorCode, message: impl Into<String>) -> ilc_packet::Reject {
        RejectBuilder {
            code: Some(code),
            triggered_by: Some(self.config.self_address.clone()),
            message: message.into(),
            data: Default::default(),
        }
        .build()
    }

    fn emit(&self, event: TelemetryEvent) {
        self.events.emit(event);
    }

    fn emit_rate_limited(&self, peer: &PeerId, outcome: CheckOutcome) {
        self.emit(TelemetryEvent::RateLimited {
            node_id: self.config.node_id.clone(),
            timestamp: Utc::now(),
            peer_id: peer.to_string(),
            class: "ILP_PACKET".to_string(),
            outcome: format!("{:?}", outcome),
        });
    }

    fn emit_rejected(&self, peer_in: &PeerId, correlation_id: &str, reject: &ilc_packet::Reject) {
        self.emit(TelemetryEvent::PacketRejected {
            node_id: self.config.node_id.clone(),
            timestamp: Utc::now(),
            correlation_id: Some(correlation_id.to_string()),
            peer_in: peer_in.to_string(),
            code: reject.code.as_str().to_string(),
            message: reject.message.clone(),
        });
        info!(
            "reject correlation_id={} peer_in={} code={} message={}",
            correlation_id, peer_in, reject.code, reject.message
        );
    }

    fn emit_processed(
        &self,
        peer_in: &PeerId,
        peer_out: Option<&PeerId>,
        destination: &IlpAddress,
        amount: u64,
        latency: Duration,
        correlation_id: &str,
        outcome: PacketOutcome,
    ) {
        self.emit(TelemetryEvent::PacketProcessed {
            node_id: self.config.node_id.clone(),
            timestamp: Utc::now(),
            correlation_id: Some(correlation_id.to_string()),
            peer_in: peer_in.to_string(),
            peer_out: peer_out.map(|p| p.to_string()),
            destination: destination.as_str().to_string(),
            amount,
            latency_ms: latency.as_millis() as u64,
            outcome,
        });
    }

    /// §4.8's seven numbered steps plus the final telemetry emission.
    async fn process(&self, from: &A, prepare: Prepare) -> IlpResult {
        let correlation_id = Uuid::new_v4().to_string();
        let peer_in = from.id().clone();
        let started = SystemTime::now();

        // Step 1: peer status.
        if self.fraud.is_paused(&peer_in) {
            let reject = self.reject(ErrorCode::F99_APPLICATION_ERROR, "peer is paused");
            self.emit_rejected(&peer_in, &correlation_id, &reject);
            return Err(reject);
        }

        // Step 2: rate limit.
        match self.rate_limiter.check(&peer_in, RequestClass::IlpPacket) {
            CheckOutcome::Allowed => {}
            outcome @ (CheckOutcome::Throttled | CheckOutcome::Blocked) => {
                self.emit_rate_limited(&peer_in, outcome);
                let reject = self.reject(ErrorCode::T05_RATE_LIMITED, "rate limited");
                self.emit_rejected(&peer_in, &correlation_id, &reject);
                return Err(reject);
            }
        }

        // Step 3: validate.
        let now = SystemTime::now();
        if prepare.amount == 0 {
            let reject = self.reject(ErrorCode::F99_APPLICATION_ERROR, "amount must be greater than zero");
            self.emit_rejected(&peer_in, &correlation_id, &reject);
            return Err(reject);
        }
        let margin_ok = prepare
            .expires_at
            .duration_since(now)
            .map(|remaining| remaining >= self.config.min_expiry_margin)
            .unwrap_or(false);
        if !margin_ok {
            let reject = self.reject(
                ErrorCode::R00_TRANSFER_TIMED_OUT,
                "expiresAt leaves insufficient round-trip margin",
            );
            self.emit_rejected(&peer_in, &correlation_id, &reject);
            return Err(reject);
        }
        if let Err(err) = self.spending_limits.check(&peer_in, prepare.amount, now) {
            let reject = self.reject(ErrorCode::F99_APPLICATION_ERROR, spending_limit_message(err));
            self.emit_rejected(&peer_in, &correlation_id, &reject);
            return Err(reject);
        }

        // Step 4: self-destination.
        if self.config.self_address.is_prefix_of(&prepare.destination) {
            let receiver = match &self.local_receiver {
                Some(receiver) => receiver,
                None => {
                    let reject = self.reject(
                        ErrorCode::F02_UNREACHABLE,
                        "no local receiver registered for this address",
                    );
                    self.emit_rejected(&peer_in, &correlation_id, &reject);
                    return Err(reject);
                }
            };
            let request = IncomingRequest {
                from: from.clone(),
                prepare: prepare.clone(),
            };
            let result = self.finalize(&prepare, receiver.handle_request(request).await);
            let latency = SystemTime::now().duration_since(started).unwrap_or(Duration::ZERO);
            let outcome = match &result {
                Ok(_) => PacketOutcome::Fulfilled,
                Err(reject) if reject.code == ErrorCode::R00_TRANSFER_TIMED_OUT => PacketOutcome::TimedOut,
                Err(_) => PacketOutcome::Rejected,
            };
            if let Err(reject) = &result {
                self.emit_rejected(&peer_in, &correlation_id, reject);
            } else {
                self.spending_limits.record(&peer_in, prepare.amount, now);
            }
            self.emit_processed(
                &peer_in,
                None,
                &prepare.destination,
                prepare.amount,
                latency,
                &correlation_id,
                outcome,
            );
            return result;
        }

        // Step 5: route lookup.
        let route = match self.routes.lookup(&prepare.destination) {
            Some(route) => route,
            None => {
                let reject = self.reject(ErrorCode::F02_UNREACHABLE, "no route to destination");
                self.emit_rejected(&peer_in, &correlation_id, &reject);
                return Err(reject);
            }
        };

        let next_hop = route.next_hop;
        let outgoing = match self.registry.route(&next_hop) {
            Some(service) => service,
            None => {
                let reject = self.reject(ErrorCode::F02_UNREACHABLE, "next hop is not connected");
                self.emit_rejected(&peer_in, &correlation_id, &reject);
                return Err(reject);
            }
        };
        let to_account = self.registry.account(&next_hop);

        // Step 6: forward, with a hop-budget-adjusted deadline.
        let remaining = prepare.expires_at.duration_since(now).unwrap_or(Duration::ZERO);
        let outbound_deadline = remaining
            .checked_sub(self.config.hop_budget)
            .unwrap_or(Duration::ZERO)
            .min(self.config.max_hold);
        let outbound_expires_at = now + outbound_deadline;

        let mut outbound_prepare = prepare.clone();
        outbound_prepare.expires_at = outbound_expires_at;

        let request = OutgoingRequest {
            from: from.clone(),
            to: to_account.unwrap_or_else(|| from.clone()),
            original_amount: prepare.amount,
            prepare: outbound_prepare,
        };

        let result = outgoing.send_request(request).await;
        let result = self.finalize(&prepare, result);

        let latency = SystemTime::now().duration_since(started).unwrap_or(Duration::ZERO);
        let outcome = match &result {
            Ok(_) => PacketOutcome::Fulfilled,
            Err(reject) if reject.code == ErrorCode::R00_TRANSFER_TIMED_OUT => PacketOutcome::TimedOut,
            Err(_) => PacketOutcome::Rejected,
        };

        if let Err(reject) = &result {
            self.emit_rejected(&peer_in, &correlation_id, reject);
        } else {
            self.spending_limits.record(&peer_in, prepare.amount, now);
            self.fraud
                .analyze(FraudEvent::Packet(PacketEvent {
                    peer: peer_in.clone(),
                    token: self.config.asset_code.clone(),
                    amount: prepare.amount,
                    at: now,
                }))
                .await;
        }

        self.emit_processed(
            &peer_in,
            Some(&next_hop),
            &prepare.destination,
            prepare.amount,
            latency,
            &correlation_id,
            outcome,
        );

        result
    }

    /// Step 7: interpret the downstream result. Fulfills are checked
    /// against the original `executionCondition`; a mismatch becomes
    /// `F05` even though the downstream peer claimed success. A Reject is
    /// forwarded unchanged (`triggeredBy` preserved). Expiry is
    /// authoritative: a late Fulfill arriving after `now >= expiresAt` is
    /// dropped in favor of the timeout Reject the caller already has.
    fn finalize(&self, prepare: &Prepare, result: IlpResult) -> IlpResult {
        if prepare.is_expired(SystemTime::now()) {
            return Err(self.reject(ErrorCode::R00_TRANSFER_TIMED_OUT, "deadline exceeded before a response arrived"));
        }
        match result {
            Ok(fulfill) => {
                if check_condition(&prepare.execution_condition, &fulfill.fulfillment) {
                    Ok(fulfill)
                } else {
                    Err(self.reject(ErrorCode::F05_WRONG_CONDITION, "fulfillment does not match executionCondition"))
                }
            }
            Err(reject) => Err(reject),
        }
    }

}

fn spending_limit_message(err: SpendingLimitError) -> String {
    err.to_string()
}

#[async_trait]
impl<A: Account> IncomingService<A> for PacketHandler<A> {
    async fn handle_request(&self, request: IncomingRequest<A>) -> IlpResult {
        self.process(&request.from, request.prepare).await
    }
}

// Re-exported so callers constructing a `Reject` for a malformed (unparsed)
// packet before it ever reaches the handler can reuse the same codec
// error mapping the connector uses internally.
pub fn malformed_packet_reject(self_address: &IlpAddress, err: &packet::ParseError) -> ilc_packet::Reject {
    RejectBuilder {
        code: Some(ErrorCode::F00_BAD_REQUEST),
        triggered_by: Some(self_address.clone()),
        message: format!("malformed ILP packet: {}", err),
        data: Default::default(),
    }
    .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex as StdMutex;

    use bytes::Bytes;
    use ilc_fraud::{FraudDetectorConfig, RapidFundingRule};
    use ilc_packet::PrepareBuilder;
    use ilc_ratelimit::{RateLimitConfig, SystemClock};
    use ilc_router::RoutingTable;
    use ilc_service::OutgoingService;
    use ilc_telemetry::EventBus;

    use crate::spending_limit::{InMemorySpendingLimitGuard, SpendingLimitConfig};

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

    fn account(id: &str) -> TestAccount {
        TestAccount {
            id: PeerId::new(id),
            caps: HashSet::new(),
        }
    }

    struct StaticRegistry {
        routes: HashMap<String, Arc<dyn OutgoingService<TestAccount>>>,
    }

    impl PeerRegistry<TestAccount> for StaticRegistry {
        fn route(&self, peer: &PeerId) -> Option<Arc<dyn OutgoingService<TestAccount>>> {
            self.routes.get(peer.as_str()).cloned()
        }
        fn account(&self, peer: &PeerId) -> Option<TestAccount> {
            Some(account(peer.as_str()))
        }
    }

    struct FulfillEverything;

    #[async_trait]
    impl OutgoingService<TestAccount> for FulfillEverything {
        async fn send_request(&self, request: OutgoingRequest<TestAccount>) -> IlpResult {
            Ok(ilc_packet::FulfillBuilder {
                fulfillment: preimage_for(&request.prepare.execution_condition),
                data: Bytes::new(),
            }
            .build())
        }
    }

    // Test fixture only: returns a canned fulfillment already known to
    // match the condition used by `sample_prepare` below.
    fn preimage_for(_condition: &[u8; 32]) -> [u8; 32] {
        [9u8; 32]
    }

    fn condition_for(preimage: &[u8; 32]) -> [u8; 32] {
        let digest = ring::digest::digest(&ring::digest::SHA256, preimage);
        let mut out = [0u8; 32];
        out.copy_from_slice(digest.as_ref());
        out
    }

    fn sample_prepare(destination: &str) -> Prepare {
        PrepareBuilder {
            amount: 1000,
            expires_at: SystemTime::now() + Duration::from_secs(5),
            execution_condition: condition_for(&[9u8; 32]),
            destination: IlpAddress::new(destination).unwrap(),
            data: Bytes::new(),
        }
        .build()
    }

    fn handler_with_route(next_hop: &str) -> PacketHandler<TestAccount> {
        let routes = Arc::new(RoutingTable::new(PeerId::new("self")));
        routes
            .add(IlpAddress::new("g.bob").unwrap(), PeerId::new(next_hop), 0)
            .unwrap();
        let mut svc: HashMap<String, Arc<dyn OutgoingService<TestAccount>>> = HashMap::new();
        svc.insert(next_hop.to_string(), Arc::new(FulfillEverything));
        let registry = Arc::new(StaticRegistry { routes: svc });
        let rate_limiter = Arc::new(RateLimiter::new(Arc::new(SystemClock), RateLimitConfig::default()));
        let fraud = Arc::new(FraudDetector::new(
            vec![Arc::new(RapidFundingRule { threshold: 1000 })],
            FraudDetectorConfig::default(),
            Arc::new(SystemClock),
        ));
        let spending_limits = Arc::new(InMemorySpendingLimitGuard::new(SpendingLimitConfig::default()));
        let events = Arc::new(EventBus::new());
        let config = HandlerConfig::new("node-a", PeerId::new("self"), IlpAddress::new("g.connector").unwrap());
        PacketHandler::new(config, routes, rate_limiter, fraud, registry, spending_limits, events)
    }

    #[tokio::test]
    async fn happy_path_forwards_and_fulfills() {
        let handler = handler_with_route("peer-b");
        let request = IncomingRequest {
            from: account("peer-a"),
            prepare: sample_prepare("g.bob"),
        };
        let result = handler.handle_request(request).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn no_route_rejects_f02() {
        let handler = handler_with_route("peer-b");
        let request = IncomingRequest {
            from: account("peer-a"),
            prepare: sample_prepare("g.nowhere"),
        };
        let result = handler.handle_request(request).await;
        let reject = result.unwrap_err();
        assert_eq!(reject.code, ErrorCode::F02_UNREACHABLE);
        assert_eq!(reject.triggered_by, Some(IlpAddress::new("g.connector").unwrap()));
    }

    #[tokio::test]
    async fn paused_peer_is_rejected_with_f99() {
        let handler = handler_with_route("peer-b");
        handler.fraud.pause(PeerId::new("peer-a"), "manual".into(), "manual".into(), ilc_fraud::Severity::Critical);
        let request = IncomingRequest {
            from: account("peer-a"),
            prepare: sample_prepare("g.bob"),
        };
        let result = handler.handle_request(request).await;
        assert_eq!(result.unwrap_err().code, ErrorCode::F99_APPLICATION_ERROR);
    }

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        let handler = handler_with_route("peer-b");
        let mut prepare = sample_prepare("g.bob");
        prepare.amount = 0;
        let request = IncomingRequest {
            from: account("peer-a"),
            prepare,
        };
        assert!(handler.handle_request(request).await.is_err());
    }

    #[tokio::test]
    async fn expired_prepare_is_rejected() {
        let handler = handler_with_route("peer-b");
        let mut prepare = sample_prepare("g.bob");
        prepare.expires_at = SystemTime::now();
        let request = IncomingRequest {
            from: account("peer-a"),
            prepare,
        };
        let result = handler.handle_request(request).await;
        assert_eq!(result.unwrap_err().code, ErrorCode::R00_TRANSFER_TIMED_OUT);
    }

    #[tokio::test]
    async fn condition_mismatch_is_rejected_f05() {
        let routes = Arc::new(RoutingTable::new(PeerId::new("self")));
        routes.add(IlpAddress::new("g.bob").unwrap(), PeerId::new("peer-b"), 0).unwrap();

        struct WrongFulfillment;
        #[async_trait]
        impl OutgoingService<TestAccount> for WrongFulfillment {
            async fn send_request(&self, _request: OutgoingRequest<TestAccount>) -> IlpResult {
                Ok(ilc_packet::FulfillBuilder {
                    fulfillment: [0u8; 32],
                    data: Bytes::new(),
                }
                .build())
            }
        }
        let mut svc: HashMap<String, Arc<dyn OutgoingService<TestAccount>>> = HashMap::new();
        svc.insert("peer-b".to_string(), Arc::new(WrongFulfillment));
        let registry = Arc::new(StaticRegistry { routes: svc });
        let rate_limiter = Arc::new(RateLimiter::new(Arc::new(SystemClock), RateLimitConfig::default()));
        let fraud = Arc::new(FraudDetector::new(vec![], FraudDetectorConfig::default(), Arc::new(SystemClock)));
        let spending_limits = Arc::new(InMemorySpendingLimitGuard::new(SpendingLimitConfig::default()));
        let events = Arc::new(EventBus::new());
        let config = HandlerConfig::new("node-a", PeerId::new("self"), IlpAddress::new("g.connector").unwrap());
        let handler = PacketHandler::new(config, routes, rate_limiter, fraud, registry, spending_limits, events);

        let request = IncomingRequest {
            from: account("peer-a"),
            prepare: sample_prepare("g.bob"),
        };
        let result = handler.handle_request(request).await;
        assert_eq!(result.unwrap_err().code, ErrorCode::F05_WRONG_CONDITION);
    }

    #[tokio::test]
    async fn rate_limited_peer_gets_t05() {
        let routes = Arc::new(RoutingTable::new(PeerId::new("self")));
        routes.add(IlpAddress::new("g.bob").unwrap(), PeerId::new("peer-b"), 0).unwrap();
        let mut svc: HashMap<String, Arc<dyn OutgoingService<TestAccount>>> = HashMap::new();
        svc.insert("peer-b".to_string(), Arc::new(FulfillEverything));
        let registry = Arc::new(StaticRegistry { routes: svc });
        let rate_limiter = Arc::new(RateLimiter::new(
            Arc::new(SystemClock),
            RateLimitConfig {
                burst_size: 0.0,
                max_requests_per_second: 0.0,
                max_requests_per_minute: 0.0,
                violation_threshold: 1000,
                ..Default::default()
            },
        ));
        let fraud = Arc::new(FraudDetector::new(vec![], FraudDetectorConfig::default(), Arc::new(SystemClock)));
        let spending_limits = Arc::new(InMemorySpendingLimitGuard::new(SpendingLimitConfig::default()));
        let events = Arc::new(EventBus::new());
        let config = HandlerConfig::new("node-a", PeerId::new("self"), IlpAddress::new("g.connector").unwrap());
        let handler = PacketHandler::new(config, routes, rate_limiter, fraud, registry, spending_limits, events);

        let request = IncomingRequest {
            from: account("peer-a"),
            prepare: sample_prepare("g.bob"),
        };
        let result = handler.handle_request(request).await;
        assert_eq!(result.unwrap_err().code, ErrorCode::T05_RATE_LIMITED);
    }

    #[tokio::test]
    async fn self_destination_without_receiver_rejects_f02() {
        let handler = handler_with_route("peer-b");
        let request = IncomingRequest {
            from: account("peer-a"),
            prepare: sample_prepare("g.connector.sub"),
        };
        let result = handler.handle_request(request).await;
        assert_eq!(result.unwrap_err().code, ErrorCode::F02_UNREACHABLE);
    }

    #[tokio::test]
    async fn self_destination_with_receiver_is_delivered_locally() {
        struct LocalReceiver(StdMutex<bool>);
        #[async_trait]
        impl IncomingService<TestAccount> for LocalReceiver {
            async fn handle_request(&self, request: IncomingRequest<TestAccount>) -> IlpResult {
                *self.0.lock().unwrap() = true;
                Ok(ilc_packet::FulfillBuilder {
                    fulfillment: [9u8; 32],
                    data: Bytes::new(),
                }
                .build())
            }
        }
        let handler = handler_with_route("peer-b").with_local_receiver(Arc::new(LocalReceiver(StdMutex::new(false))));
        let request = IncomingRequest {
            from: account("peer-a"),
            prepare: sample_prepare("g.connector.sub"),
        };
        let result = handler.handle_request(request).await;
        assert!(result.is_ok());
    }
}
