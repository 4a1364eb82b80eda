//! Multi-peer, multi-class rate limiter with circuit breaker (§4.5).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ilc_service::PeerId;
use parking_lot::{Mutex, RwLock};

use crate::clock::Clock;
use crate::token_bucket::TokenBucket;

/// Classes of request the rate limiter can be asked about (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    BtpConnection,
    BtpMessage,
    IlpPacket,
    Settlement,
    HttpApi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Allowed,
    Throttled,
    Blocked,
}

/// Observes rate-limiter decisions; the connector bridges this to the
/// telemetry event bus (kept abstract here so this crate has no
/// dependency on `ilc-telemetry`, per §9's dynamic-dispatch guidance).
pub trait RateLimitObserver: Send + Sync {
    fn on_outcome(&self, peer: &PeerId, class: RequestClass, outcome: CheckOutcome);
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests_per_second: f64,
    pub max_requests_per_minute: f64,
    pub burst_size: f64,
    pub block_duration: Duration,
    pub violation_threshold: u32,
    pub violation_window: Duration,
    pub adaptive: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            max_requests_per_second: 100.0,
            max_requests_per_minute: 3000.0,
            burst_size: 100.0,
            block_duration: Duration::from_secs(30),
            violation_threshold: 5,
            violation_window: Duration::from_secs(10),
            adaptive: false,
        }
    }
}

const MIN_ADAPTIVE_MULTIPLIER: f64 = 0.1;
const MAX_ADAPTIVE_MULTIPLIER: f64 = 10.0;
const ADAPTIVE_STEP: f64 = 0.1;

struct RateLimitState {
    per_second: TokenBucket,
    per_minute: TokenBucket,
    violations: VecDeque<Instant>,
    blocked_until: Option<Instant>,
    adaptive_multiplier: f64,
}

impl RateLimitState {
    fn new(config: &RateLimitConfig, now: Instant) -> Self {
        RateLimitState {
            per_second: TokenBucket::new(config.burst_size, config.max_requests_per_second, now)
                .expect("rate limit config validated at construction"),
            per_minute: TokenBucket::new(
                config.burst_size,
                config.max_requests_per_minute / 60.0,
                now,
            )
            .expect("rate limit config validated at construction"),
            violations: VecDeque::new(),
            blocked_until: None,
            adaptive_multiplier: 1.0,
        }
    }
}

#[derive(Hash, PartialEq, Eq, Clone)]
struct Key(PeerId, u8);

fn class_tag(class: RequestClass) -> u8 {
    match class {
        RequestClass::BtpConnection => 0,
        RequestClass::BtpMessage => 1,
        RequestClass::IlpPacket => 2,
        RequestClass::Settlement => 3,
        RequestClass::HttpApi => 4,
    }
}

/// The process's single rate limiter instance (§3 Ownership). State is
/// sharded per `(peer, class)`; each shard serializes its own updates via
/// its own `Mutex`, so exhausting one peer's bucket never blocks another
/// peer's decision (§8.4).
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    default_config: RateLimitConfig,
    peer_overrides: RwLock<HashMap<PeerId, RateLimitConfig>>,
    trusted_peers: RwLock<HashSet<PeerId>>,
    shards: RwLock<HashMap<Key, Arc<Mutex<RateLimitState>>>>,
    observer: Option<Arc<dyn RateLimitObserver>>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>, default_config: RateLimitConfig) -> Self {
        RateLimiter {
            clock,
            default_config,
            peer_overrides: RwLock::new(HashMap::new()),
            trusted_peers: RwLock::new(HashSet::new()),
            shards: RwLock::new(HashMap::new()),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RateLimitObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn set_peer_config(&self, peer: PeerId, config: RateLimitConfig) {
        self.peer_overrides.write().insert(peer, config);
    }

    pub fn set_trusted_peers(&self, peers: HashSet<PeerId>) {
        *self.trusted_peers.write() = peers;
    }

    fn config_for(&self, peer: &PeerId) -> RateLimitConfig {
        self.peer_overrides
            .read()
            .get(peer)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }

    fn shard(&self, peer: &PeerId, class: RequestClass) -> Arc<Mutex<RateLimitState>> {
        let key = Key(peer.clone(), class_tag(class));
        if let Some(shard) = self.shards.read().get(&key) {
            return shard.clone();
        }
        let config = self.config_for(peer);
        let now = self.clock.now();
        let mut shards = self.shards.write();
        shards
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(RateLimitState::new(&config, now))))
            .clone()
    }

    /// Decides whether a request from `peer` of class `class` is allowed.
    /// Never blocks the caller (§4.5).
    pub fn check(&self, peer: &PeerId, class: RequestClass) -> CheckOutcome {
        let shard = self.shard(peer, class);
        let config = self.config_for(peer);
        let now = self.clock.now();
        let mut state = shard.lock();

        if let Some(blocked_until) = state.blocked_until {
            if now < blocked_until {
                state.violations.push_back(now);
                self.notify(peer, class, CheckOutcome::Blocked);
                return CheckOutcome::Blocked;
            }
            state.blocked_until = None;
        }

        if config.adaptive {
            let effective_per_second = config.max_requests_per_second * state.adaptive_multiplier;
            let effective_per_minute =
                config.max_requests_per_minute * state.adaptive_multiplier / 60.0;
            state.per_second.set_refill_rate(effective_per_second);
            state.per_minute.set_refill_rate(effective_per_minute);
        }

        let per_second_ok = state.per_second.available_tokens(now) >= 1.0;
        let per_minute_ok = state.per_minute.available_tokens(now) >= 1.0;

        let outcome = if per_second_ok && per_minute_ok {
            state.per_second.try_consume(1.0, now);
            state.per_minute.try_consume(1.0, now);
            CheckOutcome::Allowed
        } else {
            CheckOutcome::Throttled
        };

        if outcome != CheckOutcome::Allowed {
            state.violations.push_back(now);
            prune_violations(&mut state.violations, now, config.violation_window);

            if config.adaptive {
                state.adaptive_multiplier =
                    (state.adaptive_multiplier - ADAPTIVE_STEP).max(MIN_ADAPTIVE_MULTIPLIER);
            }

            let trusted = self.trusted_peers.read().contains(peer);
            if !trusted && state.violations.len() as u32 >= config.violation_threshold {
                state.blocked_until = Some(now + config.block_duration);
                self.notify(peer, class, CheckOutcome::Blocked);
                return CheckOutcome::Blocked;
            }
        } else {
            prune_violations(&mut state.violations, now, config.violation_window);
        }

        self.notify(peer, class, outcome);
        outcome
    }

    /// Raises trust for `peer`/`class`, increasing the adaptive multiplier
    /// (capped at 10). No-op if adaptive mode is off for that peer.
    pub fn increase_trust(&self, peer: &PeerId, class: RequestClass, step: f64) {
        let shard = self.shard(peer, class);
        let mut state = shard.lock();
        state.adaptive_multiplier = (state.adaptive_multiplier + step).min(MAX_ADAPTIVE_MULTIPLIER);
    }

    /// Clears the circuit-breaker block for every class of `peer`.
    pub fn unblock(&self, peer: &PeerId) {
        let shards = self.shards.read();
        for (key, shard) in shards.iter() {
            if &key.0 == peer {
                let mut state = shard.lock();
                state.blocked_until = None;
                state.violations.clear();
            }
        }
    }

    pub fn blocked_peers(&self) -> HashSet<PeerId> {
        let now = self.clock.now();
        let shards = self.shards.read();
        shards
            .iter()
            .filter_map(|(key, shard)| {
                let state = shard.lock();
                match state.blocked_until {
                    Some(t) if t > now => Some(key.0.clone()),
                    _ => None,
                }
            })
            .collect()
    }
}

fn prune_violations(violations: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = violations.front() {
        if now.duration_since(*front) > window {
            violations.pop_front();
        } else {
            break;
        }
    }
}

impl RateLimiter {
    fn notify(&self, peer: &PeerId, class: RequestClass, outcome: CheckOutcome) {
        if let Some(observer) = &self.observer {
            observer.on_outcome(peer, class, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;

    fn limiter_with(config: RateLimitConfig) -> (RateLimiter, TestClock) {
        let clock = TestClock::new();
        let limiter = RateLimiter::new(Arc::new(clock.clone()), config);
        (limiter, clock)
    }

    #[test]
    fn burst_then_throttle() {
        let config = RateLimitConfig {
            burst_size: 5.0,
            max_requests_per_second: 1.0,
            max_requests_per_minute: 6000.0,
            violation_threshold: 100,
            ..Default::default()
        };
        let (limiter, _clock) = limiter_with(config);
        let peer = PeerId::new("alice");
        let mut allowed = 0;
        let mut throttled = 0;
        for _ in 0..10 {
            match limiter.check(&peer, RequestClass::IlpPacket) {
                CheckOutcome::Allowed => allowed += 1,
                CheckOutcome::Throttled => throttled += 1,
                CheckOutcome::Blocked => panic!("should not block before threshold"),
            }
        }
        assert_eq!(allowed, 5);
        assert_eq!(throttled, 5);
    }

    #[test]
    fn per_peer_buckets_are_independent() {
        let config = RateLimitConfig {
            burst_size: 1.0,
            max_requests_per_second: 1.0,
            max_requests_per_minute: 6000.0,
            ..Default::default()
        };
        let (limiter, _clock) = limiter_with(config);
        let alice = PeerId::new("alice");
        let bob = PeerId::new("bob");
        assert_eq!(limiter.check(&alice, RequestClass::IlpPacket), CheckOutcome::Allowed);
        assert_eq!(limiter.check(&alice, RequestClass::IlpPacket), CheckOutcome::Throttled);
        // Bob is unaffected by Alice exhausting her bucket.
        assert_eq!(limiter.check(&bob, RequestClass::IlpPacket), CheckOutcome::Allowed);
    }

    #[test]
    fn circuit_breaker_opens_after_threshold_and_closes_after_duration() {
        let config = RateLimitConfig {
            burst_size: 1.0,
            max_requests_per_second: 0.0001,
            max_requests_per_minute: 0.0001,
            violation_threshold: 3,
            violation_window: Duration::from_secs(10),
            block_duration: Duration::from_secs(30),
            ..Default::default()
        };
        let (limiter, clock) = limiter_with(config);
        let peer = PeerId::new("alice");
        assert_eq!(limiter.check(&peer, RequestClass::IlpPacket), CheckOutcome::Allowed);
        for _ in 0..3 {
            limiter.check(&peer, RequestClass::IlpPacket);
        }
        assert!(limiter.blocked_peers().contains(&peer));
        assert_eq!(limiter.check(&peer, RequestClass::IlpPacket), CheckOutcome::Blocked);

        clock.advance(Duration::from_secs(31));
        // Circuit should now be closed (still throttled since bucket is
        // still empty, but no longer Blocked).
        assert_ne!(limiter.check(&peer, RequestClass::IlpPacket), CheckOutcome::Blocked);
    }

    #[test]
    fn trusted_peers_never_blocked() {
        let config = RateLimitConfig {
            burst_size: 1.0,
            max_requests_per_second: 0.0001,
            max_requests_per_minute: 0.0001,
            violation_threshold: 2,
            ..Default::default()
        };
        let (limiter, _clock) = limiter_with(config);
        let peer = PeerId::new("trusted-peer");
        let mut trusted = HashSet::new();
        trusted.insert(peer.clone());
        limiter.set_trusted_peers(trusted);
        for _ in 0..10 {
            assert_ne!(limiter.check(&peer, RequestClass::IlpPacket), CheckOutcome::Blocked);
        }
    }

    #[test]
    fn unblock_clears_circuit() {
        let config = RateLimitConfig {
            burst_size: 1.0,
            max_requests_per_second: 0.0001,
            max_requests_per_minute: 0.0001,
            violation_threshold: 1,
            block_duration: Duration::from_secs(600),
            ..Default::default()
        };
        let (limiter, _clock) = limiter_with(config);
        let peer = PeerId::new("alice");
        limiter.check(&peer, RequestClass::IlpPacket);
        limiter.check(&peer, RequestClass::IlpPacket);
        assert!(limiter.blocked_peers().contains(&peer));
        limiter.unblock(&peer);
        assert!(!limiter.blocked_peers().contains(&peer));
    }
}
