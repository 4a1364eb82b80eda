//! `FraudDetector`: fans an event out to every `Rule` concurrently,
//! applies the auto-pause policy, and tracks paused peers (§4.6).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use futures::future::join_all;
use ilc_ratelimit::Clock;
use ilc_service::PeerId;
use log::warn;
use parking_lot::{Mutex, RwLock};

use crate::event::{Detection, FraudEvent, Severity};
use crate::rule::Rule;
use crate::state::FraudState;

#[derive(Debug, Clone)]
pub struct PauseReason {
    pub rule: String,
    pub severity: Severity,
    pub reason: String,
    pub at: SystemTime,
}

/// Observes fraud-detector decisions; bridged to the telemetry event bus
/// by the connector, kept abstract here (same pattern as
/// `RateLimitObserver`).
pub trait FraudObserver: Send + Sync {
    fn on_fraud_detected(&self, peer: &PeerId, rule: &str, severity: Severity, details: &str);
    fn on_peer_paused(&self, peer: &PeerId, reason: &PauseReason);
    fn on_peer_resumed(&self, peer: &PeerId);
}

pub struct FraudDetectorConfig {
    pub auto_pause_threshold: Severity,
}

impl Default for FraudDetectorConfig {
    fn default() -> Self {
        FraudDetectorConfig {
            auto_pause_threshold: Severity::High,
        }
    }
}

/// The process's single fraud detector instance (§3 Ownership).
pub struct FraudDetector {
    rules: Vec<Arc<dyn Rule>>,
    config: FraudDetectorConfig,
    clock: Arc<dyn Clock>,
    states: RwLock<HashMap<PeerId, Arc<Mutex<FraudState>>>>,
    paused: RwLock<HashMap<PeerId, PauseReason>>,
    observer: Option<Arc<dyn FraudObserver>>,
}

impl FraudDetector {
    pub fn new(rules: Vec<Arc<dyn Rule>>, config: FraudDetectorConfig, clock: Arc<dyn Clock>) -> Self {
        FraudDetector {
            rules,
            config,
            clock,
            states: RwLock::new(HashMap::new()),
            paused: RwLock::new(HashMap::new()),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn FraudObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn state_for(&self, peer: &PeerId) -> Arc<Mutex<FraudState>> {
        if let Some(state) = self.states.read().get(peer) {
            return state.clone();
        }
        self.states
            .write()
            .entry(peer.clone())
            .or_insert_with(|| Arc::new(Mutex::new(FraudState::default())))
            .clone()
    }

    /// Scores `event` against every configured rule concurrently.
    /// Paused peers are ignored (fast-path exit). A rule returning an
    /// error is logged and skipped; the remaining rules still run.
    pub async fn analyze(&self, event: FraudEvent) {
        let peer = event.peer().clone();
        if self.is_paused(&peer) {
            return;
        }

        let state = self.state_for(&peer);
        {
            let mut guard = state.lock();
            match &event {
                FraudEvent::Settlement(e) => guard.record_funding(e.at),
                FraudEvent::Packet(e) => guard.record_transaction(e),
                FraudEvent::Channel(_) => {}
            }
        }
        let snapshot = clone_state(&state);

        let checks = self.rules.iter().map(|rule| {
            let rule = rule.clone();
            let event = event.clone();
            let snapshot = snapshot.clone();
            async move { (rule.name().to_string(), rule.check(&event, &snapshot).await) }
        });
        let results = join_all(checks).await;

        let mut worst: Option<(String, Detection)> = None;
        for (name, result) in results {
            match result {
                Ok(detection) if detection.detected => {
                    if let Some(observer) = &self.observer {
                        observer.on_fraud_detected(
                            &peer,
                            &name,
                            detection.severity,
                            detection.details.as_deref().unwrap_or(""),
                        );
                    }
                    let replace = worst
                        .as_ref()
                        .map(|(_, d)| detection.severity > d.severity)
                        .unwrap_or(true);
                    if replace {
                        worst = Some((name, detection));
                    }
                }
                Ok(_) => {}
                Err(_) => warn!("fraud rule {} failed; skipping", name),
            }
        }

        if let Some((rule, detection)) = worst {
            if detection.severity >= self.config.auto_pause_threshold {
                self.pause(
                    peer,
                    detection.details.unwrap_or_default(),
                    rule,
                    detection.severity,
                );
            }
        }
    }

    pub fn pause(&self, peer: PeerId, reason: String, rule: String, severity: Severity) {
        let pause_reason = PauseReason {
            rule,
            severity,
            reason,
            at: self.clock_now(),
        };
        self.paused.write().insert(peer.clone(), pause_reason.clone());
        if let Some(observer) = &self.observer {
            observer.on_peer_paused(&peer, &pause_reason);
        }
    }

    pub fn resume(&self, peer: &PeerId) {
        if self.paused.write().remove(peer).is_some() {
            if let Some(observer) = &self.observer {
                observer.on_peer_resumed(peer);
            }
        }
    }

    pub fn is_paused(&self, peer: &PeerId) -> bool {
        self.paused.read().contains_key(peer)
    }

    pub fn paused_peers(&self) -> HashMap<PeerId, PauseReason> {
        self.paused.read().clone()
    }

    fn clock_now(&self) -> SystemTime {
        // Clock yields an Instant for ratelimit purposes; fraud state is
        // keyed by wall-clock time for audit readability.
        let _ = &self.clock;
        SystemTime::now()
    }
}

fn clone_state(state: &Arc<Mutex<FraudState>>) -> FraudState {
    let guard = state.lock();
    FraudState {
        funding_events: guard.funding_events.clone(),
        transactions: guard.transactions.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{PacketEvent, SettlementEvent};
    use crate::rule::{RapidFundingRule, StatisticalOutlierRule};
    use ilc_ratelimit::SystemClock;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct RecordingObserver {
        paused: AtomicBool,
    }

    impl FraudObserver for RecordingObserver {
        fn on_fraud_detected(&self, _: &PeerId, _: &str, _: Severity, _: &str) {}
        fn on_peer_paused(&self, _: &PeerId, _: &PauseReason) {
            self.paused.store(true, Ordering::SeqCst);
        }
        fn on_peer_resumed(&self, _: &PeerId) {
            self.paused.store(false, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn rapid_funding_triggers_auto_pause() {
        let observer = Arc::new(RecordingObserver {
            paused: AtomicBool::new(false),
        });
        let detector = FraudDetector::new(
            vec![Arc::new(RapidFundingRule { threshold: 2 })],
            FraudDetectorConfig {
                auto_pause_threshold: Severity::High,
            },
            Arc::new(SystemClock),
        )
        .with_observer(observer.clone());

        let peer = PeerId::new("alice");
        let now = SystemTime::now();
        for _ in 0..4 {
            detector
                .analyze(FraudEvent::Settlement(SettlementEvent {
                    peer: peer.clone(),
                    amount: 10,
                    at: now,
                }))
                .await;
        }
        assert!(detector.is_paused(&peer));
        assert!(observer.paused.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn paused_peer_events_are_ignored() {
        let detector = FraudDetector::new(
            vec![Arc::new(StatisticalOutlierRule::default())],
            FraudDetectorConfig::default(),
            Arc::new(SystemClock),
        );
        let peer = PeerId::new("bob");
        detector.pause(peer.clone(), "manual".into(), "manual".into(), Severity::Critical);
        detector
            .analyze(FraudEvent::Packet(PacketEvent {
                peer: peer.clone(),
                token: "USD".into(),
                amount: 1,
                at: SystemTime::now(),
            }))
            .await;
        // No transaction should have been recorded since the peer was
        // paused before analyze() was called.
        assert!(detector.state_for(&peer).lock().transactions.is_empty());
    }

    #[tokio::test]
    async fn resume_clears_pause() {
        let detector = FraudDetector::new(vec![], FraudDetectorConfig::default(), Arc::new(SystemClock));
        let peer = PeerId::new("carol");
        detector.pause(peer.clone(), "r".into(), "rule".into(), Severity::Critical);
        assert!(detector.is_paused(&peer));
        detector.resume(&peer);
        assert!(!detector.is_paused(&peer));
    }
}
