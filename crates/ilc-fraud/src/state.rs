//! Per-peer fraud state: rolling funding/transaction history (§3 `FraudState`).
//!
//! Lives in-memory only, owned by the `FraudDetector`; it survives peer
//! disconnects within a process but is lost on restart (§6).

use std::collections::VecDeque;
use std::time::{Duration, SystemTime};

use crate::event::PacketEvent;

pub const FUNDING_WINDOW: Duration = Duration::from_secs(60 * 60);
pub const TRANSACTION_WINDOW: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct TransactionSample {
    pub token: String,
    pub amount: u64,
    pub at: SystemTime,
}

#[derive(Debug, Default)]
pub struct FraudState {
    pub funding_events: VecDeque<SystemTime>,
    pub transactions: VecDeque<TransactionSample>,
}

impl FraudState {
    pub fn record_funding(&mut self, at: SystemTime) {
        self.funding_events.push_back(at);
        prune(&mut self.funding_events, at, FUNDING_WINDOW);
    }

    pub fn record_transaction(&mut self, event: &PacketEvent) {
        self.transactions.push_back(TransactionSample {
            token: event.token.clone(),
            amount: event.amount,
            at: event.at,
        });
        prune_transactions(&mut self.transactions, event.at, TRANSACTION_WINDOW);
    }

    pub fn funding_count_within_window(&self, now: SystemTime) -> usize {
        self.funding_events
            .iter()
            .filter(|t| now.duration_since(**t).map(|d| d <= FUNDING_WINDOW).unwrap_or(true))
            .count()
    }

    pub fn samples_for_token(&self, token: &str, now: SystemTime) -> Vec<u64> {
        self.transactions
            .iter()
            .filter(|s| {
                s.token == token
                    && now
                        .duration_since(s.at)
                        .map(|d| d <= TRANSACTION_WINDOW)
                        .unwrap_or(true)
            })
            .map(|s| s.amount)
            .collect()
    }

    pub fn has_seen_any_transaction(&self) -> bool {
        !self.transactions.is_empty()
    }

    pub fn has_seen_token(&self, token: &str) -> bool {
        self.transactions.iter().any(|s| s.token == token)
    }
}

fn prune(ring: &mut VecDeque<SystemTime>, now: SystemTime, window: Duration) {
    while let Some(front) = ring.front() {
        if now.duration_since(*front).map(|d| d > window).unwrap_or(false) {
            ring.pop_front();
        } else {
            break;
        }
    }
}

fn prune_transactions(ring: &mut VecDeque<TransactionSample>, now: SystemTime, window: Duration) {
    while let Some(front) = ring.front() {
        if now.duration_since(front.at).map(|d| d > window).unwrap_or(false) {
            ring.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn funding_outside_the_one_hour_window_is_pruned() {
        let mut state = FraudState::default();
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        state.record_funding(t0);
        state.record_funding(t0 + Duration::from_secs(30 * 60));

        let within = t0 + Duration::from_secs(59 * 60);
        assert_eq!(state.funding_count_within_window(within), 2);

        // a funding event recorded two hours after t0 should prune t0 out
        state.record_funding(t0 + Duration::from_secs(2 * 60 * 60));
        assert_eq!(state.funding_events.len(), 2);
    }

    #[test]
    fn samples_for_token_excludes_other_tokens_and_stale_entries() {
        let mut state = FraudState::default();
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        state.record_transaction(&PacketEvent {
            peer: ilc_service::PeerId::new("alice"),
            token: "USD".into(),
            amount: 100,
            at: t0,
        });
        state.record_transaction(&PacketEvent {
            peer: ilc_service::PeerId::new("alice"),
            token: "EUR".into(),
            amount: 50,
            at: t0,
        });

        let now = t0 + Duration::from_secs(60);
        assert_eq!(state.samples_for_token("USD", now), vec![100]);
        assert_eq!(state.samples_for_token("EUR", now), vec![50]);
        assert!(state.samples_for_token("GBP", now).is_empty());
    }

    #[test]
    fn has_seen_token_tracks_prior_transactions() {
        let mut state = FraudState::default();
        assert!(!state.has_seen_any_transaction());
        assert!(!state.has_seen_token("USD"));
        state.record_transaction(&PacketEvent {
            peer: ilc_service::PeerId::new("alice"),
            token: "USD".into(),
            amount: 1,
            at: SystemTime::now(),
        });
        assert!(state.has_seen_any_transaction());
        assert!(state.has_seen_token("USD"));
        assert!(!state.has_seen_token("EUR"));
    }
}
