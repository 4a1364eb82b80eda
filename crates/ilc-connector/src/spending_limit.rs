//! `SpendingLimitGuard`: transaction-size / daily / monthly caps (§9 Open
//! Question #3 — the source's spending-limit check read from an
//! implementation-specific SQL table; this spec defines the semantics,
//! not the storage schema).
//!
//! The in-memory reference implementation here is sufficient for a
//! single-process connector; a caller wanting durable limits swaps in
//! their own `SpendingLimitGuard` without touching the packet handler.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use ilc_service::PeerId;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendingLimitError {
    TransactionTooLarge,
    DailyCapExceeded,
    MonthlyCapExceeded,
}

impl std::fmt::Display for SpendingLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpendingLimitError::TransactionTooLarge => write!(f, "transaction exceeds the per-transaction cap"),
            SpendingLimitError::DailyCapExceeded => write!(f, "transaction would exceed the daily cap"),
            SpendingLimitError::MonthlyCapExceeded => write!(f, "transaction would exceed the monthly cap"),
        }
    }
}

impl std::error::Error for SpendingLimitError {}

pub trait SpendingLimitGuard: Send + Sync {
    /// Checks whether `amount` from `peer` would violate a configured cap,
    /// without recording it. Call `record` separately once the packet is
    /// actually forwarded, so a Reject never counts against the peer.
    fn check(&self, peer: &PeerId, amount: u64, now: SystemTime) -> Result<(), SpendingLimitError>;

    fn record(&self, peer: &PeerId, amount: u64, now: SystemTime);
}

#[derive(Debug, Clone)]
pub struct SpendingLimitConfig {
    pub max_transaction_amount: Option<u64>,
    pub max_daily_amount: Option<u64>,
    pub max_monthly_amount: Option<u64>,
}

impl Default for SpendingLimitConfig {
    fn default() -> Self {
        SpendingLimitConfig {
            max_transaction_amount: None,
            max_daily_amount: None,
            max_monthly_amount: None,
        }
    }
}

const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const MONTH: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Default)]
struct PeerLedger {
    daily: Vec<(SystemTime, u64)>,
    monthly: Vec<(SystemTime, u64)>,
}

/// In-memory reference `SpendingLimitGuard`. Persistence, if wanted, is
/// the caller's concern (§9 design notes, §6 "in-memory only" framing
/// extended here by analogy to rate-limit/fraud state).
pub struct InMemorySpendingLimitGuard {
    config: SpendingLimitConfig,
    ledgers: Mutex<HashMap<PeerId, PeerLedger>>,
}

impl InMemorySpendingLimitGuard {
    pub fn new(config: SpendingLimitConfig) -> Self {
        InMemorySpendingLimitGuard {
            config,
            ledgers: Mutex::new(HashMap::new()),
        }
    }
}

impl SpendingLimitGuard for InMemorySpendingLimitGuard {
    fn check(&self, peer: &PeerId, amount: u64, now: SystemTime) -> Result<(), SpendingLimitError> {
        if let Some(max) = self.config.max_transaction_amount {
            if amount > max {
                return Err(SpendingLimitError::TransactionTooLarge);
            }
        }
        let mut ledgers = self.ledgers.lock();
        let ledger = ledgers.entry(peer.clone()).or_default();
        prune(&mut ledger.daily, now, DAY);
        prune(&mut ledger.monthly, now, MONTH);

        if let Some(max) = self.config.max_daily_amount {
            let spent: u64 = ledger.daily.iter().map(|(_, a)| a).sum();
            if spent.saturating_add(amount) > max {
                return Err(SpendingLimitError::DailyCapExceeded);
            }
        }
        if let Some(max) = self.config.max_monthly_amount {
            let spent: u64 = ledger.monthly.iter().map(|(_, a)| a).sum();
            if spent.saturating_add(amount) > max {
                return Err(SpendingLimitError::MonthlyCapExceeded);
            }
        }
        Ok(())
    }

    fn record(&self, peer: &PeerId, amount: u64, now: SystemTime) {
        let mut ledgers = self.ledgers.lock();
        let ledger = ledgers.entry(peer.clone()).or_default();
        ledger.daily.push((now, amount));
        ledger.monthly.push((now, amount));
    }
}

fn prune(entries: &mut Vec<(SystemTime, u64)>, now: SystemTime, window: Duration) {
    entries.retain(|(at, _)| now.duration_since(*at).map(|d| d <= window).unwrap_or(true));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_single_transaction_over_cap() {
        let guard = InMemorySpendingLimitGuard::new(SpendingLimitConfig {
            max_transaction_amount: Some(100),
            ..Default::default()
        });
        let peer = PeerId::new("alice");
        assert_eq!(
            guard.check(&peer, 101, SystemTime::now()),
            Err(SpendingLimitError::TransactionTooLarge)
        );
        assert!(guard.check(&peer, 100, SystemTime::now()).is_ok());
    }

    #[test]
    fn daily_cap_accumulates_recorded_transactions() {
        let guard = InMemorySpendingLimitGuard::new(SpendingLimitConfig {
            max_daily_amount: Some(150),
            ..Default::default()
        });
        let peer = PeerId::new("alice");
        let now = SystemTime::now();
        guard.check(&peer, 100, now).unwrap();
        guard.record(&peer, 100, now);
        assert_eq!(guard.check(&peer, 100, now), Err(SpendingLimitError::DailyCapExceeded));
        assert!(guard.check(&peer, 50, now).is_ok());
    }

    #[test]
    fn old_transactions_fall_out_of_the_window() {
        let guard = InMemorySpendingLimitGuard::new(SpendingLimitConfig {
            max_daily_amount: Some(100),
            ..Default::default()
        });
        let peer = PeerId::new("alice");
        let past = SystemTime::now() - Duration::from_secs(25 * 60 * 60);
        guard.record(&peer, 100, past);
        assert!(guard.check(&peer, 100, SystemTime::now()).is_ok());
    }
}
