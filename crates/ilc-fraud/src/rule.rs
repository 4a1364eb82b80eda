//! `Rule` trait and the two built-in rules (§4.6).

use async_trait::async_trait;

use crate::event::{Detection, FraudEvent, Severity};
use crate::state::FraudState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleError;

/// A pluggable fraud rule. `check` receives a read-only snapshot of the
/// peer's rolling history alongside the triggering event; rules never
/// mutate shared state directly (§9 dynamic dispatch guidance).
#[async_trait]
pub trait Rule: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self, event: &FraudEvent, history: &FraudState) -> Result<Detection, RuleError>;
}

/// Detects abnormal funding velocity: more than `threshold` funding
/// events in the rolling 1-hour window.
pub struct RapidFundingRule {
    pub threshold: usize,
}

#[async_trait]
impl Rule for RapidFundingRule {
    fn name(&self) -> &str {
        "rapid_funding"
    }

    async fn check(&self, event: &FraudEvent, history: &FraudState) -> Result<Detection, RuleError> {
        let FraudEvent::Settlement(settlement) = event else {
            return Ok(Detection::clean());
        };
        let count = history.funding_count_within_window(settlement.at);
        if count > self.threshold {
            Ok(Detection::hit(
                Severity::High,
                format!("{} funding events within the last hour", count),
            ))
        } else {
            Ok(Detection::clean())
        }
    }
}

/// Detects statistically unusual transaction amounts, or a brand-new
/// token after the peer already has transaction history.
pub struct StatisticalOutlierRule {
    pub std_dev_threshold: f64,
    pub min_samples: usize,
}

impl Default for StatisticalOutlierRule {
    fn default() -> Self {
        StatisticalOutlierRule {
            std_dev_threshold: 3.0,
            min_samples: 10,
        }
    }
}

#[async_trait]
impl Rule for StatisticalOutlierRule {
    fn name(&self) -> &str {
        "statistical_outlier"
    }

    async fn check(&self, event: &FraudEvent, history: &FraudState) -> Result<Detection, RuleError> {
        let FraudEvent::Packet(packet) = event else {
            return Ok(Detection::clean());
        };

        if history.has_seen_any_transaction() && !history.has_seen_token(&packet.token) {
            return Ok(Detection::hit(
                Severity::Medium,
                format!("new token {:?} for a peer with prior transaction history", packet.token),
            ));
        }

        let samples = history.samples_for_token(&packet.token, packet.at);
        if samples.len() < self.min_samples {
            return Ok(Detection::clean());
        }

        let (mean, std_dev) = mean_and_std_dev(&samples);
        if std_dev == 0.0 {
            return Ok(Detection::clean());
        }
        let z = (packet.amount as f64 - mean).abs() / std_dev;
        if z > self.std_dev_threshold {
            Ok(Detection::hit(
                Severity::Critical,
                format!("amount {} is {:.2} std devs from the mean {:.2}", packet.amount, z, mean),
            ))
        } else {
            Ok(Detection::clean())
        }
    }
}

fn mean_and_std_dev(samples: &[u64]) -> (f64, f64) {
    let n = samples.len() as f64;
    let mean = samples.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = samples
        .iter()
        .map(|&v| {
            let diff = v as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;
    (mean, variance.sqrt())
}
