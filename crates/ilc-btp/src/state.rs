//! Session lifecycle state and reconnect backoff (§4.7).

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Open,
    Closing,
}

impl SessionState {
    pub fn is_open(&self) -> bool {
        matches!(self, SessionState::Open)
    }
}

/// Bounded exponential backoff for `Connecting`/`Authenticating` failures
/// (§4.7: base 1s, cap 30s, max attempts configurable).
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl BackoffConfig {
    /// The delay before reconnect attempt number `attempt` (1-indexed).
    /// Doubles each attempt, capped at `self.cap`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let scaled = self.base.as_millis().saturating_mul(1u128 << shift);
        let capped = scaled.min(self.cap.as_millis());
        Duration::from_millis(capped as u64)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        matches!(self.max_attempts, Some(max) if attempt >= max)
    }
}
