//! Single-peer token bucket primitive with lazy refill (§4.4).

use std::time::Instant;

use quick_error::quick_error;

quick_error! {
    #[derive(Debug, PartialEq, Clone, Copy)]
    pub enum TokenBucketError {
        InvalidCapacity(value: f64) {
            display("capacity must be positive and finite, got {}", value)
        }
        InvalidRefillRate(value: f64) {
            display("refill rate must be positive and finite, got {}", value)
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_rate: f64, now: Instant) -> Result<Self, TokenBucketError> {
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(TokenBucketError::InvalidCapacity(capacity));
        }
        if !refill_rate.is_finite() || refill_rate <= 0.0 {
            return Err(TokenBucketError::InvalidRefillRate(refill_rate));
        }
        Ok(TokenBucket {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: now,
        })
    }

    fn refill(&mut self, now: Instant) {
        if now > self.last_refill {
            let elapsed = now.duration_since(self.last_refill).as_secs_f64();
            self.tokens = (self.tokens + self.refill_rate * elapsed).min(self.capacity);
        }
        self.last_refill = now;
    }

    /// Attempts to consume `n` tokens (default 1). Returns `true` (and
    /// deducts the tokens) iff enough were available after a lazy refill.
    pub fn try_consume(&mut self, n: f64, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= n {
            self.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Peeks at available tokens after a lazy refill, without consuming.
    pub fn available_tokens(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }

    pub fn reset(&mut self, now: Instant) {
        self.tokens = self.capacity;
        self.last_refill = now;
    }

    /// Adjusts the refill rate (used by the rate limiter's adaptive mode).
    /// Clamped to stay positive and finite.
    pub fn set_refill_rate(&mut self, refill_rate: f64) {
        if refill_rate.is_finite() && refill_rate > 0.0 {
            self.refill_rate = refill_rate;
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn construction_rejects_non_positive_params() {
        let now = Instant::now();
        assert!(TokenBucket::new(0.0, 1.0, now).is_err());
        assert!(TokenBucket::new(-1.0, 1.0, now).is_err());
        assert!(TokenBucket::new(1.0, 0.0, now).is_err());
        assert!(TokenBucket::new(f64::NAN, 1.0, now).is_err());
        assert!(TokenBucket::new(f64::INFINITY, 1.0, now).is_err());
    }

    #[test]
    fn consumes_exactly_k_tokens() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(10.0, 1.0, now).unwrap();
        assert!(bucket.try_consume(4.0, now));
        assert_eq!(bucket.available_tokens(now), 6.0);
    }

    #[test]
    fn refuses_when_insufficient() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(2.0, 1.0, now).unwrap();
        assert!(!bucket.try_consume(3.0, now));
        assert_eq!(bucket.available_tokens(now), 2.0);
    }

    #[test]
    fn refill_is_monotonic_and_capped_at_capacity() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(5.0, 2.0, start).unwrap();
        bucket.try_consume(5.0, start);
        assert_eq!(bucket.available_tokens(start), 0.0);
        let later = start + Duration::from_secs(1);
        let tokens = bucket.available_tokens(later);
        assert!((tokens - 2.0).abs() < 1e-9);
        let much_later = start + Duration::from_secs(10);
        assert_eq!(bucket.available_tokens(much_later), 5.0);
    }

    #[test]
    fn reset_restores_full_capacity() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(5.0, 1.0, now).unwrap();
        bucket.try_consume(5.0, now);
        bucket.reset(now);
        assert_eq!(bucket.available_tokens(now), 5.0);
    }
}
