//! Per-peer token-bucket rate limiting with sliding-window circuit breaker
//! (§4.4, §4.5).

pub mod clock;
pub mod limiter;
pub mod token_bucket;

pub use clock::{Clock, SystemClock, TestClock};
pub use limiter::{CheckOutcome, RateLimitConfig, RateLimitObserver, RateLimiter, RequestClass};
pub use token_bucket::{TokenBucket, TokenBucketError};
