//! Generic, health-checked, round-robin connection pool (§4.13).
//!
//! `ConnectionPool<Client, F>` is parameterized over a caller-supplied
//! `ConnectionFactory` so it has no knowledge of what `Client` actually is
//! (a BTP session, a settlement-engine HTTP client, …) — see `DESIGN.md`
//! for why `ilc-node`'s BTP layer does not use this for peer sessions.

pub mod config;
pub mod events;
pub mod factory;
pub mod pool;

pub use config::PoolConfig;
pub use events::{PoolEvent, PoolObserver};
pub use factory::ConnectionFactory;
pub use pool::{ConnectionPool, PoolError};
