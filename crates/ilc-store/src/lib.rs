//! Append-only telemetry event store with filtered query and FIFO
//! eviction on a configurable size cap (§4.11).

pub mod filter;
pub mod store;
pub mod stored;

pub use filter::{EventFilter, FilterError, SortOrder};
pub use store::{EventStore, StoreObserver, DEFAULT_CAPACITY_BYTES, MAX_HYDRATION_LIMIT, MAX_QUERY_LIMIT};
pub use stored::StoredEvent;
