//! Explorer Server: HTTP query surface plus WebSocket fan-out over the
//! event store and event bus (§4.12).

pub mod cors;
pub mod error;
pub mod fetchers;
pub mod health;
pub mod query_params;
pub mod routes;
pub mod server;
pub mod ws;

pub use cors::OriginAllowlist;
pub use fetchers::{Fetcher, Fetchers};
pub use health::{ExplorerHealth, HealthReport, HealthStatus, StartedAt};
pub use query_params::{EventsQuery, HydrationQuery};
pub use routes::{explorer_api, ExplorerState};
pub use server::{ExplorerServer, DEFAULT_SHUTDOWN_TIMEOUT};
pub use ws::WsHub;
