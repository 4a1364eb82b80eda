//! Peer discovery: periodic announce/fetch/merge against configured
//! discovery endpoints, with bounded-retry connect for newly found
//! peers (§4.15).

pub mod client;
pub mod connector;
pub mod descriptor;
pub mod service;

pub use client::{DiscoveryClient, DiscoveryClientError};
pub use connector::{connect_with_retries, PeerConnector, MAX_CONNECT_RETRIES};
pub use descriptor::{PeerDescriptor, PeerListResponse};
pub use service::{DiscoveryConfig, DiscoveryService};
