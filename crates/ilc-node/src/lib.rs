//! Composition root for the connector process (§3 Ownership, §5
//! lifecycle): config loading, the `Node` that wires every `ilc-*` crate
//! together, and the `clap` CLI surface the binary exposes.

pub mod account;
pub mod cli;
pub mod config;
pub mod discovery_client;
pub mod node;
pub mod registry;

pub use account::NodeAccount;
pub use config::{load, ConfigError, NodeConfig};
pub use node::{Node, NodeError};
pub use registry::InMemoryPeerRegistry;
