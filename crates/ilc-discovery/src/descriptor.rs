//! Self-descriptor broadcast to, and peer descriptors fetched from, the
//! configured discovery endpoints (§4.15).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    pub node_id: String,
    pub btp_endpoint: String,
    pub ilp_address: String,
    pub capabilities: Vec<String>,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeerListResponse {
    pub peers: Vec<PeerDescriptor>,
}
