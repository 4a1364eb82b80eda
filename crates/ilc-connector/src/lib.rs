//! Packet Handler: composes routing, rate limiting, fraud defense, and
//! spending limits into the Prepare/Fulfill/Reject state machine.

pub mod handler;
pub mod registry;
pub mod spending_limit;

pub use handler::{malformed_packet_reject, HandlerConfig, PacketHandler, DEFAULT_MIN_EXPIRY_MARGIN};
pub use registry::PeerRegistry;
pub use spending_limit::{
    InMemorySpendingLimitGuard, SpendingLimitConfig, SpendingLimitError, SpendingLimitGuard,
};
