//! OER codec and ILP packet model (`Prepare`/`Fulfill`/`Reject`).
//!
//! This crate is the leaf of the connector workspace: it has no
//! dependency on any other `ilc-*` crate and is safe to use from both the
//! transport layer (`ilc-btp`) and the data-plane core (`ilc-connector`).

pub mod address;
pub mod builder;
pub mod error_code;
pub mod oer;
pub mod packet;

pub use address::{AddressError, IlpAddress};
pub use builder::{FulfillBuilder, PrepareBuilder, RejectBuilder};
pub use error_code::{ErrorClass, ErrorCode};
pub use packet::{check_condition, Fulfill, Packet, ParseError, Prepare, Reject};
