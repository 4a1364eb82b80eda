//! Append-only, redacting audit sink for security-relevant events
//! (§4.14): signing lifecycle, key rotation, fraud pauses, and wallet
//! operations reported in from the out-of-scope settlement/HSM
//! subsystems.

pub mod event;
pub mod filter;
pub mod redact;
pub mod sink;

pub use event::{AuditEvent, AuditOperation};
pub use filter::{AuditFilter, MAX_QUERY_LIMIT};
pub use redact::{redact, REDACTED_PLACEHOLDER};
pub use sink::{AuditSink, InMemoryAuditSink};
