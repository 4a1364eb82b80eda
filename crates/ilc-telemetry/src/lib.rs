//! In-process telemetry: a tagged event type, a bounded pub/sub bus, and
//! a batching buffer that sits in front of durable storage (§4.9, §4.10).

pub mod buffer;
pub mod bus;
pub mod event;

pub use buffer::{BufferConfig, BufferObserver, FlushError, FlushFn, TelemetryBuffer};
pub use bus::{EventBus, Unsubscribe, DEFAULT_SUBSCRIBER_QUEUE_SIZE};
pub use event::{Direction, PacketOutcome, TelemetryEvent};
