//! `StoredEvent`: a `TelemetryEvent` tagged with its store-assigned,
//! monotonically increasing sequence number (§3).

use ilc_telemetry::TelemetryEvent;

#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub seq: u64,
    pub event: TelemetryEvent,
}
