//! Deserializes the `/api/events` and `/api/accounts/events` query strings
//! into an `EventFilter` (§4.12).

use chrono::{DateTime, TimeZone, Utc};
use ilc_store::{EventFilter, SortOrder};
use ilc_telemetry::Direction;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct EventsQuery {
    pub types: Option<String>,
    pub since: Option<i64>,
    pub until: Option<i64>,
    #[serde(rename = "peerId")]
    pub peer_id: Option<String>,
    #[serde(rename = "packetId")]
    pub packet_id: Option<String>,
    pub direction: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct HydrationQuery {
    pub types: Option<String>,
    pub limit: Option<usize>,
}

fn epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn direction_from_str(s: &str) -> Option<Direction> {
    match s {
        "incoming" => Some(Direction::Incoming),
        "outgoing" => Some(Direction::Outgoing),
        _ => None,
    }
}

impl EventsQuery {
    pub fn into_filter(self) -> EventFilter {
        EventFilter {
            types: self.types.map(|t| t.split(',').map(|s| s.trim().to_string()).collect()),
            since: self.since.and_then(epoch_millis),
            until: self.until.and_then(epoch_millis),
            peer_id: self.peer_id,
            packet_id: self.packet_id,
            direction: self.direction.as_deref().and_then(direction_from_str),
            limit: self.limit.unwrap_or(100),
            offset: self.offset.unwrap_or(0),
            order: SortOrder::NewestFirst,
        }
    }
}

impl HydrationQuery {
    pub fn into_filter(self) -> EventFilter {
        let mut filter = EventFilter::hydration();
        filter.types = self.types.map(|t| t.split(',').map(|s| s.trim().to_string()).collect());
        if let Some(limit) = self.limit {
            filter.limit = limit;
        }
        filter
    }
}
