//! Query filter for `EventStore::query` (§4.11).

use chrono::{DateTime, Utc};
use ilc_telemetry::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    NewestFirst,
    OldestFirst,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::NewestFirst
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub types: Option<Vec<String>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub peer_id: Option<String>,
    pub packet_id: Option<String>,
    pub direction: Option<Direction>,
    pub limit: usize,
    pub offset: usize,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterError {
    LimitOutOfRange { max: usize },
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterError::LimitOutOfRange { max } => write!(f, "limit must be between 1 and {}", max),
        }
    }
}

impl std::error::Error for FilterError {}

impl EventFilter {
    /// The default, caller-facing query filter: page size 100, newest first.
    pub fn new() -> Self {
        EventFilter {
            limit: 100,
            order: SortOrder::NewestFirst,
            ..Default::default()
        }
    }

    /// The hydration query shape used by `/api/accounts/events`: larger
    /// page size, oldest first.
    pub fn hydration() -> Self {
        EventFilter {
            limit: 5000,
            order: SortOrder::OldestFirst,
            ..Default::default()
        }
    }

    pub fn validate(&self, max_limit: usize) -> Result<(), FilterError> {
        if self.limit == 0 || self.limit > max_limit {
            return Err(FilterError::LimitOutOfRange { max: max_limit });
        }
        Ok(())
    }

    pub fn matches(&self, stored: &crate::stored::StoredEvent) -> bool {
        if let Some(types) = &self.types {
            if !types.iter().any(|t| t == stored.event.type_name()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if stored.event.timestamp() < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if stored.event.timestamp() > until {
                return false;
            }
        }
        if let Some(peer_id) = &self.peer_id {
            if stored.event.peer_id() != Some(peer_id.as_str()) {
                return false;
            }
        }
        if let Some(packet_id) = &self.packet_id {
            if stored.event.packet_id() != Some(packet_id.as_str()) {
                return false;
            }
        }
        if let Some(direction) = self.direction {
            if stored.event.direction() != Some(direction) {
                return false;
            }
        }
        true
    }
}
