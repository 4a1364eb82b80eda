//! Query filter for `AuditSink::query` (§4.14 "filtering by agentId,
//! operation, and time range").

use chrono::{DateTime, Utc};

use crate::event::AuditOperation;

pub const MAX_QUERY_LIMIT: usize = 1000;

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub agent_id: Option<String>,
    pub operation: Option<AuditOperation>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn new() -> Self {
        AuditFilter::default()
    }

    /// Caps `limit` at `MAX_QUERY_LIMIT`, defaulting to it when unset
    /// (§4.14 "capped at 1000 rows").
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(MAX_QUERY_LIMIT).min(MAX_QUERY_LIMIT)
    }

    pub fn matches(&self, event: &crate::event::AuditEvent) -> bool {
        if let Some(agent_id) = &self.agent_id {
            if &event.agent_id != agent_id {
                return false;
            }
        }
        if let Some(operation) = self.operation {
            if event.operation != operation {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.timestamp > until {
                return false;
            }
        }
        true
    }
}
