//! `AuditSink`: the append-only, redacting log of security-relevant
//! events (§4.14). Mutation and deletion are deliberately not part of
//! the trait beyond `clear()`, which is named for tests only.

use parking_lot::RwLock;
use serde_json::Value;

use crate::event::{AuditEvent, AuditOperation};
use crate::filter::AuditFilter;
use crate::redact::redact;

/// Interface a durable audit log exposes to the core (§9 "dynamic
/// dispatch"). The core never reaches for a concrete database; it
/// records through this trait and the caller supplies the storage.
pub trait AuditSink: Send + Sync {
    fn record(&self, operation: AuditOperation, agent_id: &str, details: Value);
    fn query(&self, filter: &AuditFilter) -> Vec<AuditEvent>;
    /// Testing-only: drops every recorded event.
    fn clear(&self);
}

/// Reference in-memory `AuditSink`. Production deployments are expected
/// to supply their own durable implementation; this one exists so the
/// core and its tests have something concrete to record through (mirrors
/// `interledger-store-memory`'s role for `EventStore`).
pub struct InMemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        InMemoryAuditSink {
            events: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, operation: AuditOperation, agent_id: &str, details: Value) {
        let mut details = details;
        redact(&mut details);
        let event = AuditEvent::new(operation, agent_id, details);
        log::info!(
            "audit: {} agent={} ",
            event.operation.as_str(),
            event.agent_id
        );
        self.events.write().push(event);
    }

    fn query(&self, filter: &AuditFilter) -> Vec<AuditEvent> {
        let limit = filter.effective_limit();
        let events = self.events.read();
        let mut matched: Vec<AuditEvent> = events
            .iter()
            .rev()
            .filter(|event| filter.matches(event))
            .take(limit)
            .cloned()
            .collect();
        // `rev()` already walked newest-first; nothing further to sort.
        matched.shrink_to_fit();
        matched
    }

    fn clear(&self) {
        self.events.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_before_storing() {
        let sink = InMemoryAuditSink::new();
        sink.record(
            AuditOperation::SignRequest,
            "agent-1",
            json!({ "privateKey": "0xdead", "amount": 10 }),
        );
        let results = sink.query(&AuditFilter::new());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].details["privateKey"], json!("[REDACTED]"));
        assert_eq!(results[0].details["amount"], json!(10));
    }

    #[test]
    fn query_filters_by_agent_and_operation() {
        let sink = InMemoryAuditSink::new();
        sink.record(AuditOperation::PeerPaused, "agent-1", json!({}));
        sink.record(AuditOperation::PeerResumed, "agent-1", json!({}));
        sink.record(AuditOperation::PeerPaused, "agent-2", json!({}));

        let filter = AuditFilter {
            agent_id: Some("agent-1".to_string()),
            operation: Some(AuditOperation::PeerPaused),
            ..AuditFilter::new()
        };
        let results = sink.query(&filter);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].agent_id, "agent-1");
    }

    #[test]
    fn query_is_newest_first_and_capped() {
        let sink = InMemoryAuditSink::new();
        for i in 0..5 {
            sink.record(AuditOperation::PaymentSent, "agent-1", json!({ "i": i }));
        }
        let filter = AuditFilter {
            limit: Some(2),
            ..AuditFilter::new()
        };
        let results = sink.query(&filter);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].details["i"], json!(4));
        assert_eq!(results[1].details["i"], json!(3));
    }

    #[test]
    fn clear_drops_all_events() {
        let sink = InMemoryAuditSink::new();
        sink.record(AuditOperation::WalletCreated, "agent-1", json!({}));
        sink.clear();
        assert!(sink.query(&AuditFilter::new()).is_empty());
    }

    #[test]
    fn limit_is_capped_at_max_even_if_requested_higher() {
        let filter = AuditFilter {
            limit: Some(10_000),
            ..AuditFilter::new()
        };
        assert_eq!(filter.effective_limit(), crate::filter::MAX_QUERY_LIMIT);
    }
}
