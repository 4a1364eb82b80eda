//! `TelemetryEvent`: a tagged union over every structured record the
//! connector publishes internally (§3, §9 "dynamic typing of events").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketOutcome {
    Fulfilled,
    Rejected,
    TimedOut,
}

/// Which way a packet-related event flowed relative to this node; one of
/// `StoredEvent`'s indexed columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TelemetryEvent {
    #[serde(rename = "ACCOUNT_BALANCE")]
    AccountBalance {
        node_id: String,
        timestamp: DateTime<Utc>,
        peer_id: String,
        balance: i64,
    },
    #[serde(rename = "PACKET_PROCESSED")]
    PacketProcessed {
        node_id: String,
        timestamp: DateTime<Utc>,
        correlation_id: Option<String>,
        peer_in: String,
        peer_out: Option<String>,
        destination: String,
        amount: u64,
        latency_ms: u64,
        outcome: PacketOutcome,
    },
    #[serde(rename = "PACKET_REJECTED")]
    PacketRejected {
        node_id: String,
        timestamp: DateTime<Utc>,
        correlation_id: Option<String>,
        peer_in: String,
        code: String,
        message: String,
    },
    #[serde(rename = "SETTLEMENT_TRIGGERED")]
    SettlementTriggered {
        node_id: String,
        timestamp: DateTime<Utc>,
        peer_id: String,
        amount: u64,
    },
    #[serde(rename = "CHANNEL_OPENED")]
    ChannelOpened {
        node_id: String,
        timestamp: DateTime<Utc>,
        peer_id: String,
        channel_id: String,
    },
    #[serde(rename = "CHANNEL_CLOSED")]
    ChannelClosed {
        node_id: String,
        timestamp: DateTime<Utc>,
        peer_id: String,
        channel_id: String,
    },
    #[serde(rename = "FRAUD_DETECTED")]
    FraudDetected {
        node_id: String,
        timestamp: DateTime<Utc>,
        peer_id: String,
        rule: String,
        severity: String,
        details: String,
    },
    #[serde(rename = "PEER_PAUSED")]
    PeerPaused {
        node_id: String,
        timestamp: DateTime<Utc>,
        peer_id: String,
        reason: String,
    },
    #[serde(rename = "PEER_RESUMED")]
    PeerResumed {
        node_id: String,
        timestamp: DateTime<Utc>,
        peer_id: String,
    },
    #[serde(rename = "RATE_LIMITED")]
    RateLimited {
        node_id: String,
        timestamp: DateTime<Utc>,
        peer_id: String,
        class: String,
        outcome: String,
    },
    #[serde(rename = "TELEMETRY_DROPPED")]
    TelemetryDropped {
        node_id: String,
        timestamp: DateTime<Utc>,
        subscriber_id: u64,
        dropped_total: u64,
    },
    #[serde(rename = "DATABASE_SIZE_EXCEEDED")]
    DatabaseSizeExceeded {
        node_id: String,
        timestamp: DateTime<Utc>,
        size_bytes: u64,
        cap_bytes: u64,
    },
}

impl TelemetryEvent {
    /// The peer this event is about, when it names one — used for
    /// `StoredEvent`'s `peerId` index column.
    pub fn peer_id(&self) -> Option<&str> {
        match self {
            TelemetryEvent::AccountBalance { peer_id, .. }
            | TelemetryEvent::SettlementTriggered { peer_id, .. }
            | TelemetryEvent::ChannelOpened { peer_id, .. }
            | TelemetryEvent::ChannelClosed { peer_id, .. }
            | TelemetryEvent::FraudDetected { peer_id, .. }
            | TelemetryEvent::PeerPaused { peer_id, .. }
            | TelemetryEvent::PeerResumed { peer_id, .. }
            | TelemetryEvent::RateLimited { peer_id, .. } => Some(peer_id),
            TelemetryEvent::PacketProcessed { peer_in, .. } => Some(peer_in),
            TelemetryEvent::PacketRejected { peer_in, .. } => Some(peer_in),
            TelemetryEvent::TelemetryDropped { .. } | TelemetryEvent::DatabaseSizeExceeded { .. } => None,
        }
    }

    /// The packet this event correlates to, when it names one — used for
    /// `StoredEvent`'s `packetId` index column.
    pub fn packet_id(&self) -> Option<&str> {
        match self {
            TelemetryEvent::PacketProcessed { correlation_id, .. }
            | TelemetryEvent::PacketRejected { correlation_id, .. } => correlation_id.as_deref(),
            _ => None,
        }
    }

    /// Which way the packet flowed, when this event is packet-related —
    /// used for `StoredEvent`'s `direction` index column. A processed
    /// packet with a known next hop is outgoing from this node's
    /// perspective once forwarded; one that never reached a next hop
    /// (rejected locally, or forwarding never started) is incoming.
    pub fn direction(&self) -> Option<Direction> {
        match self {
            TelemetryEvent::PacketProcessed { peer_out: Some(_), .. } => Some(Direction::Outgoing),
            TelemetryEvent::PacketProcessed { peer_out: None, .. } => Some(Direction::Incoming),
            TelemetryEvent::PacketRejected { .. } => Some(Direction::Incoming),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            TelemetryEvent::AccountBalance { .. } => "ACCOUNT_BALANCE",
            TelemetryEvent::PacketProcessed { .. } => "PACKET_PROCESSED",
            TelemetryEvent::PacketRejected { .. } => "PACKET_REJECTED",
            TelemetryEvent::SettlementTriggered { .. } => "SETTLEMENT_TRIGGERED",
            TelemetryEvent::ChannelOpened { .. } => "CHANNEL_OPENED",
            TelemetryEvent::ChannelClosed { .. } => "CHANNEL_CLOSED",
            TelemetryEvent::FraudDetected { .. } => "FRAUD_DETECTED",
            TelemetryEvent::PeerPaused { .. } => "PEER_PAUSED",
            TelemetryEvent::PeerResumed { .. } => "PEER_RESUMED",
            TelemetryEvent::RateLimited { .. } => "RATE_LIMITED",
            TelemetryEvent::TelemetryDropped { .. } => "TELEMETRY_DROPPED",
            TelemetryEvent::DatabaseSizeExceeded { .. } => "DATABASE_SIZE_EXCEEDED",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TelemetryEvent::AccountBalance { timestamp, .. }
            | TelemetryEvent::PacketProcessed { timestamp, .. }
            | TelemetryEvent::PacketRejected { timestamp, .. }
            | TelemetryEvent::SettlementTriggered { timestamp, .. }
            | TelemetryEvent::ChannelOpened { timestamp, .. }
            | TelemetryEvent::ChannelClosed { timestamp, .. }
            | TelemetryEvent::FraudDetected { timestamp, .. }
            | TelemetryEvent::PeerPaused { timestamp, .. }
            | TelemetryEvent::PeerResumed { timestamp, .. }
            | TelemetryEvent::RateLimited { timestamp, .. }
            | TelemetryEvent::TelemetryDropped { timestamp, .. }
            | TelemetryEvent::DatabaseSizeExceeded { timestamp, .. } => *timestamp,
        }
    }
}
