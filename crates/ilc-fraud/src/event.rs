//! Events the fraud detector scores (§4.6).

use std::time::SystemTime;

use ilc_service::PeerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEventKind {
    Opened,
    Closed,
}

#[derive(Debug, Clone)]
pub struct SettlementEvent {
    pub peer: PeerId,
    pub amount: u64,
    pub at: SystemTime,
}

#[derive(Debug, Clone)]
pub struct PacketEvent {
    pub peer: PeerId,
    pub token: String,
    pub amount: u64,
    pub at: SystemTime,
}

#[derive(Debug, Clone)]
pub struct ChannelEvent {
    pub peer: PeerId,
    pub kind: ChannelEventKind,
    pub at: SystemTime,
}

#[derive(Debug, Clone)]
pub enum FraudEvent {
    Settlement(SettlementEvent),
    Packet(PacketEvent),
    Channel(ChannelEvent),
}

impl FraudEvent {
    pub fn peer(&self) -> &PeerId {
        match self {
            FraudEvent::Settlement(e) => &e.peer,
            FraudEvent::Packet(e) => &e.peer,
            FraudEvent::Channel(e) => &e.peer,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Detection {
    pub detected: bool,
    pub severity: Severity,
    pub details: Option<String>,
}

impl Detection {
    pub fn clean() -> Self {
        Detection {
            detected: false,
            severity: Severity::Low,
            details: None,
        }
    }

    pub fn hit(severity: Severity, details: impl Into<String>) -> Self {
        Detection {
            detected: true,
            severity,
            details: Some(details.into()),
        }
    }
}
