//! `AuditEvent`: the tagged, redacted record a security-relevant
//! occurrence is turned into before it reaches the sink (§4.14).

use chrono::{DateTime, Utc};
use serde_json::Value;

/// The operation kinds the audit sink accepts (§4.14). Signing and key
/// management are listed because the spec names them as audit-relevant,
/// not because this core performs them — the events arrive from the
/// out-of-scope settlement/HSM subsystems through whatever `AuditSink`
/// implementation the caller wires in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditOperation {
    SignRequest,
    SignSuccess,
    SignFailure,
    KeyRotationStart,
    KeyRotationComplete,
    KeyAccessDenied,
    FraudDetected,
    PeerPaused,
    PeerResumed,
    WalletCreated,
    WalletFunded,
    PaymentSent,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOperation::SignRequest => "sign_request",
            AuditOperation::SignSuccess => "sign_success",
            AuditOperation::SignFailure => "sign_failure",
            AuditOperation::KeyRotationStart => "key_rotation_start",
            AuditOperation::KeyRotationComplete => "key_rotation_complete",
            AuditOperation::KeyAccessDenied => "key_access_denied",
            AuditOperation::FraudDetected => "fraud_detected",
            AuditOperation::PeerPaused => "peer_paused",
            AuditOperation::PeerResumed => "peer_resumed",
            AuditOperation::WalletCreated => "wallet_created",
            AuditOperation::WalletFunded => "wallet_funded",
            AuditOperation::PaymentSent => "payment_sent",
        }
    }
}

/// A single audit record, already redacted by the time it is stored
/// (§4.14 "Redactions ... before serialization").
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub operation: AuditOperation,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    pub details: Value,
}

impl AuditEvent {
    pub fn new(operation: AuditOperation, agent_id: impl Into<String>, details: Value) -> Self {
        AuditEvent {
            operation,
            agent_id: agent_id.into(),
            timestamp: Utc::now(),
            details,
        }
    }
}
