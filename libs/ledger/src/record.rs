//! Ledger record types and the transaction status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default retry budget recorded on new transactions. Actual retry
/// scheduling is owned by an external worker.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    X12,
    Ccda,
    Fhir,
    Direct,
    Tefca,
    Carequality,
    Commonwell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Retrying,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed
                | TransactionStatus::Failed
                | TransactionStatus::Timeout
                | TransactionStatus::Cancelled
        )
    }

    /// pending -> processing -> {completed|failed|timeout|cancelled},
    /// with retrying looping back to processing.
    pub fn can_transition(self, to: TransactionStatus) -> bool {
        use TransactionStatus::*;
        match (self, to) {
            (Pending, Processing) => true,
            (Processing, Completed | Failed | Timeout | Cancelled | Retrying) => true,
            (Retrying, Processing) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Retrying => "retrying",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Timeout => "timeout",
            TransactionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One audit row per protocol operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: String,
    pub correlation_id: String,
    pub protocol: ProtocolKind,
    /// Operation label within the protocol, e.g. `inbound`, `patient-discovery`.
    pub operation: String,
    pub direction: Direction,
    pub status: TransactionStatus,
    pub partner_id: Option<String>,
    /// Snapshot of the (already sanitized) payload taken at entry.
    pub payload: JsonValue,
    /// SHA-256 over the serialized snapshot, hex encoded.
    pub payload_hash: String,
    pub request_metadata: Option<JsonValue>,
    pub response_metadata: Option<JsonValue>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub processing_time_ms: Option<u64>,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Terminal outcome applied by [`crate::Ledger::complete`].
#[derive(Debug, Clone)]
pub struct TransactionOutcome {
    pub status: TransactionStatus,
    pub response_metadata: Option<JsonValue>,
    pub error_message: Option<String>,
}

impl TransactionOutcome {
    pub fn completed() -> Self {
        Self {
            status: TransactionStatus::Completed,
            response_metadata: None,
            error_message: None,
        }
    }

    pub fn completed_with(metadata: JsonValue) -> Self {
        Self {
            status: TransactionStatus::Completed,
            response_metadata: Some(metadata),
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: TransactionStatus::Failed,
            response_metadata: None,
            error_message: Some(message.into()),
        }
    }

    pub fn failed_with(message: impl Into<String>, metadata: JsonValue) -> Self {
        Self {
            status: TransactionStatus::Failed,
            response_metadata: Some(metadata),
            error_message: Some(message.into()),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            status: TransactionStatus::Timeout,
            response_metadata: None,
            error_message: Some(message.into()),
        }
    }
}
