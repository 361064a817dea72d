//! Append-only audit ledger for protocol operations.
//!
//! Every inbound or outbound protocol exchange gets exactly one
//! [`TransactionRecord`]: created when the operation enters the gateway,
//! finalized once by the owning component, and never mutated afterwards.
//! Storage sits behind the [`LedgerStore`] port so the core never talks to a
//! concrete database client.

pub mod record;
pub mod store;

pub use record::{
    Direction, ProtocolKind, TransactionOutcome, TransactionRecord, TransactionStatus,
};
pub use store::{LedgerStore, MemoryLedger};

use chrono::Utc;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transaction not found: {0}")]
    NotFound(String),

    #[error("transaction {id} is final ({status}) and cannot be updated")]
    AlreadyFinal { id: String, status: TransactionStatus },

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("retry budget exhausted: {retry_count}/{max_retries}")]
    RetriesExhausted { retry_count: u32, max_retries: u32 },
}

/// Ledger service: assigns ids, hashes payload snapshots and enforces the
/// write-once completion rule on top of a [`LedgerStore`].
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn LedgerStore> {
        Arc::clone(&self.store)
    }

    /// Open a record for a protocol operation that is about to run.
    ///
    /// The record starts in `processing` (creation implies the pending ->
    /// processing transition) and carries a SHA-256 hash of the payload
    /// snapshot for later integrity checks.
    pub async fn begin(
        &self,
        protocol: ProtocolKind,
        operation: &str,
        direction: Direction,
        partner_id: Option<String>,
        payload: JsonValue,
    ) -> Result<TransactionRecord> {
        let snapshot = payload.to_string();
        let record = TransactionRecord {
            id: Uuid::new_v4().to_string(),
            correlation_id: Uuid::new_v4().to_string(),
            protocol,
            operation: operation.to_string(),
            direction,
            status: TransactionStatus::Processing,
            partner_id,
            payload,
            payload_hash: hex_sha256(snapshot.as_bytes()),
            request_metadata: None,
            response_metadata: None,
            error_message: None,
            retry_count: 0,
            max_retries: record::DEFAULT_MAX_RETRIES,
            processing_time_ms: None,
            initiated_at: Utc::now(),
            completed_at: None,
        };
        self.store.insert(record.clone()).await;
        Ok(record)
    }

    /// Finalize a record. This is the single permitted update: the status
    /// moves to a terminal state and the record becomes immutable.
    pub async fn complete(&self, id: &str, outcome: TransactionOutcome) -> Result<TransactionRecord> {
        let mut record = self
            .store
            .get(id)
            .await
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

        if record.status.is_terminal() {
            return Err(LedgerError::AlreadyFinal {
                id: record.id,
                status: record.status,
            });
        }

        let to = outcome.status;
        if !record.status.can_transition(to) {
            return Err(LedgerError::InvalidTransition {
                from: record.status,
                to,
            });
        }

        let now = Utc::now();
        record.status = to;
        record.response_metadata = outcome.response_metadata;
        record.error_message = outcome.error_message;
        record.processing_time_ms = Some(
            (now - record.initiated_at).num_milliseconds().max(0) as u64,
        );
        record.completed_at = Some(now);

        self.store.update(record.clone()).await?;
        tracing::debug!(
            transaction_id = %record.id,
            status = %record.status,
            protocol = ?record.protocol,
            "transaction finalized"
        );
        Ok(record)
    }

    /// Record retry eligibility. The ledger only tracks the counter; an
    /// external scheduler owns actual re-execution.
    pub async fn mark_retrying(&self, id: &str) -> Result<TransactionRecord> {
        let mut record = self
            .store
            .get(id)
            .await
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

        if record.status.is_terminal() {
            return Err(LedgerError::AlreadyFinal {
                id: record.id,
                status: record.status,
            });
        }
        if record.retry_count >= record.max_retries {
            return Err(LedgerError::RetriesExhausted {
                retry_count: record.retry_count,
                max_retries: record.max_retries,
            });
        }

        record.retry_count += 1;
        record.status = TransactionStatus::Processing;
        self.store.update(record.clone()).await?;
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Option<TransactionRecord> {
        self.store.get(id).await
    }
}

pub fn hex_sha256(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ledger() -> Ledger {
        Ledger::new(Arc::new(MemoryLedger::default()))
    }

    #[tokio::test]
    async fn begin_assigns_ids_and_hash() {
        let ledger = ledger();
        let record = ledger
            .begin(
                ProtocolKind::X12,
                "inbound",
                Direction::Inbound,
                Some("partner-1".into()),
                json!({"isaControlNumber": "000000001"}),
            )
            .await
            .unwrap();

        assert_eq!(record.status, TransactionStatus::Processing);
        assert_eq!(record.payload_hash.len(), 64);
        assert!(record.completed_at.is_none());
        assert_ne!(record.id, record.correlation_id);
    }

    #[tokio::test]
    async fn complete_is_write_once() {
        let ledger = ledger();
        let record = ledger
            .begin(ProtocolKind::Direct, "send", Direction::Outbound, None, json!({}))
            .await
            .unwrap();

        let done = ledger
            .complete(&record.id, TransactionOutcome::completed())
            .await
            .unwrap();
        assert_eq!(done.status, TransactionStatus::Completed);
        assert!(done.completed_at.is_some());

        let err = ledger
            .complete(&record.id, TransactionOutcome::failed("again"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyFinal { .. }));
    }

    #[tokio::test]
    async fn retrying_stops_at_max_retries() {
        let ledger = ledger();
        let record = ledger
            .begin(ProtocolKind::X12, "inbound", Direction::Inbound, None, json!({}))
            .await
            .unwrap();

        for _ in 0..record.max_retries {
            ledger.mark_retrying(&record.id).await.unwrap();
        }
        let err = ledger.mark_retrying(&record.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::RetriesExhausted { .. }));
    }

    #[tokio::test]
    async fn failed_records_carry_error_message() {
        let ledger = ledger();
        let record = ledger
            .begin(ProtocolKind::Tefca, "query", Direction::Outbound, None, json!({}))
            .await
            .unwrap();

        let done = ledger
            .complete(&record.id, TransactionOutcome::failed("remote unreachable"))
            .await
            .unwrap();
        assert_eq!(done.status, TransactionStatus::Failed);
        assert_eq!(done.error_message.as_deref(), Some("remote unreachable"));
        assert!(done.processing_time_ms.is_some());
    }
}
