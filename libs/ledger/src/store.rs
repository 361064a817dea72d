//! Persistence port for ledger records.

use crate::record::TransactionRecord;
use crate::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Storage port for [`TransactionRecord`]s. Implementations are append-plus-
/// finalize only; the [`crate::Ledger`] service enforces immutability rules
/// before calling `update`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert(&self, record: TransactionRecord);
    async fn update(&self, record: TransactionRecord) -> Result<()>;
    async fn get(&self, id: &str) -> Option<TransactionRecord>;
    async fn by_correlation(&self, correlation_id: &str) -> Vec<TransactionRecord>;
    /// Every record, newest first.
    async fn all(&self) -> Vec<TransactionRecord>;
}

/// In-memory store used by the gateway wiring and tests.
#[derive(Default)]
pub struct MemoryLedger {
    records: RwLock<HashMap<String, TransactionRecord>>,
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn insert(&self, record: TransactionRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }

    async fn update(&self, record: TransactionRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if !records.contains_key(&record.id) {
            return Err(LedgerError::NotFound(record.id));
        }
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> Option<TransactionRecord> {
        self.records.read().await.get(id).cloned()
    }

    async fn by_correlation(&self, correlation_id: &str) -> Vec<TransactionRecord> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.correlation_id == correlation_id)
            .cloned()
            .collect()
    }

    async fn all(&self) -> Vec<TransactionRecord> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.initiated_at.cmp(&a.initiated_at));
        records
    }
}
