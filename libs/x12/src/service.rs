//! Inbound processing pipeline and outbound generation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hie_ledger::{Direction, Ledger, ProtocolKind, TransactionOutcome};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::generate::{generate, generate_999, OutboundData, OutboundKind};
use crate::interpret::{interpret, InterpretedTransaction};
use crate::parse::parse;
use crate::partner::PartnerDirectory;
use crate::types::{TransactionSetKind, X12TransactionStatus};
use crate::validate::validate;
use crate::Result;

/// Persisted view of one inbound interchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct X12Transaction {
    pub id: String,
    pub kind: Option<TransactionSetKind>,
    pub status: X12TransactionStatus,
    pub sender_id: String,
    pub receiver_id: String,
    pub isa_control_number: String,
    pub validation_errors: Vec<String>,
    pub raw: String,
    pub received_at: DateTime<Utc>,
}

#[async_trait]
pub trait X12Store: Send + Sync {
    async fn insert(&self, transaction: X12Transaction);
    async fn get(&self, id: &str) -> Option<X12Transaction>;
    async fn list(&self) -> Vec<X12Transaction>;
}

#[derive(Default)]
pub struct MemoryX12Store {
    transactions: RwLock<HashMap<String, X12Transaction>>,
}

#[async_trait]
impl X12Store for MemoryX12Store {
    async fn insert(&self, transaction: X12Transaction) {
        self.transactions
            .write()
            .await
            .insert(transaction.id.clone(), transaction);
    }

    async fn get(&self, id: &str) -> Option<X12Transaction> {
        self.transactions.read().await.get(id).cloned()
    }

    async fn list(&self) -> Vec<X12Transaction> {
        let mut all: Vec<_> = self.transactions.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        all
    }
}

/// Outcome of one inbound interchange. `success` is false only when the
/// interchange was rejected; the acknowledgment is produced either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct X12ProcessingResult {
    pub success: bool,
    pub transaction_id: String,
    pub ledger_id: String,
    pub kind: Option<TransactionSetKind>,
    pub interpretation: Option<InterpretedTransaction>,
    pub validation_errors: Vec<String>,
    pub acknowledgment: String,
}

#[derive(Clone)]
pub struct X12Service {
    store: Arc<dyn X12Store>,
    partners: Arc<dyn PartnerDirectory>,
    ledger: Ledger,
}

impl X12Service {
    pub fn new(
        store: Arc<dyn X12Store>,
        partners: Arc<dyn PartnerDirectory>,
        ledger: Ledger,
    ) -> Self {
        Self {
            store,
            partners,
            ledger,
        }
    }

    /// Process one inbound interchange: parse, validate, interpret, persist,
    /// acknowledge. Envelope violations reject the interchange (negative 999,
    /// failed ledger row) but are still a successful gateway operation.
    /// Unreadable content is the only error path, and leaves no record.
    pub async fn process_inbound(&self, raw: &str, partner_id: Option<&str>) -> Result<X12ProcessingResult> {
        let parsed = parse(raw)?;

        let operation = parsed
            .kind
            .map(|k| k.canonical_name())
            .unwrap_or("unknown");
        let record = self
            .ledger
            .begin(
                ProtocolKind::X12,
                operation,
                Direction::Inbound,
                partner_id.map(str::to_string),
                json!({
                    "isaControlNumber": parsed.envelope.isa_control_number,
                    "senderId": parsed.envelope.sender_id,
                    "receiverId": parsed.envelope.receiver_id,
                    "segmentCount": parsed.segments.len(),
                }),
            )
            .await?;

        let errors = validate(&parsed);
        let acknowledgment = generate_999(&parsed, &errors);

        let transaction_id = Uuid::new_v4().to_string();
        let rejected = !errors.is_empty();
        let transaction = X12Transaction {
            id: transaction_id.clone(),
            kind: parsed.kind,
            status: if rejected {
                X12TransactionStatus::Rejected
            } else {
                X12TransactionStatus::Validated
            },
            sender_id: parsed.envelope.sender_id.clone(),
            receiver_id: parsed.envelope.receiver_id.clone(),
            isa_control_number: parsed.envelope.isa_control_number.clone(),
            validation_errors: errors.clone(),
            raw: raw.to_string(),
            received_at: Utc::now(),
        };
        self.store.insert(transaction).await;

        if rejected {
            tracing::warn!(
                transaction_id = %transaction_id,
                sender = %parsed.envelope.sender_id,
                errors = errors.len(),
                "interchange rejected"
            );
            self.ledger
                .complete(
                    &record.id,
                    TransactionOutcome::failed_with(
                        errors.join("; "),
                        json!({ "validationErrors": errors }),
                    ),
                )
                .await?;
            return Ok(X12ProcessingResult {
                success: false,
                transaction_id,
                ledger_id: record.id,
                kind: parsed.kind,
                interpretation: None,
                validation_errors: errors,
                acknowledgment,
            });
        }

        let interpretation = interpret(&parsed);
        tracing::info!(
            transaction_id = %transaction_id,
            kind = ?parsed.kind,
            sender = %parsed.envelope.sender_id,
            "interchange accepted"
        );
        self.ledger
            .complete(
                &record.id,
                TransactionOutcome::completed_with(json!({
                    "transactionId": transaction_id,
                    "isaControlNumber": parsed.envelope.isa_control_number,
                })),
            )
            .await?;

        Ok(X12ProcessingResult {
            success: true,
            transaction_id,
            ledger_id: record.id,
            kind: parsed.kind,
            interpretation: Some(interpretation),
            validation_errors: Vec::new(),
            acknowledgment,
        })
    }

    /// Generate an outbound transaction addressed to a registered partner.
    /// Returns the raw interchange alongside its ledger id.
    pub async fn generate_outbound(
        &self,
        kind: OutboundKind,
        data: &OutboundData,
        partner_id: &str,
    ) -> Result<(String, String)> {
        let partner = self.partners.get(partner_id).await?;
        let raw = generate(kind, data, &partner);

        let record = self
            .ledger
            .begin(
                ProtocolKind::X12,
                kind.set_kind().canonical_name(),
                Direction::Outbound,
                Some(partner_id.to_string()),
                json!({ "partnerId": partner_id }),
            )
            .await?;
        self.ledger
            .complete(
                &record.id,
                TransactionOutcome::completed_with(json!({ "bytes": raw.len() })),
            )
            .await?;

        tracing::info!(
            partner_id = %partner_id,
            kind = ?kind,
            "outbound interchange generated"
        );
        Ok((raw, record.id))
    }

    pub async fn get_transaction(&self, id: &str) -> Option<X12Transaction> {
        self.store.get(id).await
    }

    pub async fn list_transactions(&self) -> Vec<X12Transaction> {
        self.store.list().await
    }
}
