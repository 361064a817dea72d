//! Document exchange service: ties the codec to storage and the ledger.

use chrono::Utc;
use hie_ledger::{hex_sha256, Direction, Ledger, ProtocolKind, TransactionOutcome};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::CcdaError;
use crate::fhir::to_fhir;
use crate::generate::{generate, GenerateRequest};
use crate::parse::parse;
use crate::store::{DocumentQuery, DocumentStore, ExchangeStatus, StoredDocument};
use crate::validate::{validate, ValidationReport};
use crate::Result;

#[derive(Clone)]
pub struct CcdaService {
    store: Arc<dyn DocumentStore>,
    ledger: Ledger,
}

impl CcdaService {
    pub fn new(store: Arc<dyn DocumentStore>, ledger: Ledger) -> Self {
        Self { store, ledger }
    }

    /// Parse and persist a document. `source` names the sending organization
    /// for received documents; locally authored ones pass `None`.
    pub async fn store_document(
        &self,
        xml: &str,
        source: Option<&str>,
    ) -> Result<StoredDocument> {
        let document = parse(xml)?;

        let direction = if source.is_some() {
            Direction::Inbound
        } else {
            Direction::Outbound
        };
        let record = self
            .ledger
            .begin(
                ProtocolKind::Ccda,
                "document-store",
                direction,
                source.map(str::to_string),
                json!({
                    "documentId": document.id,
                    "documentType": document.document_type,
                    "patientId": document.patient_id,
                }),
            )
            .await?;

        let stored = StoredDocument {
            id: Uuid::new_v4().to_string(),
            document_id: document.id.clone(),
            document_type: document.document_type,
            patient_id: document.patient_id.clone(),
            title: document.title.clone(),
            creation_time: document.creation_time,
            author_id: document.author.as_ref().and_then(|a| a.id.clone()),
            author_name: document.author.as_ref().and_then(|a| a.name.clone()),
            author_organization: document.author.as_ref().and_then(|a| a.organization.clone()),
            content_hash: hex_sha256(xml.as_bytes()),
            size_bytes: xml.len(),
            exchange_status: if source.is_some() {
                ExchangeStatus::Received
            } else {
                ExchangeStatus::Local
            },
            source_organization: source.map(str::to_string),
            raw_xml: xml.to_string(),
            stored_at: Utc::now(),
        };
        self.store.insert(stored.clone()).await;

        self.ledger
            .complete(
                &record.id,
                TransactionOutcome::completed_with(json!({
                    "storageId": stored.id,
                    "contentHash": stored.content_hash,
                    "sizeBytes": stored.size_bytes,
                })),
            )
            .await?;

        tracing::info!(
            document_id = %stored.document_id,
            patient_id = %stored.patient_id,
            document_type = ?stored.document_type,
            source = source.unwrap_or("local"),
            "document stored"
        );
        Ok(stored)
    }

    /// Generate a document from structured data and persist it as local.
    pub async fn generate_document(&self, request: &GenerateRequest) -> Result<StoredDocument> {
        let xml = generate(request)?;
        self.store_document(&xml, None).await
    }

    pub fn validate_document(&self, xml: &str) -> ValidationReport {
        validate(xml)
    }

    pub async fn query(&self, params: &DocumentQuery) -> Vec<StoredDocument> {
        self.store.query(params).await
    }

    pub async fn retrieve(&self, document_id: &str) -> Option<StoredDocument> {
        self.store.get(document_id).await
    }

    /// Convert a stored document to a FHIR Bundle.
    pub async fn to_fhir_bundle(&self, document_id: &str) -> Result<JsonValue> {
        let stored = self
            .store
            .get(document_id)
            .await
            .ok_or_else(|| CcdaError::NotFound(document_id.to_string()))?;
        let document = parse(&stored.raw_xml)?;
        Ok(to_fhir(&document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::{AuthorInfo, PatientInfo, SectionInput};
    use crate::store::MemoryDocumentStore;
    use crate::types::DocumentType;
    use hie_ledger::{LedgerStore, MemoryLedger, TransactionStatus};

    fn service() -> (CcdaService, Arc<MemoryLedger>) {
        let ledger_store = Arc::new(MemoryLedger::default());
        let service = CcdaService::new(
            Arc::new(MemoryDocumentStore::default()),
            Ledger::new(ledger_store.clone()),
        );
        (service, ledger_store)
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            document_type: DocumentType::Ccd,
            patient_id: "PAT-7".into(),
            patient: PatientInfo {
                first_name: "Adam".into(),
                last_name: "Everyman".into(),
                dob: "1974-12-25".into(),
                gender: "male".into(),
                address: None,
                phone: None,
            },
            author: AuthorInfo {
                name: "Dr. Primary".into(),
                organization: "Community Health".into(),
                npi: Some("9876543210".into()),
            },
            sections: vec![SectionInput {
                code: "10160-0".into(),
                title: "Medications".into(),
                entries: vec![],
            }],
        }
    }

    #[tokio::test]
    async fn generate_store_retrieve_to_fhir() {
        let (service, ledger_store) = service();
        let stored = service.generate_document(&request()).await.unwrap();
        assert_eq!(stored.exchange_status, ExchangeStatus::Local);
        assert_eq!(stored.content_hash.len(), 64);

        let found = service.retrieve(&stored.document_id).await.unwrap();
        assert_eq!(found.patient_id, "PAT-7");

        let bundle = service.to_fhir_bundle(&stored.document_id).await.unwrap();
        assert_eq!(bundle["resourceType"], "Bundle");
        assert_eq!(
            bundle["entry"][1]["resource"]["subject"]["reference"],
            "Patient/PAT-7"
        );

        let records = ledger_store.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, "document-store");
    }

    #[tokio::test]
    async fn received_documents_record_their_source() {
        let (service, ledger_store) = service();
        let xml = crate::generate::generate(&request()).unwrap();
        let stored = service
            .store_document(&xml, Some("Regional HIE"))
            .await
            .unwrap();

        assert_eq!(stored.exchange_status, ExchangeStatus::Received);
        assert_eq!(stored.source_organization.as_deref(), Some("Regional HIE"));

        let all = ledger_store.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, TransactionStatus::Completed);
        assert_eq!(all[0].partner_id.as_deref(), Some("Regional HIE"));
    }

    #[tokio::test]
    async fn unknown_document_is_not_found() {
        let (service, _) = service();
        assert!(service.retrieve("ghost").await.is_none());
        let err = service.to_fhir_bundle("ghost").await.unwrap_err();
        assert!(matches!(err, CcdaError::NotFound(_)));
    }
}
