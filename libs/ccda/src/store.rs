//! Document repository port and the in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::types::DocumentType;

/// Query result cap; matches what the API pages out per request.
pub const QUERY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeStatus {
    /// Authored by this gateway.
    Local,
    /// Received from an external organization.
    Received,
}

/// Persisted document metadata plus the raw XML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    /// Storage id, distinct from the document's own id.
    pub id: String,
    pub document_id: String,
    pub document_type: DocumentType,
    pub patient_id: String,
    pub title: Option<String>,
    pub creation_time: DateTime<Utc>,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
    pub author_organization: Option<String>,
    pub content_hash: String,
    pub size_bytes: usize,
    pub exchange_status: ExchangeStatus,
    pub source_organization: Option<String>,
    pub raw_xml: String,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentQuery {
    pub patient_id: Option<String>,
    pub document_type: Option<DocumentType>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub author_organization: Option<String>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, document: StoredDocument);
    async fn get(&self, document_id: &str) -> Option<StoredDocument>;
    /// Matching documents, newest first, capped at [`QUERY_LIMIT`].
    async fn query(&self, params: &DocumentQuery) -> Vec<StoredDocument>;
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<String, StoredDocument>>,
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, document: StoredDocument) {
        self.documents
            .write()
            .await
            .insert(document.document_id.clone(), document);
    }

    async fn get(&self, document_id: &str) -> Option<StoredDocument> {
        self.documents.read().await.get(document_id).cloned()
    }

    async fn query(&self, params: &DocumentQuery) -> Vec<StoredDocument> {
        let mut matches: Vec<StoredDocument> = self
            .documents
            .read()
            .await
            .values()
            .filter(|doc| {
                params
                    .patient_id
                    .as_ref()
                    .map_or(true, |p| &doc.patient_id == p)
                    && params
                        .document_type
                        .map_or(true, |t| doc.document_type == t)
                    && params.date_from.map_or(true, |from| doc.creation_time >= from)
                    && params.date_to.map_or(true, |to| doc.creation_time <= to)
                    && params.author_organization.as_ref().map_or(true, |org| {
                        doc.author_organization
                            .as_ref()
                            .is_some_and(|a| a.to_lowercase().contains(&org.to_lowercase()))
                    })
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.creation_time.cmp(&a.creation_time));
        matches.truncate(QUERY_LIMIT);
        matches
    }
}
