//! Trading partner registry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::X12Error;
use crate::Result;

/// A configured trading partner. ISA/GS identifiers fall back to the
/// partner id when not set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingPartner {
    pub id: String,
    pub name: String,
    pub isa_id: Option<String>,
    pub isa_qualifier: Option<String>,
    pub gs_id: Option<String>,
    pub endpoint_url: Option<String>,
    pub direct_domain: Option<String>,
    pub fhir_version: Option<String>,
}

impl TradingPartner {
    pub fn isa_id(&self) -> &str {
        self.isa_id.as_deref().unwrap_or(&self.id)
    }

    pub fn gs_id(&self) -> &str {
        self.gs_id.as_deref().unwrap_or(&self.id)
    }
}

#[async_trait]
pub trait PartnerDirectory: Send + Sync {
    async fn get(&self, partner_id: &str) -> Result<TradingPartner>;
    async fn upsert(&self, partner: TradingPartner) -> Result<()>;
    async fn list(&self) -> Result<Vec<TradingPartner>>;
}

#[derive(Default)]
pub struct MemoryPartnerDirectory {
    partners: RwLock<HashMap<String, TradingPartner>>,
}

#[async_trait]
impl PartnerDirectory for MemoryPartnerDirectory {
    async fn get(&self, partner_id: &str) -> Result<TradingPartner> {
        self.partners
            .read()
            .await
            .get(partner_id)
            .cloned()
            .ok_or_else(|| X12Error::PartnerNotFound(partner_id.to_string()))
    }

    async fn upsert(&self, partner: TradingPartner) -> Result<()> {
        self.partners
            .write()
            .await
            .insert(partner.id.clone(), partner);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TradingPartner>> {
        let mut partners: Vec<_> = self.partners.read().await.values().cloned().collect();
        partners.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(partners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_partner_is_an_error() {
        let dir = MemoryPartnerDirectory::default();
        assert!(matches!(
            dir.get("nobody").await,
            Err(X12Error::PartnerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn identifier_fallback() {
        let partner = TradingPartner {
            id: "acme".into(),
            name: "Acme".into(),
            isa_id: None,
            isa_qualifier: None,
            gs_id: Some("ACMEGS".into()),
            endpoint_url: None,
            direct_domain: None,
            fhir_version: None,
        };
        assert_eq!(partner.isa_id(), "acme");
        assert_eq!(partner.gs_id(), "ACMEGS");
    }
}
