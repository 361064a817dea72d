//! Direct address registry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    User,
    Organization,
    Department,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressStatus {
    /// Registered, awaiting verification.
    Pending,
    Active,
    Suspended,
    Revoked,
    Expired,
}

/// One provisioned Direct address with its certificate material and
/// activity counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectAddress {
    pub address: String,
    pub domain: String,
    pub owner_id: String,
    pub owner_type: OwnerType,
    pub owner_name: Option<String>,
    /// PEM-encoded certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    /// PEM-encoded PKCS#8 private key. Never serialized.
    #[serde(skip_serializing, default)]
    pub private_key: Option<String>,
    pub trust_anchor: Option<String>,
    pub status: AddressStatus,
    pub certificate_expiry: Option<DateTime<Utc>>,
    pub issuer_dn: Option<String>,
    pub subject_dn: Option<String>,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub last_activity: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DirectAddress {
    /// An address can participate in exchanges once it is active and
    /// carries a certificate.
    pub fn is_usable(&self) -> bool {
        self.status == AddressStatus::Active && self.certificate.is_some()
    }
}

#[async_trait]
pub trait AddressStore: Send + Sync {
    async fn insert(&self, address: DirectAddress);
    async fn update(&self, address: DirectAddress);
    async fn get(&self, address: &str) -> Option<DirectAddress>;
    /// Addresses for one owner, newest first.
    async fn list_by_owner(&self, owner_id: &str) -> Vec<DirectAddress>;
}

#[derive(Default)]
pub struct MemoryAddressStore {
    addresses: RwLock<HashMap<String, DirectAddress>>,
}

#[async_trait]
impl AddressStore for MemoryAddressStore {
    async fn insert(&self, address: DirectAddress) {
        self.addresses
            .write()
            .await
            .insert(address.address.clone(), address);
    }

    async fn update(&self, address: DirectAddress) {
        self.insert(address).await;
    }

    async fn get(&self, address: &str) -> Option<DirectAddress> {
        self.addresses.read().await.get(address).cloned()
    }

    async fn list_by_owner(&self, owner_id: &str) -> Vec<DirectAddress> {
        let mut owned: Vec<DirectAddress> = self
            .addresses
            .read()
            .await
            .values()
            .filter(|a| a.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(addr: &str, owner: &str) -> DirectAddress {
        DirectAddress {
            address: addr.to_string(),
            domain: addr.split('@').nth(1).unwrap_or_default().to_string(),
            owner_id: owner.to_string(),
            owner_type: OwnerType::User,
            owner_name: None,
            certificate: None,
            private_key: None,
            trust_anchor: None,
            status: AddressStatus::Pending,
            certificate_expiry: None,
            issuer_dn: None,
            subject_dn: None,
            messages_sent: 0,
            messages_received: 0,
            last_activity: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn listing_is_scoped_to_the_owner() {
        let store = MemoryAddressStore::default();
        store.insert(address("a@direct.example.org", "owner-1")).await;
        store.insert(address("b@direct.example.org", "owner-1")).await;
        store.insert(address("c@direct.example.org", "owner-2")).await;

        assert_eq!(store.list_by_owner("owner-1").await.len(), 2);
        assert_eq!(store.list_by_owner("owner-3").await.len(), 0);
    }

    #[test]
    fn usability_requires_active_status_and_certificate() {
        let mut addr = address("a@direct.example.org", "owner-1");
        assert!(!addr.is_usable());
        addr.status = AddressStatus::Active;
        assert!(!addr.is_usable());
        addr.certificate = Some("PEM".into());
        assert!(addr.is_usable());
    }
}
