//! Network participant directory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::NetqueryError;
use crate::types::{Network, PurposeOfUse, QueryType};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Pending,
    Active,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TefcaRole {
    #[serde(rename = "QHIN")]
    Qhin,
    Participant,
    Subparticipant,
}

/// One organization connected through a network: a QHIN, a Carequality
/// community or a CommonWell member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkParticipant {
    pub id: String,
    pub network: Network,
    /// Network-scoped identifier: organization OID for TEFCA, home
    /// community id for Carequality, organization id for CommonWell.
    pub participant_id: String,
    pub organization_name: String,
    pub organization_oid: Option<String>,
    pub npi: Option<String>,
    pub status: ParticipantStatus,
    pub capabilities: Vec<QueryType>,
    /// Base URL for the network protocol endpoints.
    pub endpoint: String,
    pub query_endpoint: Option<String>,
    pub retrieve_endpoint: Option<String>,
    /// Repository ids hosted by this participant, used to route retrieves.
    #[serde(default)]
    pub repositories: Vec<String>,
    pub tefca_role: Option<TefcaRole>,
    pub implementer_oid: Option<String>,
    pub commonwell_org_id: Option<String>,
    pub supported_purposes: Vec<PurposeOfUse>,
    pub registered_at: DateTime<Utc>,
}

impl NetworkParticipant {
    pub fn supports(&self, capability: QueryType) -> bool {
        self.status == ParticipantStatus::Active && self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectoryFilters {
    pub name: Option<String>,
    pub capabilities: Vec<QueryType>,
}

#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    async fn insert(&self, participant: NetworkParticipant);
    async fn get(&self, network: Network, participant_id: &str) -> Option<NetworkParticipant>;
    /// All participants of one network, oldest registration first.
    async fn list(&self, network: Network) -> Vec<NetworkParticipant>;
}

/// The participant that hosts a repository: repository list match first,
/// then the participant id itself.
pub async fn resolve_repository(
    directory: &dyn ParticipantDirectory,
    network: Network,
    repository_id: &str,
) -> Result<NetworkParticipant> {
    let participants = directory.list(network).await;
    participants
        .into_iter()
        .filter(|p| p.supports(QueryType::DocumentRetrieve))
        .find(|p| {
            p.repositories.iter().any(|r| r == repository_id) || p.participant_id == repository_id
        })
        .ok_or_else(|| NetqueryError::RepositoryNotFound(repository_id.to_string()))
}

/// Case-insensitive name filter plus capability conjunction.
pub async fn search_directory(
    directory: &dyn ParticipantDirectory,
    network: Network,
    filters: &DirectoryFilters,
) -> Vec<NetworkParticipant> {
    let name = filters.name.as_deref().map(str::to_lowercase);
    directory
        .list(network)
        .await
        .into_iter()
        .filter(|p| {
            if let Some(name) = &name {
                if !p.organization_name.to_lowercase().contains(name) {
                    return false;
                }
            }
            filters
                .capabilities
                .iter()
                .all(|c| p.capabilities.contains(c))
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterParticipant {
    pub network: Network,
    pub participant_id: String,
    pub organization_name: String,
    pub organization_oid: Option<String>,
    pub npi: Option<String>,
    pub endpoint: String,
    pub query_endpoint: Option<String>,
    pub retrieve_endpoint: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<QueryType>,
    #[serde(default)]
    pub repositories: Vec<String>,
    pub tefca_role: Option<TefcaRole>,
    pub implementer_oid: Option<String>,
    pub commonwell_org_id: Option<String>,
}

impl RegisterParticipant {
    /// New registrations start pending with the default purpose set.
    pub fn into_participant(self) -> NetworkParticipant {
        NetworkParticipant {
            id: Uuid::new_v4().to_string(),
            network: self.network,
            participant_id: self.participant_id,
            organization_name: self.organization_name,
            organization_oid: self.organization_oid,
            npi: self.npi,
            status: ParticipantStatus::Pending,
            capabilities: self.capabilities,
            endpoint: self.endpoint,
            query_endpoint: self.query_endpoint,
            retrieve_endpoint: self.retrieve_endpoint,
            repositories: self.repositories,
            tefca_role: self.tefca_role,
            implementer_oid: self.implementer_oid,
            commonwell_org_id: self.commonwell_org_id,
            supported_purposes: vec![
                PurposeOfUse::Treatment,
                PurposeOfUse::Payment,
                PurposeOfUse::Operations,
            ],
            registered_at: Utc::now(),
        }
    }
}

#[derive(Default)]
pub struct MemoryParticipantDirectory {
    participants: RwLock<HashMap<(Network, String), NetworkParticipant>>,
}

#[async_trait]
impl ParticipantDirectory for MemoryParticipantDirectory {
    async fn insert(&self, participant: NetworkParticipant) {
        self.participants.write().await.insert(
            (participant.network, participant.participant_id.clone()),
            participant,
        );
    }

    async fn get(&self, network: Network, participant_id: &str) -> Option<NetworkParticipant> {
        self.participants
            .read()
            .await
            .get(&(network, participant_id.to_string()))
            .cloned()
    }

    async fn list(&self, network: Network) -> Vec<NetworkParticipant> {
        let mut all: Vec<NetworkParticipant> = self
            .participants
            .read()
            .await
            .values()
            .filter(|p| p.network == network)
            .cloned()
            .collect();
        all.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(network: Network, id: &str, name: &str) -> NetworkParticipant {
        let mut p = RegisterParticipant {
            network,
            participant_id: id.to_string(),
            organization_name: name.to_string(),
            organization_oid: None,
            npi: None,
            endpoint: format!("https://{id}.example.org"),
            query_endpoint: None,
            retrieve_endpoint: None,
            capabilities: vec![
                QueryType::PatientDiscovery,
                QueryType::DocumentQuery,
                QueryType::DocumentRetrieve,
            ],
            repositories: vec![],
            tefca_role: None,
            implementer_oid: None,
            commonwell_org_id: None,
        }
        .into_participant();
        p.status = ParticipantStatus::Active;
        p
    }

    #[tokio::test]
    async fn directory_search_filters_by_name_and_capability() {
        let dir = MemoryParticipantDirectory::default();
        dir.insert(participant(Network::Carequality, "2.16.840.1.113883.3.6147", "Epic Systems"))
            .await;
        let mut cerner = participant(Network::Carequality, "2.16.840.1.113883.3.464", "Cerner");
        cerner.capabilities = vec![QueryType::PatientDiscovery];
        dir.insert(cerner).await;

        let by_name = search_directory(
            &dir,
            Network::Carequality,
            &DirectoryFilters {
                name: Some("epic".to_string()),
                capabilities: vec![],
            },
        )
        .await;
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].organization_name, "Epic Systems");

        let by_capability = search_directory(
            &dir,
            Network::Carequality,
            &DirectoryFilters {
                name: None,
                capabilities: vec![QueryType::DocumentRetrieve],
            },
        )
        .await;
        assert_eq!(by_capability.len(), 1);
        assert_eq!(by_capability[0].organization_name, "Epic Systems");
    }

    #[tokio::test]
    async fn repository_resolution_prefers_the_hosting_participant() {
        let dir = MemoryParticipantDirectory::default();
        let mut epic = participant(Network::Carequality, "2.16.840.1.113883.3.6147", "Epic Systems");
        epic.repositories = vec!["1.3.6.1.4.1.21367.2005.3.7".to_string()];
        dir.insert(epic).await;
        dir.insert(participant(Network::Carequality, "2.16.840.1.113883.3.464", "Cerner"))
            .await;

        let by_repo = resolve_repository(&dir, Network::Carequality, "1.3.6.1.4.1.21367.2005.3.7")
            .await
            .unwrap();
        assert_eq!(by_repo.organization_name, "Epic Systems");

        let by_id = resolve_repository(&dir, Network::Carequality, "2.16.840.1.113883.3.464")
            .await
            .unwrap();
        assert_eq!(by_id.organization_name, "Cerner");

        let missing = resolve_repository(&dir, Network::Carequality, "unknown").await;
        assert!(matches!(missing, Err(NetqueryError::RepositoryNotFound(_))));
    }

    #[tokio::test]
    async fn inactive_participants_do_not_support_anything() {
        let mut p = participant(Network::Tefca, "urn:oid:2.999.1", "Pending QHIN");
        p.status = ParticipantStatus::Pending;
        assert!(!p.supports(QueryType::PatientDiscovery));
    }
}
