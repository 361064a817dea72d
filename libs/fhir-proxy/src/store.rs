//! Endpoint registry port.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::types::{EndpointStatus, FhirEndpointConfig};

#[async_trait]
pub trait EndpointStore: Send + Sync {
    async fn insert(&self, endpoint: FhirEndpointConfig);
    async fn update(&self, endpoint: FhirEndpointConfig);
    async fn get(&self, id: &str) -> Option<FhirEndpointConfig>;
    /// Any active endpoint, used when the caller names none.
    async fn first_active(&self) -> Option<FhirEndpointConfig>;
    async fn list(&self) -> Vec<FhirEndpointConfig>;
    /// Active endpoints supporting `resource_type`, optionally narrowed to
    /// the given ids.
    async fn active_supporting(
        &self,
        resource_type: &str,
        ids: Option<&[String]>,
    ) -> Vec<FhirEndpointConfig>;
}

#[derive(Default)]
pub struct MemoryEndpointStore {
    endpoints: RwLock<HashMap<String, FhirEndpointConfig>>,
}

#[async_trait]
impl EndpointStore for MemoryEndpointStore {
    async fn insert(&self, endpoint: FhirEndpointConfig) {
        self.endpoints
            .write()
            .await
            .insert(endpoint.id.clone(), endpoint);
    }

    async fn update(&self, endpoint: FhirEndpointConfig) {
        self.insert(endpoint).await;
    }

    async fn get(&self, id: &str) -> Option<FhirEndpointConfig> {
        self.endpoints.read().await.get(id).cloned()
    }

    async fn first_active(&self) -> Option<FhirEndpointConfig> {
        let mut active: Vec<FhirEndpointConfig> = self
            .endpoints
            .read()
            .await
            .values()
            .filter(|e| e.status == EndpointStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
        active.into_iter().next()
    }

    async fn list(&self) -> Vec<FhirEndpointConfig> {
        let mut all: Vec<_> = self.endpoints.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
        all
    }

    async fn active_supporting(
        &self,
        resource_type: &str,
        ids: Option<&[String]>,
    ) -> Vec<FhirEndpointConfig> {
        let mut matching: Vec<FhirEndpointConfig> = self
            .endpoints
            .read()
            .await
            .values()
            .filter(|e| e.status == EndpointStatus::Active)
            .filter(|e| e.supports(resource_type))
            .filter(|e| ids.map_or(true, |ids| ids.iter().any(|id| id == &e.id)))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
        matching
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuthType, HealthStatus};
    use chrono::Utc;

    fn endpoint(id: &str, status: EndpointStatus, resources: &[&str]) -> FhirEndpointConfig {
        FhirEndpointConfig {
            id: id.to_string(),
            name: id.to_string(),
            url: format!("https://{id}.example.org/fhir"),
            fhir_version: "4.0.1".into(),
            auth_type: AuthType::None,
            token_endpoint: None,
            client_id: None,
            client_secret: None,
            scopes: vec![],
            organization_name: None,
            organization_npi: None,
            status,
            health_status: HealthStatus::Unknown,
            last_health_check: None,
            capability_statement: None,
            supported_resources: resources.iter().map(|r| r.to_string()).collect(),
            registered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn active_supporting_filters_status_resource_and_ids() {
        let store = MemoryEndpointStore::default();
        store
            .insert(endpoint("a", EndpointStatus::Active, &["Patient"]))
            .await;
        store
            .insert(endpoint("b", EndpointStatus::Active, &["Observation"]))
            .await;
        store
            .insert(endpoint("c", EndpointStatus::Testing, &["Patient"]))
            .await;

        let patient = store.active_supporting("Patient", None).await;
        assert_eq!(patient.len(), 1);
        assert_eq!(patient[0].id, "a");

        let narrowed = store
            .active_supporting("Patient", Some(&["b".to_string()]))
            .await;
        assert!(narrowed.is_empty());
    }
}
