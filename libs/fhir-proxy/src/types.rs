//! Endpoint configuration and the proxy request/response model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    None,
    Basic,
    Oauth2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    /// Registered but not yet verified against its capability statement.
    Testing,
    Active,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirEndpointConfig {
    pub id: String,
    pub name: String,
    pub url: String,
    pub fhir_version: String,
    pub auth_type: AuthType,
    pub token_endpoint: Option<String>,
    pub client_id: Option<String>,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
    pub organization_name: Option<String>,
    pub organization_npi: Option<String>,
    pub status: EndpointStatus,
    pub health_status: HealthStatus,
    pub last_health_check: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_statement: Option<JsonValue>,
    pub supported_resources: Vec<String>,
    pub registered_at: DateTime<Utc>,
}

impl FhirEndpointConfig {
    pub fn supports(&self, resource_type: &str) -> bool {
        self.supported_resources.iter().any(|r| r == resource_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FhirOperation {
    Read,
    Search,
    Create,
    Update,
    Delete,
    Batch,
}

/// One proxied FHIR interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirRequest {
    pub resource_type: String,
    pub operation: FhirOperation,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub parameters: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<JsonValue>,
    #[serde(default)]
    pub endpoint_id: Option<String>,
}

/// Proxy outcome. Upstream failures surface here with `success = false`
/// rather than as errors; only gateway-side problems raise
/// [`crate::FhirProxyError`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status_code: u16,
}

impl FhirResponse {
    pub fn ok(status_code: u16, data: JsonValue) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            status_code,
        }
    }

    pub fn err(status_code: u16, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            status_code,
        }
    }
}

/// Registration input; everything else on [`FhirEndpointConfig`] is
/// assigned by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterEndpoint {
    pub name: String,
    pub url: String,
    pub fhir_version: String,
    pub auth_type: AuthType,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub organization_name: Option<String>,
    #[serde(default)]
    pub organization_npi: Option<String>,
}

/// `rest[].resource[].type` from a capability statement.
pub fn extract_supported_resources(capability: &JsonValue) -> Vec<String> {
    let mut resources = Vec::new();
    if let Some(rests) = capability.get("rest").and_then(JsonValue::as_array) {
        for rest in rests {
            if let Some(entries) = rest.get("resource").and_then(JsonValue::as_array) {
                for resource in entries {
                    if let Some(ty) = resource.get("type").and_then(JsonValue::as_str) {
                        resources.push(ty.to_string());
                    }
                }
            }
        }
    }
    resources
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn supported_resources_from_capability() {
        let capability = json!({
            "resourceType": "CapabilityStatement",
            "rest": [{
                "mode": "server",
                "resource": [
                    { "type": "Patient" },
                    { "type": "Observation" },
                    { "interaction": [] },
                ],
            }],
        });
        assert_eq!(
            extract_supported_resources(&capability),
            vec!["Patient", "Observation"]
        );
        assert!(extract_supported_resources(&json!({})).is_empty());
    }
}
