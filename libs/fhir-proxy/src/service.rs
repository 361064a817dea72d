//! The federation proxy itself.

use chrono::Utc;
use futures::future::join_all;
use hie_ledger::{Direction, Ledger, ProtocolKind, TransactionOutcome};
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::FhirProxyError;
use crate::store::EndpointStore;
use crate::token::TokenCache;
use crate::types::{
    extract_supported_resources, AuthType, EndpointStatus, FhirEndpointConfig, FhirOperation,
    FhirRequest, FhirResponse, HealthStatus, RegisterEndpoint,
};
use crate::Result;

/// Per-endpoint budget for fan-out searches.
pub const DEFAULT_FANOUT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct FhirProxy {
    client: reqwest::Client,
    endpoints: Arc<dyn EndpointStore>,
    tokens: Arc<TokenCache>,
    ledger: Ledger,
    fanout_timeout: Duration,
}

impl FhirProxy {
    pub fn new(client: reqwest::Client, endpoints: Arc<dyn EndpointStore>, ledger: Ledger) -> Self {
        Self {
            client,
            endpoints,
            tokens: Arc::new(TokenCache::default()),
            ledger,
            fanout_timeout: DEFAULT_FANOUT_TIMEOUT,
        }
    }

    pub fn with_fanout_timeout(mut self, timeout: Duration) -> Self {
        self.fanout_timeout = timeout;
        self
    }

    pub fn endpoints(&self) -> Arc<dyn EndpointStore> {
        Arc::clone(&self.endpoints)
    }

    /// Route one FHIR interaction to an endpoint. Upstream failures come
    /// back as an unsuccessful [`FhirResponse`]; a missing endpoint is the
    /// caller's error.
    pub async fn route_request(
        &self,
        request: &FhirRequest,
        endpoint_id: Option<&str>,
    ) -> Result<FhirResponse> {
        let endpoint = self
            .resolve_endpoint(endpoint_id.or(request.endpoint_id.as_deref()))
            .await?;

        let record = self
            .ledger
            .begin(
                ProtocolKind::Fhir,
                operation_label(request.operation),
                Direction::Outbound,
                Some(endpoint.id.clone()),
                json!({
                    "resourceType": request.resource_type,
                    "resourceId": request.resource_id,
                }),
            )
            .await?;

        let url = build_url(&endpoint.url, request);
        let builder = match request.operation {
            FhirOperation::Read | FhirOperation::Search => self.client.get(&url),
            FhirOperation::Create => self
                .client
                .post(&url)
                .json(request.body.as_ref().unwrap_or(&JsonValue::Null)),
            FhirOperation::Update => self
                .client
                .put(&url)
                .json(request.body.as_ref().unwrap_or(&JsonValue::Null)),
            FhirOperation::Delete => self.client.delete(&url),
            FhirOperation::Batch => self
                .client
                .post(&endpoint.url)
                .json(request.body.as_ref().unwrap_or(&JsonValue::Null)),
        };

        let response = self.execute(builder, &endpoint).await;
        self.finalize(&record.id, &response).await?;
        Ok(response)
    }

    /// Fan a search out to every active endpoint supporting the resource
    /// type. Entries are tagged with their source endpoint URL; partner
    /// failures are carried in the bundle rather than failing the search.
    /// Zero matching endpoints is an empty result, not an error.
    pub async fn search_across_endpoints(
        &self,
        resource_type: &str,
        parameters: &[(String, String)],
        endpoint_ids: Option<&[String]>,
    ) -> Result<FhirResponse> {
        let endpoints = self
            .endpoints
            .active_supporting(resource_type, endpoint_ids)
            .await;

        let record = self
            .ledger
            .begin(
                ProtocolKind::Fhir,
                "search-all",
                Direction::Outbound,
                None,
                json!({
                    "resourceType": resource_type,
                    "endpointCount": endpoints.len(),
                }),
            )
            .await?;

        if endpoints.is_empty() {
            let response = FhirResponse::ok(
                200,
                json!({
                    "resourceType": "Bundle",
                    "type": "searchset",
                    "total": 0,
                    "entry": [],
                }),
            );
            self.finalize(&record.id, &response).await?;
            return Ok(response);
        }

        let searches = endpoints.iter().map(|endpoint| {
            let url = format!(
                "{}/{}{}",
                endpoint.url,
                resource_type,
                query_string(parameters)
            );
            async move {
                let outcome = tokio::time::timeout(
                    self.fanout_timeout,
                    self.fetch_bundle(&url, endpoint),
                )
                .await;
                match outcome {
                    Ok(Ok(bundle)) => Ok(bundle),
                    Ok(Err(err)) => Err(format!("{}: {err}", endpoint.name)),
                    Err(_) => Err(format!("{}: timed out", endpoint.name)),
                }
            }
        });
        let results = join_all(searches).await;

        let mut entries: Vec<JsonValue> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        for (endpoint, result) in endpoints.iter().zip(results) {
            match result {
                Ok(bundle) => {
                    if let Some(bundle_entries) = bundle.get("entry").and_then(JsonValue::as_array)
                    {
                        for entry in bundle_entries {
                            let mut tagged = entry.clone();
                            if let Some(obj) = tagged.as_object_mut() {
                                obj.insert("_source".to_string(), json!(endpoint.url));
                            }
                            entries.push(tagged);
                        }
                    }
                }
                Err(message) => errors.push(message),
            }
        }

        let response = if errors.len() == endpoints.len() {
            FhirResponse::err(502, errors.join("; "))
        } else {
            let mut bundle = json!({
                "resourceType": "Bundle",
                "type": "searchset",
                "total": entries.len(),
                "entry": entries,
            });
            if !errors.is_empty() {
                bundle["_errors"] = json!(errors);
            }
            FhirResponse::ok(200, bundle)
        };
        self.finalize(&record.id, &response).await?;
        Ok(response)
    }

    /// POST a batch/transaction bundle to an endpoint's base URL.
    pub async fn execute_batch(&self, bundle: &JsonValue, endpoint_id: &str) -> Result<FhirResponse> {
        let endpoint = self.resolve_endpoint(Some(endpoint_id)).await?;
        let record = self
            .ledger
            .begin(
                ProtocolKind::Fhir,
                "batch",
                Direction::Outbound,
                Some(endpoint.id.clone()),
                json!({ "entryCount": bundle.get("entry").and_then(JsonValue::as_array).map(Vec::len) }),
            )
            .await?;

        let builder = self.client.post(&endpoint.url).json(bundle);
        let response = self.execute(builder, &endpoint).await;
        self.finalize(&record.id, &response).await?;
        Ok(response)
    }

    /// Fetch `{base}/metadata` and record the endpoint's supported resources
    /// and health from the result.
    pub async fn get_capability_statement(&self, endpoint_id: &str) -> Result<FhirResponse> {
        let mut endpoint = self.resolve_endpoint(Some(endpoint_id)).await?;

        let url = format!("{}/metadata", endpoint.url);
        let builder = self.client.get(&url);
        let response = self.execute(builder, &endpoint).await;

        endpoint.last_health_check = Some(Utc::now());
        if response.success {
            if let Some(capability) = &response.data {
                endpoint.supported_resources = extract_supported_resources(capability);
                endpoint.capability_statement = Some(capability.clone());
            }
            endpoint.health_status = HealthStatus::Healthy;
        } else {
            endpoint.health_status = HealthStatus::Unhealthy;
        }
        self.endpoints.update(endpoint).await;

        Ok(response)
    }

    /// Register an endpoint in `testing` status and attempt a capability
    /// fetch. The fetch result is recorded on the endpoint but never fails
    /// the registration.
    pub async fn register_endpoint(&self, input: RegisterEndpoint) -> Result<FhirEndpointConfig> {
        let endpoint = FhirEndpointConfig {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            url: input.url,
            fhir_version: input.fhir_version,
            auth_type: input.auth_type,
            token_endpoint: input.token_endpoint,
            client_id: input.client_id,
            client_secret: input.client_secret,
            scopes: input.scopes,
            organization_name: input.organization_name,
            organization_npi: input.organization_npi,
            status: EndpointStatus::Testing,
            health_status: HealthStatus::Unknown,
            last_health_check: None,
            capability_statement: None,
            supported_resources: Vec::new(),
            registered_at: Utc::now(),
        };
        let id = endpoint.id.clone();
        self.endpoints.insert(endpoint).await;

        if let Err(err) = self.get_capability_statement(&id).await {
            tracing::warn!(endpoint_id = %id, error = %err, "capability fetch failed at registration");
        }

        self.endpoints
            .get(&id)
            .await
            .ok_or(FhirProxyError::EndpointNotFound(id))
    }

    async fn resolve_endpoint(&self, endpoint_id: Option<&str>) -> Result<FhirEndpointConfig> {
        match endpoint_id {
            Some(id) => self
                .endpoints
                .get(id)
                .await
                .ok_or_else(|| FhirProxyError::EndpointNotFound(id.to_string())),
            None => self
                .endpoints
                .first_active()
                .await
                .ok_or(FhirProxyError::NoDefaultEndpoint),
        }
    }

    async fn fetch_bundle(&self, url: &str, endpoint: &FhirEndpointConfig) -> Result<JsonValue> {
        let builder = self.client.get(url);
        let builder = self.authorize(builder, endpoint).await?;
        let response = builder
            .header("Accept", "application/fhir+json")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Run a request, translating the upstream outcome into a
    /// [`FhirResponse`]. Transport errors surface as a 500-class response,
    /// matching how upstream HTTP failures are reported.
    async fn execute(&self, builder: RequestBuilder, endpoint: &FhirEndpointConfig) -> FhirResponse {
        let builder = match self.authorize(builder, endpoint).await {
            Ok(builder) => builder,
            Err(err) => return FhirResponse::err(502, err.to_string()),
        };
        let builder = builder
            .header("Accept", "application/fhir+json")
            .header("Content-Type", "application/fhir+json");

        match builder.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body: JsonValue = response.json().await.unwrap_or(JsonValue::Null);
                if (200..300).contains(&status) {
                    FhirResponse::ok(status, body)
                } else {
                    // Prefer the OperationOutcome diagnostics when present.
                    let diagnostics = body
                        .pointer("/issue/0/diagnostics")
                        .and_then(JsonValue::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("upstream returned status {status}"));
                    FhirResponse::err(status, diagnostics)
                }
            }
            Err(err) => {
                let status = err.status().map(|s| s.as_u16()).unwrap_or(500);
                FhirResponse::err(status, err.to_string())
            }
        }
    }

    async fn authorize(
        &self,
        builder: RequestBuilder,
        endpoint: &FhirEndpointConfig,
    ) -> Result<RequestBuilder> {
        match endpoint.auth_type {
            AuthType::None => Ok(builder),
            AuthType::Basic => {
                let id = endpoint.client_id.as_deref().unwrap_or_default();
                let secret = endpoint.client_secret.as_deref().unwrap_or_default();
                let credentials = BASE64.encode(format!("{id}:{secret}"));
                Ok(builder.header("Authorization", format!("Basic {credentials}")))
            }
            AuthType::Oauth2 => {
                let token = self.tokens.bearer_token(&self.client, endpoint).await?;
                Ok(builder.header("Authorization", format!("Bearer {token}")))
            }
        }
    }

    async fn finalize(&self, record_id: &str, response: &FhirResponse) -> Result<()> {
        let outcome = if response.success {
            TransactionOutcome::completed_with(json!({ "statusCode": response.status_code }))
        } else {
            TransactionOutcome::failed_with(
                response.error.clone().unwrap_or_default(),
                json!({ "statusCode": response.status_code }),
            )
        };
        self.ledger.complete(record_id, outcome).await?;
        Ok(())
    }
}

fn operation_label(operation: FhirOperation) -> &'static str {
    match operation {
        FhirOperation::Read => "read",
        FhirOperation::Search => "search",
        FhirOperation::Create => "create",
        FhirOperation::Update => "update",
        FhirOperation::Delete => "delete",
        FhirOperation::Batch => "batch",
    }
}

fn build_url(base: &str, request: &FhirRequest) -> String {
    let mut url = format!("{}/{}", base, request.resource_type);
    if let Some(id) = &request.resource_id {
        url.push('/');
        url.push_str(id);
    }
    url.push_str(&query_string(&request.parameters));
    url
}

fn query_string(parameters: &[(String, String)]) -> String {
    if parameters.is_empty() {
        return String::new();
    }
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(parameters.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish();
    format!("?{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryEndpointStore;
    use hie_ledger::{LedgerStore, MemoryLedger, TransactionStatus};

    fn proxy() -> (FhirProxy, Arc<MemoryLedger>) {
        let ledger_store = Arc::new(MemoryLedger::default());
        let proxy = FhirProxy::new(
            reqwest::Client::new(),
            Arc::new(MemoryEndpointStore::default()),
            Ledger::new(ledger_store.clone()),
        );
        (proxy, ledger_store)
    }

    fn active_endpoint(id: &str, url: &str) -> FhirEndpointConfig {
        FhirEndpointConfig {
            id: id.to_string(),
            name: id.to_string(),
            url: url.to_string(),
            fhir_version: "4.0.1".into(),
            auth_type: AuthType::None,
            token_endpoint: None,
            client_id: None,
            client_secret: None,
            scopes: vec![],
            organization_name: None,
            organization_npi: None,
            status: EndpointStatus::Active,
            health_status: HealthStatus::Unknown,
            last_health_check: None,
            capability_statement: None,
            supported_resources: vec!["Patient".into()],
            registered_at: Utc::now(),
        }
    }

    /// Binds an ephemeral port and answers the first request with a
    /// single-entry searchset.
    async fn serve_one_bundle() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let body = json!({
                    "resourceType": "Bundle",
                    "type": "searchset",
                    "total": 1,
                    "entry": [{ "resource": { "resourceType": "Patient", "id": "p1" } }],
                })
                .to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/fhir+json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn url_building() {
        let request = FhirRequest {
            resource_type: "Patient".into(),
            operation: FhirOperation::Search,
            resource_id: None,
            parameters: vec![
                ("family".into(), "Doe".into()),
                ("birthdate".into(), "1980-01-01".into()),
            ],
            body: None,
            endpoint_id: None,
        };
        assert_eq!(
            build_url("https://fhir.example.org", &request),
            "https://fhir.example.org/Patient?family=Doe&birthdate=1980-01-01"
        );

        let read = FhirRequest {
            resource_type: "Patient".into(),
            operation: FhirOperation::Read,
            resource_id: Some("p1".into()),
            parameters: vec![],
            body: None,
            endpoint_id: None,
        };
        assert_eq!(
            build_url("https://fhir.example.org", &read),
            "https://fhir.example.org/Patient/p1"
        );
    }

    #[tokio::test]
    async fn unknown_endpoint_is_an_error() {
        let (proxy, _) = proxy();
        let request = FhirRequest {
            resource_type: "Patient".into(),
            operation: FhirOperation::Read,
            resource_id: Some("p1".into()),
            parameters: vec![],
            body: None,
            endpoint_id: Some("ghost".into()),
        };
        let err = proxy.route_request(&request, None).await.unwrap_err();
        assert!(matches!(err, FhirProxyError::EndpointNotFound(_)));
    }

    #[tokio::test]
    async fn no_default_endpoint_is_an_error() {
        let (proxy, _) = proxy();
        let request = FhirRequest {
            resource_type: "Patient".into(),
            operation: FhirOperation::Read,
            resource_id: Some("p1".into()),
            parameters: vec![],
            body: None,
            endpoint_id: None,
        };
        let err = proxy.route_request(&request, None).await.unwrap_err();
        assert!(matches!(err, FhirProxyError::NoDefaultEndpoint));
    }

    #[tokio::test]
    async fn search_with_zero_endpoints_is_an_empty_success() {
        let (proxy, ledger_store) = proxy();
        let response = proxy
            .search_across_endpoints("Patient", &[], None)
            .await
            .unwrap();

        assert!(response.success);
        let bundle = response.data.unwrap();
        assert_eq!(bundle["type"], "searchset");
        assert_eq!(bundle["total"], 0);

        let records = ledger_store.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, TransactionStatus::Completed);
        assert_eq!(records[0].operation, "search-all");
    }

    #[tokio::test]
    async fn fan_out_carries_partner_failures_alongside_results() {
        let ledger_store = Arc::new(MemoryLedger::default());
        let store = Arc::new(MemoryEndpointStore::default());
        let good_url = serve_one_bundle().await;
        store.insert(active_endpoint("good", &good_url)).await;
        // Port 9 refuses connections, so this partner always fails.
        store
            .insert(active_endpoint("down", "http://127.0.0.1:9"))
            .await;

        let proxy = FhirProxy::new(reqwest::Client::new(), store, Ledger::new(ledger_store))
            .with_fanout_timeout(Duration::from_secs(5));

        let response = proxy
            .search_across_endpoints("Patient", &[], None)
            .await
            .unwrap();

        // One live partner is enough for an overall success.
        assert!(response.success);
        let bundle = response.data.unwrap();
        assert_eq!(bundle["total"], 1);
        assert_eq!(bundle["entry"][0]["_source"], json!(good_url));

        let errors = bundle["_errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].as_str().unwrap().contains("down"));
    }
}
