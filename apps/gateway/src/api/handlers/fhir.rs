//! FHIR federation proxy handlers. Upstream outcomes pass through as a
//! [`FhirResponse`] envelope with the upstream status code; only
//! gateway-side problems become error responses.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use hie_fhir_proxy::{
    FhirEndpointConfig, FhirOperation, FhirProxyError, FhirRequest, FhirResponse, RegisterEndpoint,
};

use crate::error::Result;
use crate::state::AppState;

/// Reserved query parameter naming a registered endpoint; everything else
/// passes through as a FHIR search parameter.
const ENDPOINT_PARAM: &str = "_endpoint";

fn proxy_response(response: FhirResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(response)).into_response()
}

fn split_endpoint(params: Vec<(String, String)>) -> (Option<String>, Vec<(String, String)>) {
    let mut endpoint_id = None;
    let mut rest = Vec::with_capacity(params.len());
    for (key, value) in params {
        if key == ENDPOINT_PARAM {
            endpoint_id = Some(value);
        } else {
            rest.push((key, value));
        }
    }
    (endpoint_id, rest)
}

pub async fn read(
    State(state): State<Arc<AppState>>,
    Path((resource_type, id)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response> {
    let (endpoint_id, _) = split_endpoint(params);
    let request = FhirRequest {
        resource_type,
        operation: FhirOperation::Read,
        resource_id: Some(id),
        parameters: Vec::new(),
        body: None,
        endpoint_id,
    };
    let response = state.fhir.route_request(&request, None).await?;
    Ok(proxy_response(response))
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Path(resource_type): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response> {
    let (endpoint_id, parameters) = split_endpoint(params);
    let request = FhirRequest {
        resource_type,
        operation: FhirOperation::Search,
        resource_id: None,
        parameters,
        body: None,
        endpoint_id,
    };
    let response = state.fhir.route_request(&request, None).await?;
    Ok(proxy_response(response))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Path(resource_type): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    Json(body): Json<JsonValue>,
) -> Result<Response> {
    let (endpoint_id, _) = split_endpoint(params);
    let request = FhirRequest {
        resource_type,
        operation: FhirOperation::Create,
        resource_id: None,
        parameters: Vec::new(),
        body: Some(body),
        endpoint_id,
    };
    let response = state.fhir.route_request(&request, None).await?;
    Ok(proxy_response(response))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path((resource_type, id)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
    Json(body): Json<JsonValue>,
) -> Result<Response> {
    let (endpoint_id, _) = split_endpoint(params);
    let request = FhirRequest {
        resource_type,
        operation: FhirOperation::Update,
        resource_id: Some(id),
        parameters: Vec::new(),
        body: Some(body),
        endpoint_id,
    };
    let response = state.fhir.route_request(&request, None).await?;
    Ok(proxy_response(response))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path((resource_type, id)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response> {
    let (endpoint_id, _) = split_endpoint(params);
    let request = FhirRequest {
        resource_type,
        operation: FhirOperation::Delete,
        resource_id: Some(id),
        parameters: Vec::new(),
        body: None,
        endpoint_id,
    };
    let response = state.fhir.route_request(&request, None).await?;
    Ok(proxy_response(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAllRequest {
    pub resource_type: String,
    #[serde(default)]
    pub parameters: Vec<(String, String)>,
    #[serde(default)]
    pub endpoint_ids: Option<Vec<String>>,
}

pub async fn search_all(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchAllRequest>,
) -> Result<Response> {
    let response = state
        .fhir
        .search_across_endpoints(
            &request.resource_type,
            &request.parameters,
            request.endpoint_ids.as_deref(),
        )
        .await?;
    Ok(proxy_response(response))
}

#[derive(Debug, Deserialize)]
pub struct EndpointParams {
    #[serde(rename = "_endpoint")]
    pub endpoint: Option<String>,
}

async fn resolve_endpoint_id(
    state: &AppState,
    requested: Option<String>,
) -> Result<String> {
    if let Some(id) = requested {
        return Ok(id);
    }
    state
        .fhir
        .endpoints()
        .first_active()
        .await
        .map(|endpoint| endpoint.id)
        .ok_or_else(|| FhirProxyError::NoDefaultEndpoint.into())
}

pub async fn batch(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EndpointParams>,
    Json(bundle): Json<JsonValue>,
) -> Result<Response> {
    let endpoint_id = resolve_endpoint_id(&state, params.endpoint).await?;
    let response = state.fhir.execute_batch(&bundle, &endpoint_id).await?;
    Ok(proxy_response(response))
}

pub async fn metadata(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EndpointParams>,
) -> Result<Response> {
    let endpoint_id = resolve_endpoint_id(&state, params.endpoint).await?;
    let response = state.fhir.get_capability_statement(&endpoint_id).await?;
    Ok(proxy_response(response))
}

pub async fn register_endpoint(
    State(state): State<Arc<AppState>>,
    Json(input): Json<RegisterEndpoint>,
) -> Result<(StatusCode, Json<FhirEndpointConfig>)> {
    let endpoint = state.fhir.register_endpoint(input).await?;
    Ok((StatusCode::CREATED, Json(endpoint)))
}

pub async fn list_endpoints(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<FhirEndpointConfig>> {
    Json(state.fhir.endpoints().list().await)
}
