//! Direct secure messaging handlers. Send and receive answer 200 with the
//! operation result; recipient-level delivery failures ride in the result
//! body rather than failing the request.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use hie_direct::{
    ActivateAddressRequest, CertificateLookup, DirectAddress, ReceiveResult,
    RegisterAddressRequest, SendMessageRequest, SendResult,
};

use crate::error::{ApiError, Result};
use crate::state::AppState;

pub async fn send(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<SendResult>> {
    let result = state.direct.send_message(&request).await?;
    Ok(Json(result))
}

/// Body is the wrapped S/MIME entity as delivered by the transport.
pub async fn receive(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<ReceiveResult>> {
    let result = state.direct.receive_message(&body).await?;
    Ok(Json(result))
}

pub async fn register_address(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterAddressRequest>,
) -> Result<(StatusCode, Json<DirectAddress>)> {
    let address = state.direct.register_address(&request).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

pub async fn activate_address(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Json(request): Json<ActivateAddressRequest>,
) -> Result<Json<DirectAddress>> {
    let address = state.direct.activate_address(&address, &request).await?;
    Ok(Json(address))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub owner: Option<String>,
}

pub async fn list_addresses(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<DirectAddress>>> {
    let owner = params
        .owner
        .ok_or_else(|| ApiError::BadRequest("owner query parameter is required".to_string()))?;
    Ok(Json(state.direct.list_addresses(&owner).await))
}

pub async fn get_address(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<DirectAddress>> {
    Ok(Json(state.direct.get_address(&address).await?))
}

pub async fn lookup_certificate(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Json<CertificateLookup> {
    Json(state.direct.lookup_certificate(&address).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTrustRequest {
    pub certificate: String,
}

pub async fn validate_trust(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ValidateTrustRequest>,
) -> Json<JsonValue> {
    let trusted = state.direct.validate_trust_chain(&request.certificate);
    Json(json!({ "trusted": trusted }))
}
