//! C-CDA handlers. Parse, validate, generate and to-FHIR take the raw XML
//! body; validation always answers 200 with a report rather than an error.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value as JsonValue;

use hie_ccda::{
    parse, to_fhir, CcdaDocument, CcdaError, DocumentQuery, GenerateRequest, StoredDocument,
    ValidationReport,
};
use serde::Deserialize;

use crate::error::{ApiError, Result};
use crate::state::AppState;

pub async fn parse_document(body: String) -> Result<Json<CcdaDocument>> {
    let document = parse(&body).map_err(ApiError::Ccda)?;
    Ok(Json(document))
}

pub async fn validate_document(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Json<ValidationReport> {
    Json(state.ccda.validate_document(&body))
}

pub async fn generate_document(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<StoredDocument>)> {
    let stored = state.ccda.generate_document(&request).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

#[derive(Debug, Deserialize)]
pub struct StoreParams {
    pub source: Option<String>,
}

pub async fn store_document(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StoreParams>,
    body: String,
) -> Result<(StatusCode, Json<StoredDocument>)> {
    let stored = state
        .ccda
        .store_document(&body, params.source.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn to_fhir_bundle(body: String) -> Result<Json<JsonValue>> {
    let document = parse(&body).map_err(ApiError::Ccda)?;
    Ok(Json(to_fhir(&document)))
}

pub async fn query_documents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DocumentQuery>,
) -> Json<Vec<StoredDocument>> {
    Json(state.ccda.query(&params).await)
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
) -> Result<Json<StoredDocument>> {
    state
        .ccda
        .retrieve(&document_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::Ccda(CcdaError::NotFound(document_id)))
}
