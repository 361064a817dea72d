//! X12 EDI handlers. Inbound processing answers 200 even for rejected
//! interchanges; the negative 999 rides in the body. Only unreadable
//! content is a 400.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use hie_x12::validate::validate;
use hie_x12::{
    interpret, parse, InterchangeEnvelope, InterpretedTransaction, OutboundData, OutboundKind,
    TradingPartner, TransactionSetKind, X12ProcessingResult, X12Transaction,
};

use crate::error::{ApiError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InboundParams {
    pub partner: Option<String>,
}

pub async fn inbound(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InboundParams>,
    body: String,
) -> Result<Json<X12ProcessingResult>> {
    let result = state
        .x12
        .process_inbound(&body, params.partner.as_deref())
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResponse {
    pub kind: Option<TransactionSetKind>,
    pub envelope: InterchangeEnvelope,
    pub segment_count: usize,
    pub validation_errors: Vec<String>,
    pub interpretation: InterpretedTransaction,
}

pub async fn parse_interchange(body: String) -> Result<Json<ParseResponse>> {
    let parsed = parse(&body).map_err(ApiError::X12)?;
    let validation_errors = validate(&parsed);
    let interpretation = interpret(&parsed);
    Ok(Json(ParseResponse {
        kind: parsed.kind,
        segment_count: parsed.segments.len(),
        validation_errors,
        interpretation,
        envelope: parsed.envelope,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    pub kind: String,
    pub partner_id: String,
    #[serde(default)]
    pub data: OutboundData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateShortcutBody {
    pub partner_id: String,
    #[serde(default)]
    pub data: OutboundData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub interchange: String,
    pub ledger_id: String,
}

async fn generate_outbound(
    state: &AppState,
    kind: OutboundKind,
    data: &OutboundData,
    partner_id: &str,
) -> Result<Json<GenerateResponse>> {
    let (interchange, ledger_id) = state.x12.generate_outbound(kind, data, partner_id).await?;
    Ok(Json(GenerateResponse {
        interchange,
        ledger_id,
    }))
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<GenerateResponse>> {
    let kind = OutboundKind::from_canonical_name(&body.kind)
        .ok_or_else(|| ApiError::BadRequest(format!("unsupported outbound kind: {}", body.kind)))?;
    generate_outbound(&state, kind, &body.data, &body.partner_id).await
}

pub async fn generate_270(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateShortcutBody>,
) -> Result<Json<GenerateResponse>> {
    generate_outbound(&state, OutboundKind::Eligibility270, &body.data, &body.partner_id).await
}

pub async fn generate_276(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateShortcutBody>,
) -> Result<Json<GenerateResponse>> {
    generate_outbound(
        &state,
        OutboundKind::ClaimStatusInquiry276,
        &body.data,
        &body.partner_id,
    )
    .await
}

pub async fn generate_278(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateShortcutBody>,
) -> Result<Json<GenerateResponse>> {
    generate_outbound(
        &state,
        OutboundKind::PriorAuthRequest278,
        &body.data,
        &body.partner_id,
    )
    .await
}

pub async fn generate_837(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateShortcutBody>,
) -> Result<Json<GenerateResponse>> {
    generate_outbound(
        &state,
        OutboundKind::ProfessionalClaim837,
        &body.data,
        &body.partner_id,
    )
    .await
}

pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<X12Transaction>> {
    Json(state.x12.list_transactions().await)
}

pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<X12Transaction>> {
    state
        .x12
        .get_transaction(&id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound(format!("X12 transaction {id}")))
}

pub async fn upsert_partner(
    State(state): State<Arc<AppState>>,
    Json(partner): Json<TradingPartner>,
) -> Result<(StatusCode, Json<TradingPartner>)> {
    state.x12_partners.upsert(partner.clone()).await?;
    Ok((StatusCode::CREATED, Json(partner)))
}

pub async fn list_partners(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TradingPartner>>> {
    Ok(Json(state.x12_partners.list().await?))
}
