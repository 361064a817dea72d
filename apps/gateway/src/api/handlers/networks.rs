//! Cross-network federation handlers, shared by the TEFCA, Carequality and
//! CommonWell mounts. The concrete network arrives as an extension from
//! the router.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;

use hie_netquery::{
    DirectoryFilters, Network, NetqueryError, NetworkParticipant, NetworkQuery, NetworkResponse,
    QueryType, RegisterParticipant,
};

use crate::error::{ApiError, Result};
use crate::state::AppState;

pub async fn query(
    State(state): State<Arc<AppState>>,
    Extension(network): Extension<Network>,
    Json(request): Json<NetworkQuery>,
) -> Result<Json<NetworkResponse>> {
    let response = state.networks.query(network, &request).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct DirectoryParams {
    pub name: Option<String>,
    pub capability: Option<QueryType>,
}

pub async fn directory(
    State(state): State<Arc<AppState>>,
    Extension(network): Extension<Network>,
    Query(params): Query<DirectoryParams>,
) -> Json<Vec<NetworkParticipant>> {
    let filters = DirectoryFilters {
        name: params.name,
        capabilities: params.capability.into_iter().collect(),
    };
    Json(state.networks.search_directory(network, &filters).await)
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Extension(network): Extension<Network>,
    Json(mut request): Json<RegisterParticipant>,
) -> Result<(StatusCode, Json<NetworkParticipant>)> {
    // The mount point owns the network; a mismatching body value is
    // overridden rather than rejected.
    request.network = network;
    let participant = state.networks.register_participant(request).await?;
    Ok((StatusCode::CREATED, Json(participant)))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(network): Extension<Network>,
) -> Json<Vec<NetworkParticipant>> {
    Json(state.networks.list_participants(network).await)
}

pub async fn status(
    State(state): State<Arc<AppState>>,
    Extension(network): Extension<Network>,
    Path(participant_id): Path<String>,
) -> Result<Json<NetworkParticipant>> {
    state
        .networks
        .participant_status(network, &participant_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::Netquery(NetqueryError::ParticipantNotFound(participant_id)))
}
