use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use hie_ledger::TransactionRecord;

use crate::error::{ApiError, Result};
use crate::state::AppState;

pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<TransactionRecord>> {
    Json(state.ledger_store.all().await)
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TransactionRecord>> {
    state
        .ledger_store
        .get(&id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound(format!("transaction {id}")))
}
