use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value as JsonValue};

use crate::state::AppState;

pub async fn health() -> Json<JsonValue> {
    Json(json!({ "status": "ok" }))
}

pub async fn info(State(state): State<Arc<AppState>>) -> Json<JsonValue> {
    Json(json!({
        "name": "hie-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "protocols": {
            "fhir": "/fhir",
            "x12": "/x12",
            "ccda": "/ccda",
            "direct": "/direct",
            "networks": ["/tefca", "/carequality", "/commonwell"],
            "transactions": "/transactions",
        },
        "insecureBootstrap": state.config.direct.insecure_bootstrap,
    }))
}
