//! Per-request transaction context.
//!
//! Every non-health response carries `X-Transaction-ID` (assigned here) and
//! `X-Correlation-ID` (the caller's, echoed, or the transaction id when the
//! caller sent none), so failures can be cross-referenced against the
//! ledger.

use std::time::Instant;

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use uuid::Uuid;

pub async fn transaction_context(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let client_correlation = req
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let transaction_id = Uuid::new_v4().to_string();

    tracing::debug!(
        method = %method,
        path = %path,
        transaction_id = %transaction_id,
        "incoming request"
    );

    let mut response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        transaction_id = %transaction_id,
        "request completed"
    );

    if path == "/health" {
        return response;
    }

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&transaction_id) {
        headers.insert("x-transaction-id", value);
    }
    let correlation = client_correlation.unwrap_or_else(|| transaction_id.clone());
    if let Ok(value) = HeaderValue::from_str(&correlation) {
        headers.insert("x-correlation-id", value);
    }

    response
}
