//! Shared harness for gateway integration tests: an in-memory app plus a
//! oneshot request helper.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use hie_gateway::api::create_router;
use hie_gateway::config::{Config, DirectConfig, HttpConfig, LoggingConfig, ServerConfig};
use hie_gateway::state::AppState;

pub struct TestApp {
    router: Router,
    pub state: Arc<AppState>,
}

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        },
        logging: LoggingConfig {
            level: "warn".to_string(),
            format: "text".to_string(),
        },
        http: HttpConfig {
            timeout_secs: 5,
            fanout_timeout_secs: 5,
        },
        direct: DirectConfig {
            insecure_bootstrap: true,
            trust_anchor_files: None,
        },
        commonwell: None,
    }
}

impl TestApp {
    pub fn new() -> Self {
        let state = AppState::new(test_config()).expect("state");
        let router = create_router(Arc::clone(&state));
        Self { router, state }
    }

    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, json) = self.request_full(method, path, body).await;
        (status, json)
    }

    pub async fn request_full(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).expect("request")).await
    }

    /// Raw (non-JSON) body, e.g. EDI text or XML.
    pub async fn request_raw(
        &self,
        method: &str,
        path: &str,
        content_type: &str,
        body: String,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", content_type)
            .body(Body::from(body))
            .expect("request");
        let (status, _, json) = self.send(request).await;
        (status, json)
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("response");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, json)
    }
}
