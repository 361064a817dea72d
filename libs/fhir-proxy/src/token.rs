//! OAuth2 client-credentials token cache.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::error::FhirProxyError;
use crate::types::FhirEndpointConfig;
use crate::Result;

/// Seconds subtracted from `expires_in` so a token is never used right at
/// its expiry boundary.
const EXPIRY_SAFETY_WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

/// Per-endpoint token cache. Reads are concurrent; a refresh for one
/// endpoint is single-flight, so concurrent callers coalesce on one
/// token request.
#[derive(Default)]
pub struct TokenCache {
    tokens: RwLock<HashMap<String, CachedToken>>,
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TokenCache {
    pub async fn bearer_token(
        &self,
        client: &reqwest::Client,
        endpoint: &FhirEndpointConfig,
    ) -> Result<String> {
        if let Some(token) = self.cached(&endpoint.id).await {
            return Ok(token);
        }

        let lock = self.refresh_lock(&endpoint.id).await;
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(token) = self.cached(&endpoint.id).await {
            return Ok(token);
        }

        let token_endpoint = endpoint
            .token_endpoint
            .as_deref()
            .ok_or_else(|| FhirProxyError::Token("endpoint has no token URL".into()))?;
        let client_id = endpoint
            .client_id
            .as_deref()
            .ok_or_else(|| FhirProxyError::Token("endpoint has no client id".into()))?;

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", endpoint.client_secret.as_deref().unwrap_or("")),
            ("scope", &endpoint.scopes.join(" ")),
        ];
        let response: TokenResponse = client
            .post(token_endpoint)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let expires_in = response.expires_in.unwrap_or(3600);
        self.store(&endpoint.id, &response.access_token, expires_in)
            .await;
        tracing::debug!(endpoint_id = %endpoint.id, expires_in, "access token refreshed");
        Ok(response.access_token)
    }

    pub async fn cached(&self, endpoint_id: &str) -> Option<String> {
        let tokens = self.tokens.read().await;
        tokens
            .get(endpoint_id)
            .filter(|t| t.expires_at > Utc::now())
            .map(|t| t.token.clone())
    }

    pub async fn store(&self, endpoint_id: &str, token: &str, expires_in: i64) {
        let expires_at = Utc::now() + Duration::seconds(expires_in - EXPIRY_SAFETY_WINDOW_SECS);
        self.tokens.write().await.insert(
            endpoint_id.to_string(),
            CachedToken {
                token: token.to_string(),
                expires_at,
            },
        );
    }

    pub async fn invalidate(&self, endpoint_id: &str) {
        self.tokens.write().await.remove(endpoint_id);
    }

    async fn refresh_lock(&self, endpoint_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry(endpoint_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuthType, EndpointStatus, HealthStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn oauth_endpoint(token_url: &str) -> FhirEndpointConfig {
        FhirEndpointConfig {
            id: "ep-1".into(),
            name: "ep-1".into(),
            url: "http://fhir.example.org".into(),
            fhir_version: "4.0.1".into(),
            auth_type: AuthType::Oauth2,
            token_endpoint: Some(token_url.to_string()),
            client_id: Some("client-1".into()),
            client_secret: Some("secret".into()),
            scopes: vec!["system/*.read".into()],
            organization_name: None,
            organization_npi: None,
            status: EndpointStatus::Active,
            health_status: HealthStatus::Unknown,
            last_health_check: None,
            capability_statement: None,
            supported_resources: vec![],
            registered_at: Utc::now(),
        }
    }

    fn request_complete(buf: &[u8]) -> bool {
        let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
        let length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        buf.len() >= pos + 4 + length
    }

    /// Token endpoint stub that counts how many grants it issued.
    async fn serve_tokens(hits: Arc<AtomicUsize>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let hits = Arc::clone(&hits);
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !request_complete(&buf) {
                        match stream.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    hits.fetch_add(1, Ordering::SeqCst);
                    let body = r#"{"access_token":"tok-1","expires_in":3600}"#;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let hits = Arc::new(AtomicUsize::new(0));
        let token_url = serve_tokens(Arc::clone(&hits)).await;
        let cache = TokenCache::default();
        let client = reqwest::Client::new();
        let endpoint = oauth_endpoint(&token_url);

        let (a, b) = tokio::join!(
            cache.bearer_token(&client, &endpoint),
            cache.bearer_token(&client, &endpoint),
        );

        assert_eq!(a.unwrap(), "tok-1");
        assert_eq!(b.unwrap(), "tok-1");
        // Both callers coalesced on a single grant.
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_token_respects_safety_window() {
        let cache = TokenCache::default();
        cache.store("ep-1", "tok", 3600).await;
        assert_eq!(cache.cached("ep-1").await.as_deref(), Some("tok"));

        // An expires_in at or below the safety window is already stale.
        cache.store("ep-2", "tok2", 60).await;
        assert!(cache.cached("ep-2").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_drops_the_token() {
        let cache = TokenCache::default();
        cache.store("ep-1", "tok", 3600).await;
        cache.invalidate("ep-1").await;
        assert!(cache.cached("ep-1").await.is_none());
    }

    #[tokio::test]
    async fn refresh_lock_is_shared_per_endpoint() {
        let cache = TokenCache::default();
        let a = cache.refresh_lock("ep-1").await;
        let b = cache.refresh_lock("ep-1").await;
        assert!(Arc::ptr_eq(&a, &b));
        let c = cache.refresh_lock("ep-2").await;
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
