use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use axum::body::Bytes;
use dashmap::DashMap;
use tower_http::trace::TraceLayer;
use zeroize::Zeroizing;

use crate::guard::IntegrationGuard;

pub mod handlers;

/// Lookup of stored (possibly encrypted) access tokens by shop domain.
/// Backed by the application's database in production.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn stored_token(&self, shop: &str) -> anyhow::Result<Option<String>>;
}

/// In-memory credential source for local runs and tests.
#[derive(Default)]
pub struct MemoryCredentials {
    tokens: DashMap<String, String>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeded from `(shop, stored_token)` pairs, e.g. `Config::shop_tokens`.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            tokens: pairs.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn insert(&self, shop: &str, stored_token: String) {
        self.tokens.insert(shop.to_string(), stored_token);
    }
}

#[async_trait]
impl CredentialSource for MemoryCredentials {
    async fn stored_token(&self, shop: &str) -> anyhow::Result<Option<String>> {
        Ok(self.tokens.get(shop).map(|t| t.clone()))
    }
}

/// A webhook that passed rate limiting and signature verification, with the
/// shop's access token already decrypted for follow-up partner API calls.
pub struct VerifiedWebhook {
    pub shop: String,
    pub topic: String,
    pub access_token: Zeroizing<String>,
    pub body: Bytes,
}

impl std::fmt::Debug for VerifiedWebhook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedWebhook")
            .field("shop", &self.shop)
            .field("topic", &self.topic)
            .field("access_token", &"[REDACTED]")
            .field("bytes", &self.body.len())
            .finish()
    }
}

/// Downstream consumer of verified webhooks (order sync, inventory updates).
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn deliver(&self, webhook: VerifiedWebhook) -> anyhow::Result<()>;
}

/// Default sink: records the delivery in the log and drops it.
pub struct LogSink;

#[async_trait]
impl WebhookSink for LogSink {
    async fn deliver(&self, webhook: VerifiedWebhook) -> anyhow::Result<()> {
        tracing::info!(
            shop = %webhook.shop,
            topic = %webhook.topic,
            bytes = webhook.body.len(),
            "webhook delivered"
        );
        Ok(())
    }
}

/// Shared state passed to handlers.
pub struct AppState {
    pub guard: IntegrationGuard,
    pub credentials: Arc<dyn CredentialSource>,
    pub sink: Arc<dyn WebhookSink>,
}

/// Partner-facing routes plus health endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(handlers::readiness))
        .route("/webhooks", post(handlers::receive_webhook))
        .route("/auth/callback", get(handlers::oauth_callback))
        .fallback(fallback_404)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware))
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Middleware: injects a unique X-Request-Id into every response.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}
