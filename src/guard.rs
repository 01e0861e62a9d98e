//! Request-path composition: rate limit, then verify, then decrypt.

use axum::http::HeaderMap;
use zeroize::Zeroizing;

use crate::config::Config;
use crate::errors::AppError;
use crate::middleware::rate_limit::{RateLimitResult, RateLimiter};
use crate::middleware::signature;
use crate::store;
use crate::vault::CredentialVault;

pub const HMAC_HEADER: &str = "x-shopify-hmac-sha256";
pub const SHOP_HEADER: &str = "x-shopify-shop-domain";
pub const TOPIC_HEADER: &str = "x-shopify-topic";

pub struct IntegrationGuard {
    vault: CredentialVault,
    limiter: RateLimiter,
    webhook_secret: Option<String>,
    api_secret: Option<String>,
}

impl IntegrationGuard {
    pub fn new(
        vault: CredentialVault,
        limiter: RateLimiter,
        webhook_secret: Option<String>,
        api_secret: Option<String>,
    ) -> Self {
        Self {
            vault,
            limiter,
            webhook_secret,
            api_secret,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            CredentialVault::new(cfg.encryption_key.as_deref()),
            RateLimiter::new(store::from_config(cfg)),
            cfg.webhook_secret.clone(),
            cfg.api_secret.clone(),
        )
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Rate limit by client, check the body signature against the raw bytes,
    /// then decrypt the shop's stored access token.
    ///
    /// `stored_token` is `None` for a shop with no installation; the webhook is
    /// still authenticated and `Ok(None)` is returned. A token that fails to
    /// decrypt is an internal error, reported only after the signature passed.
    pub async fn admit_webhook(
        &self,
        headers: &HeaderMap,
        raw_body: &[u8],
        stored_token: Option<&str>,
    ) -> Result<Option<Zeroizing<String>>, AppError> {
        enforce(self.limiter.check_webhook_rate_limit(headers).await)?;

        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or_else(|| AppError::Configuration("webhook secret not configured".into()))?;
        let received = headers
            .get(HMAC_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        if !signature::verify_webhook_signature(raw_body, received, secret)? {
            tracing::warn!(route = "webhook", "webhook signature mismatch");
            return Err(AppError::Unauthorized);
        }

        stored_token.map(|stored| self.access_token(stored)).transpose()
    }

    pub async fn admit_oauth_callback(
        &self,
        headers: &HeaderMap,
        params: &[(String, String)],
    ) -> Result<(), AppError> {
        enforce(self.limiter.check_oauth_rate_limit(headers).await)?;

        let secret = self
            .api_secret
            .as_deref()
            .ok_or_else(|| AppError::Configuration("api secret not configured".into()))?;
        let received = params
            .iter()
            .find(|(k, _)| k == signature::OAUTH_HMAC_PARAM)
            .map(|(_, v)| v.as_str())
            .ok_or(AppError::Unauthorized)?;

        if !signature::verify_oauth_callback(params, secret, received)? {
            tracing::warn!(route = "oauth_callback", "oauth callback hmac mismatch");
            return Err(AppError::Unauthorized);
        }
        Ok(())
    }

    /// Gate for outbound partner API calls; the caller owns retry policy.
    pub async fn admit_outbound(&self, integration_id: &str) -> Result<(), AppError> {
        enforce(self.limiter.check_partner_api_rate_limit(integration_id).await)
    }

    /// Plaintext access token from its stored form (encrypted or legacy).
    pub fn access_token(&self, stored: &str) -> Result<Zeroizing<String>, AppError> {
        Ok(Zeroizing::new(self.vault.decrypt(stored)?))
    }
}

fn enforce(result: RateLimitResult) -> Result<(), AppError> {
    if result.success {
        Ok(())
    } else {
        Err(AppError::RateLimited {
            reset_in: result.reset_in,
        })
    }
}
