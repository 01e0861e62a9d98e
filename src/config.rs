use std::fmt;
use std::time::Duration;

pub struct Config {
    pub port: u16,
    /// 64 hex chars (32 bytes). Absent or malformed leaves the vault unconfigured.
    pub encryption_key: Option<String>,
    pub redis_url: Option<String>,
    pub redis_token: Option<String>,
    /// Deadline for a single distributed counter call.
    /// Set via RATE_LIMIT_REDIS_TIMEOUT_MS. Default: 500.
    pub redis_timeout: Duration,
    /// Secret used by the partner to sign webhook bodies (base64 HMAC).
    pub webhook_secret: Option<String>,
    /// App secret used by the partner to sign OAuth callbacks (hex HMAC).
    pub api_secret: Option<String>,
    /// Stored (encrypted or legacy) access tokens per shop for the in-memory
    /// credential source, from PARTNER_SHOP_TOKENS as `shop=stored,shop=stored`.
    /// Stand-in for the application database on local runs.
    pub shop_tokens: Vec<(String, String)>,
    pub production: bool,
}

impl Config {
    /// Distributed rate limiting needs both an endpoint and a credential.
    /// Presence only; no connection is attempted here.
    pub fn distributed_enabled(&self) -> bool {
        matches!(
            (self.redis_url.as_deref(), self.redis_token.as_deref()),
            (Some(url), Some(token)) if !url.is_empty() && !token.is_empty()
        )
    }
}

// SECURITY: secret material never reaches Debug output (and therefore never reaches logs)
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "<set>"))
            .field("redis_url", &self.redis_url.as_ref().map(|_| "<set>"))
            .field("redis_token", &self.redis_token.as_ref().map(|_| "<set>"))
            .field("redis_timeout", &self.redis_timeout)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<set>"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<set>"))
            .field("shop_tokens", &self.shop_tokens.len())
            .field("production", &self.production)
            .finish()
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|name| std::env::var(name).ok())
}

/// Builds a config from an arbitrary variable lookup so tests never touch the
/// process environment.
pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| {
        lookup(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let production = lookup("GUARD_ENV").as_deref() == Some("production");
    let encryption_key = non_empty("ENCRYPTION_KEY");

    let key_ok = encryption_key
        .as_deref()
        .is_some_and(|k| crate::vault::cipher::parse_key(k).is_ok());
    if !key_ok && production {
        anyhow::bail!(
            "ENCRYPTION_KEY must be set to 64 hex chars (32 bytes) when GUARD_ENV=production"
        );
    }

    Ok(Config {
        port: lookup("GUARD_PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080),
        encryption_key,
        redis_url: non_empty("RATE_LIMIT_REDIS_URL"),
        redis_token: non_empty("RATE_LIMIT_REDIS_TOKEN"),
        redis_timeout: Duration::from_millis(
            lookup("RATE_LIMIT_REDIS_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
        ),
        webhook_secret: non_empty("PARTNER_WEBHOOK_SECRET"),
        api_secret: non_empty("PARTNER_API_SECRET"),
        shop_tokens: non_empty("PARTNER_SHOP_TOKENS")
            .map(|raw| parse_shop_tokens(&raw))
            .transpose()?
            .unwrap_or_default(),
        production,
    })
}

fn parse_shop_tokens(raw: &str) -> anyhow::Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((shop, stored)) if !shop.trim().is_empty() && !stored.trim().is_empty() => {
                Ok((shop.trim().to_string(), stored.trim().to_string()))
            }
            // the entry may hold a plaintext token, so only the shop part is echoed
            _ => anyhow::bail!(
                "PARTNER_SHOP_TOKENS entry for '{}' must be shop=stored_token",
                entry.split('=').next().unwrap_or_default()
            ),
        })
        .collect()
}
