//! Fixed-window counter stores backing the rate limiter.
//!
//! Two interchangeable backends: Redis (shared across gateway processes) and
//! an in-process map. The backend is chosen once at startup from
//! configuration presence by [`from_config`].

pub mod clock;
pub mod memory;
pub mod redis_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::errors::StoreError;

pub use memory::MemoryCounterStore;
pub use redis_store::RedisCounterStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Distributed,
    InProcess,
}

/// Counter state after one hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    /// Hits in the current window, including this one.
    pub count: u64,
    /// Time until the window rolls over. Always > 0 and <= the window.
    pub reset_in: Duration,
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically count one hit against `key` in a fixed window of `window`.
    /// Opens a new window when none is active.
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, StoreError>;

    fn backend(&self) -> Backend;
}

pub fn from_config(cfg: &Config) -> Arc<dyn CounterStore> {
    match (cfg.redis_url.as_deref(), cfg.redis_token.as_deref()) {
        (Some(url), Some(token)) if cfg.distributed_enabled() => {
            match RedisCounterStore::new(url, token, cfg.redis_timeout) {
                Ok(store) => {
                    tracing::info!("rate limiter: distributed counter store enabled");
                    return Arc::new(store);
                }
                Err(e) => {
                    tracing::error!(
                        "rate limiter: invalid distributed store URL, using in-process counters: {}",
                        e
                    );
                }
            }
        }
        _ => tracing::info!("rate limiter: no distributed store configured, using in-process counters"),
    }
    Arc::new(MemoryCounterStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(url: Option<&str>, token: Option<&str>) -> Config {
        crate::config::from_lookup(|name| match name {
            "RATE_LIMIT_REDIS_URL" => url.map(String::from),
            "RATE_LIMIT_REDIS_TOKEN" => token.map(String::from),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_factory_defaults_to_in_process() {
        assert_eq!(from_config(&cfg(None, None)).backend(), Backend::InProcess);
        assert_eq!(
            from_config(&cfg(Some("redis://127.0.0.1:6379"), None)).backend(),
            Backend::InProcess
        );
    }

    #[test]
    fn test_factory_selects_redis_without_connecting() {
        // nothing listens on this port; selection must not touch the network
        let store = from_config(&cfg(Some("redis://127.0.0.1:1"), Some("token")));
        assert_eq!(store.backend(), Backend::Distributed);
    }

    #[test]
    fn test_factory_falls_back_on_unparseable_url() {
        let store = from_config(&cfg(Some("not a url"), Some("token")));
        assert_eq!(store.backend(), Backend::InProcess);
    }
}
