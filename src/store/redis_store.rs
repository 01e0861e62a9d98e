use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::IntoConnectionInfo;
use tokio::sync::OnceCell;

use super::{Backend, CounterStore, WindowHit};
use crate::errors::StoreError;

// INCR, start the window on the first hit, report the remaining TTL.
// One server-side script so two processes can never both open a window.
const FIXED_WINDOW_SCRIPT: &str = r#"
local current = redis.call("INCR", KEYS[1])
if current == 1 then
    redis.call("PEXPIRE", KEYS[1], ARGV[1])
end
local ttl = redis.call("PTTL", KEYS[1])
if ttl < 0 then
    redis.call("PEXPIRE", KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {current, ttl}
"#;

/// Redis-backed fixed-window counters shared by every gateway process.
///
/// The connection is opened lazily on first use; construction never touches
/// the network. Expired windows are dropped by Redis key expiry.
pub struct RedisCounterStore {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    script: redis::Script,
    timeout: Duration,
}

impl RedisCounterStore {
    /// `token` is sent as the connection password.
    pub fn new(url: &str, token: &str, timeout: Duration) -> Result<Self, StoreError> {
        let mut info = url.into_connection_info()?;
        info.redis.password = Some(token.to_string());
        Ok(Self {
            client: redis::Client::open(info)?,
            conn: OnceCell::new(),
            script: redis::Script::new(FIXED_WINDOW_SCRIPT),
            timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let conn = self
            .conn
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(conn.clone())
    }

    async fn hit_inner(&self, key: &str, window: Duration) -> Result<WindowHit, StoreError> {
        let window_ms = window.as_millis().max(1) as u64;
        let mut conn = self.connection().await?;
        let (count, ttl_ms): (u64, i64) = self
            .script
            .key(key)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;

        let ttl_ms = (ttl_ms.max(1) as u64).min(window_ms);
        Ok(WindowHit {
            count,
            reset_in: Duration::from_millis(ttl_ms),
        })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, StoreError> {
        match tokio::time::timeout(self.timeout, self.hit_inner(key, window)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    fn backend(&self) -> Backend {
        Backend::Distributed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unparseable_url() {
        assert!(RedisCounterStore::new("definitely not a url", "t", Duration::from_millis(50)).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error_not_a_hang() {
        let store =
            RedisCounterStore::new("redis://127.0.0.1:1", "t", Duration::from_millis(200)).unwrap();
        let result = store.hit("ratelimit:test:unreachable", Duration::from_secs(60)).await;
        assert!(result.is_err());
    }

    /// Requires a running Redis; run with `REDIS_URL=redis://127.0.0.1:6379 cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_fixed_window_against_live_redis() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let token = std::env::var("REDIS_TOKEN").unwrap_or_default();
        let mut info = url.as_str().into_connection_info().unwrap();
        if !token.is_empty() {
            info.redis.password = Some(token);
        }
        let store = RedisCounterStore {
            client: redis::Client::open(info).unwrap(),
            conn: OnceCell::new(),
            script: redis::Script::new(FIXED_WINDOW_SCRIPT),
            timeout: Duration::from_secs(2),
        };

        let key = format!("ratelimit:test:{}", uuid::Uuid::new_v4());
        let window = Duration::from_secs(60);
        let first = store.hit(&key, window).await.unwrap();
        let second = store.hit(&key, window).await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(second.count, 2);
        assert!(second.reset_in > Duration::ZERO && second.reset_in <= window);
    }
}
