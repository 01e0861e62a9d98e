//! Behavioural properties of the protection primitives through the public API.

use std::sync::Arc;
use std::time::Duration;

use integration_guard::errors::VaultError;
use integration_guard::middleware::rate_limit::{RateLimitConfig, RateLimiter};
use integration_guard::store::clock::MockClock;
use integration_guard::store::MemoryCounterStore;
use integration_guard::vault::CredentialVault;

const KEY: &str = "8f1a3c5e7b9d2f4a6c8e0b1d3f5a7c9e2b4d6f8a0c1e3b5d7f9a2c4e6b8d0f1a";

mod vault_properties {
    use super::*;

    #[test]
    fn roundtrip_many_plaintexts() {
        let vault = CredentialVault::new(Some(KEY));
        let samples = [
            "shpat_0123456789abcdef".to_string(),
            "a:b:c with colons".to_string(),
            "\u{0}\u{1}control".to_string(),
            "日本語のトークン".to_string(),
            "y".repeat(15),
            "y".repeat(16),
            "y".repeat(17),
        ];
        for p in &samples {
            assert_eq!(&vault.decrypt(&vault.encrypt(p).unwrap()).unwrap(), p);
        }
    }

    #[test]
    fn ciphertexts_never_repeat() {
        let vault = CredentialVault::new(Some(KEY));
        let tags: std::collections::HashSet<String> =
            (0..32).map(|_| vault.encrypt("same").unwrap()).collect();
        assert_eq!(tags.len(), 32);
    }

    #[test]
    fn malformed_tag_is_an_error_not_empty_string() {
        let vault = CredentialVault::new(Some(KEY));
        let tag = format!("{}:invalidhexdata", "a".repeat(32));
        assert!(matches!(vault.decrypt(&tag), Err(VaultError::Decryption(_))));
    }

    #[test]
    fn backfill_is_idempotent() {
        let vault = CredentialVault::new(Some(KEY));
        let once = vault.migrate("shpat_old").unwrap();
        assert!(vault.migrate(&once).is_none());
        assert_eq!(vault.decrypt(&once).unwrap(), "shpat_old");
    }
}

mod limiter_properties {
    use super::*;

    fn limiter() -> (RateLimiter, MockClock, Arc<MemoryCounterStore>) {
        let clock = MockClock::new();
        let store = Arc::new(MemoryCounterStore::with_clock(Arc::new(clock.clone())));
        (RateLimiter::new(store.clone()), clock, store)
    }

    #[tokio::test]
    async fn reset_in_stays_within_window() {
        let (limiter, clock, _) = limiter();
        let cfg = RateLimitConfig::new("sample", 1_000, 60);
        for _ in 0..180 {
            let r = limiter.check("id", &cfg).await;
            assert!(r.reset_in > 0 && r.reset_in <= 60, "reset_in = {}", r.reset_in);
            clock.advance(Duration::from_millis(733));
        }
    }

    #[tokio::test]
    async fn stale_records_are_not_evicted_automatically() {
        let (limiter, clock, store) = limiter();
        let cfg = RateLimitConfig::new("sample", 5, 60);
        for i in 0..50 {
            limiter.check(&format!("client-{}", i), &cfg).await;
        }
        clock.advance(Duration::from_secs(3600));
        limiter.check("late", &cfg).await;
        assert_eq!(store.len(), 51);

        assert_eq!(store.sweep_expired(), 50);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_budget() {
        let limiter = RateLimiter::in_process();
        let cfg = RateLimitConfig::new("burst", 25, 60);
        let mut handles = Vec::new();
        for _ in 0..100 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.check("shared", &cfg).await.success
            }));
        }
        let mut allowed = 0;
        for h in handles {
            if h.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 25);
    }
}
