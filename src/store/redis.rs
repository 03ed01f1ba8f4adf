//! Redis-backed counter store for multi-instance deployments.
//!
//! Request logs are sorted sets where both the score and the member are the
//! request's nanosecond timestamp; blocks and API-key records are plain
//! TTL-bearing entries whose existence is the source of truth. Redis expiry
//! is the sole cleanup mechanism, so idle identities cost nothing and no
//! janitor process is needed. Multiple service instances can share one
//! logical counter set because every mutation is a per-key atomic unit.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;

use crate::error::StoreError;

use super::backend::{now_nanos, CounterStore, DECISION_WINDOW, RETENTION_HORIZON};
use super::identity::{ApiKeyRecord, IdentityClass, KeyAttributes};

/// Counter store backed by a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to Redis at `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        info!(url = %url, "Connected to Redis counter store");
        Ok(Self { conn })
    }

    /// Wrap an existing connection; used by integration tests.
    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    fn requests_key(class: IdentityClass, identifier: &str) -> String {
        format!("requests:{}:{}", class.as_str(), identifier)
    }

    fn block_key(class: IdentityClass, identifier: &str) -> String {
        format!("block:{}:{}", class.as_str(), identifier)
    }

    fn api_key_key(identifier: &str) -> String {
        format!("key:{}", identifier)
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn save_key(&self, record: &ApiKeyRecord) -> Result<(), StoreError> {
        let ttl = record
            .expiration
            .signed_duration_since(Utc::now())
            .num_milliseconds();
        if ttl <= 0 {
            return Err(StoreError::Validation("api key already expired".into()));
        }

        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(Self::api_key_key(&record.identifier))
            .arg(record.rate_per_second)
            .arg("PX")
            .arg(ttl)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn api_key_attributes(&self, identifier: &str) -> Result<KeyAttributes, StoreError> {
        let mut conn = self.conn.clone();

        // One round trip: the key's rate (absent once expired) and the block
        // flag for the apikey namespace.
        let (rate, blocked): (Option<u32>, bool) = redis::pipe()
            .get(Self::api_key_key(identifier))
            .exists(Self::block_key(IdentityClass::ApiKey, identifier))
            .query_async(&mut conn)
            .await?;

        Ok(match rate {
            Some(rate) => KeyAttributes {
                rate,
                valid: true,
                blocked,
            },
            None => KeyAttributes::invalid(),
        })
    }

    async fn requests_in_window(
        &self,
        class: IdentityClass,
        identifier: &str,
    ) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let now = now_nanos();
        let window_start = now - DECISION_WINDOW.as_nanos() as i64;

        // (window_start, now]: the opening paren makes the lower bound
        // exclusive.
        let count: u64 = conn
            .zcount(
                Self::requests_key(class, identifier),
                format!("({}", window_start),
                now,
            )
            .await?;
        Ok(count)
    }

    async fn add_request(&self, class: IdentityClass, identifier: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = Self::requests_key(class, identifier);
        let now = now_nanos();
        let cutoff = now - RETENTION_HORIZON.as_nanos() as i64;

        // MULTI/EXEC: record, prune, refresh expiry. Batching the three means
        // a crash mid-sequence cannot leave the set growing without bound,
        // and an idle identity's key expires on its own.
        redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(&key)
            .arg(now)
            .arg(now)
            .ignore()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(cutoff)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(RETENTION_HORIZON.as_secs())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn block(
        &self,
        class: IdentityClass,
        identifier: &str,
        duration: Duration,
    ) -> Result<(), StoreError> {
        if duration.is_zero() {
            return Err(StoreError::Validation("block time must be positive".into()));
        }

        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(Self::block_key(class, identifier))
            .arg(1)
            .arg("PX")
            .arg(duration.as_millis() as u64)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn is_blocked(
        &self,
        class: IdentityClass,
        identifier: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(Self::block_key(class, identifier)).await?;
        Ok(exists)
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    //! Integration tests against a live Redis at redis://127.0.0.1:6379.
    //! Run with: cargo test -- --ignored

    use super::*;
    use uuid::Uuid;

    async fn test_store() -> RedisStore {
        RedisStore::connect("redis://127.0.0.1:6379")
            .await
            .expect("redis must be running for ignored tests")
    }

    #[tokio::test]
    #[ignore]
    async fn test_save_key_then_attributes_roundtrip() {
        let store = test_store().await;
        let record = ApiKeyRecord::generate(Duration::from_secs(60), 7);

        store.save_key(&record).await.unwrap();

        let attrs = store.api_key_attributes(&record.identifier).await.unwrap();
        assert_eq!(attrs.rate, 7);
        assert!(attrs.valid);
        assert!(!attrs.blocked);
    }

    #[tokio::test]
    #[ignore]
    async fn test_save_expired_key_rejected() {
        let store = test_store().await;
        let record = ApiKeyRecord {
            identifier: Uuid::new_v4().to_string(),
            expiration: Utc::now() - chrono::Duration::seconds(1),
            rate_per_second: 7,
        };

        let err = store.save_key(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn test_window_counts_and_expires() {
        let store = test_store().await;
        let id = Uuid::new_v4().to_string();

        for _ in 0..4 {
            store.add_request(IdentityClass::Ip, &id).await.unwrap();
        }
        let count = store
            .requests_in_window(IdentityClass::Ip, &id)
            .await
            .unwrap();
        assert_eq!(count, 4);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let count = store
            .requests_in_window(IdentityClass::Ip, &id)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    #[ignore]
    async fn test_block_expires_via_ttl() {
        let store = test_store().await;
        let id = Uuid::new_v4().to_string();

        store
            .block(IdentityClass::Ip, &id, Duration::from_millis(200))
            .await
            .unwrap();
        assert!(store.is_blocked(IdentityClass::Ip, &id).await.unwrap());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!store.is_blocked(IdentityClass::Ip, &id).await.unwrap());
    }

    #[tokio::test]
    #[ignore]
    async fn test_identity_classes_do_not_collide() {
        let store = test_store().await;
        let id = Uuid::new_v4().to_string();

        store.add_request(IdentityClass::Ip, &id).await.unwrap();
        let count = store
            .requests_in_window(IdentityClass::ApiKey, &id)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
