//! Counter store trait for abstracting in-process and networked implementations.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

use super::identity::{ApiKeyRecord, IdentityClass, KeyAttributes};

/// The trailing interval over which admitted-request counts are evaluated.
pub const DECISION_WINDOW: Duration = Duration::from_secs(1);

/// How long raw request timestamps are retained before pruning.
///
/// Twice the decision window, so entries near the boundary survive clock and
/// processing skew instead of vanishing mid-evaluation.
pub const RETENTION_HORIZON: Duration = Duration::from_secs(2);

/// Capability contract required by the decision engine.
///
/// This trait abstracts over the in-process `MemoryStore` and the networked
/// `RedisStore` so the engine works against either. All mutable limiter state
/// lives behind it; implementations are responsible for their own concurrency
/// safety.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Persist an API key record. Rejects records whose expiration is not
    /// strictly in the future.
    async fn save_key(&self, record: &ApiKeyRecord) -> Result<(), StoreError>;

    /// Fetch a key's rate, validity, and block status in one logical query.
    async fn api_key_attributes(&self, identifier: &str) -> Result<KeyAttributes, StoreError>;

    /// Number of recorded requests for the identity within the trailing
    /// decision window ending now.
    async fn requests_in_window(
        &self,
        class: IdentityClass,
        identifier: &str,
    ) -> Result<u64, StoreError>;

    /// Record the current timestamp for the identity, pruning entries older
    /// than the retention horizon.
    async fn add_request(&self, class: IdentityClass, identifier: &str) -> Result<(), StoreError>;

    /// Set or overwrite the identity's block to expire `duration` from now.
    /// Fails on a zero duration.
    async fn block(
        &self,
        class: IdentityClass,
        identifier: &str,
        duration: Duration,
    ) -> Result<(), StoreError>;

    /// True iff a block exists for the identity and has not expired.
    async fn is_blocked(&self, class: IdentityClass, identifier: &str)
        -> Result<bool, StoreError>;
}

/// Current wall-clock time as unix nanoseconds.
///
/// Nanosecond stamps double as sorted-set scores and members, so two requests
/// in the same instant remain distinct entries.
pub(crate) fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}
