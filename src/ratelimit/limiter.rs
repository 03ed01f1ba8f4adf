//! Core admission decision engine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::{CounterStore, IdentityClass};

/// The admission decision engine.
///
/// Holds no mutable state of its own: everything mutable lives in the
/// injected store, so concurrent `allow` calls need no synchronization here.
pub struct RateLimiter {
    /// Counter store all checks and mutations go through
    store: Arc<dyn CounterStore>,
    /// Quota for identities evaluated by IP
    max_requests_per_ip: u32,
    /// How long a quota breach blocks the identity
    block_time: Duration,
    /// Deadline applied to every store call
    store_timeout: Duration,
}

impl RateLimiter {
    /// Create a new decision engine over `store`.
    ///
    /// Non-positive `max_requests_per_ip` or `block_seconds` are coerced to 1,
    /// so a misconfigured deployment throttles hard instead of producing zero
    /// quotas or zero-length blocks.
    pub fn new(store: Arc<dyn CounterStore>, max_requests_per_ip: u32, block_seconds: u64) -> Self {
        Self {
            store,
            max_requests_per_ip: max_requests_per_ip.max(1),
            block_time: Duration::from_secs(block_seconds.max(1)),
            store_timeout: Duration::from_secs(1),
        }
    }

    /// Override the per-call store deadline.
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Decide whether to admit the current request.
    ///
    /// A non-empty API key is governed solely by that key's record; it never
    /// falls back to IP-based evaluation. With neither identity present there
    /// is nothing to justify an admit, so the request is denied.
    pub async fn allow(&self, ip: &str, api_key: &str) -> bool {
        if !api_key.is_empty() {
            return self.allow_key(api_key).await;
        }
        if !ip.is_empty() {
            return self.allow_ip(ip).await;
        }
        debug!("Request carried no identity, denying");
        false
    }

    /// IP path: block check, then window count against the configured
    /// per-IP quota.
    async fn allow_ip(&self, ip: &str) -> bool {
        let blocked = match self.read(self.store.is_blocked(IdentityClass::Ip, ip)).await {
            Ok(blocked) => blocked,
            Err(e) => {
                warn!(ip = %ip, error = %e, "Block lookup failed, denying");
                return false;
            }
        };
        if blocked {
            debug!(ip = %ip, "IP is blocked");
            return false;
        }

        let count = match self
            .read(self.store.requests_in_window(IdentityClass::Ip, ip))
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(ip = %ip, error = %e, "Window count failed, denying");
                return false;
            }
        };

        if count >= self.max_requests_per_ip as u64 {
            debug!(
                ip = %ip,
                count = count,
                limit = self.max_requests_per_ip,
                "IP over limit, blocking"
            );
            self.issue_block(IdentityClass::Ip, ip).await;
            return false;
        }

        self.record_request(IdentityClass::Ip, ip).await;
        true
    }

    /// Key path: validity and block status in one lookup, then window count
    /// against the key's own rate.
    async fn allow_key(&self, key: &str) -> bool {
        let attrs = match self.read(self.store.api_key_attributes(key)).await {
            Ok(attrs) => attrs,
            Err(e) => {
                warn!(error = %e, "API key lookup failed, denying");
                return false;
            }
        };

        if !attrs.valid || attrs.blocked {
            debug!(
                valid = attrs.valid,
                blocked = attrs.blocked,
                "API key rejected"
            );
            return false;
        }

        let count = match self
            .read(self.store.requests_in_window(IdentityClass::ApiKey, key))
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Window count failed, denying");
                return false;
            }
        };

        if count >= attrs.rate as u64 {
            debug!(count = count, rate = attrs.rate, "API key over its rate, blocking");
            self.issue_block(IdentityClass::ApiKey, key).await;
            return false;
        }

        self.record_request(IdentityClass::ApiKey, key).await;
        true
    }

    /// Apply the store deadline to a decision read. A timed-out read is a
    /// store error, which the callers resolve to deny.
    async fn read<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }

    /// Post-decision bookkeeping: the admit already stands, so a failure here
    /// is logged and swallowed.
    async fn record_request(&self, class: IdentityClass, identifier: &str) {
        if let Err(e) = self
            .read(self.store.add_request(class, identifier))
            .await
        {
            warn!(class = %class, error = %e, "Failed to record admitted request");
        }
    }

    /// Post-decision bookkeeping: the deny already stands, so a failure here
    /// is logged and swallowed.
    async fn issue_block(&self, class: IdentityClass, identifier: &str) {
        if let Err(e) = self
            .read(self.store.block(class, identifier, self.block_time))
            .await
        {
            warn!(class = %class, error = %e, "Failed to record block");
        }
    }
}
