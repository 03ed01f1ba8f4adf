//! In-process counter store.
//!
//! Single mutex, three maps. Every read-modify-write runs under the lock, so
//! concurrent callers cannot lose updates or observe torn state. Intended for
//! tests and single-instance deployments; nothing survives a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::StoreError;

use super::backend::{now_nanos, CounterStore, DECISION_WINDOW, RETENTION_HORIZON};
use super::identity::{ApiKeyRecord, IdentityClass, KeyAttributes};

#[derive(Debug, Clone)]
struct StoredKey {
    rate: u32,
    expiration: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    keys: HashMap<String, StoredKey>,
    requests: HashMap<(IdentityClass, String), Vec<i64>>,
    blocks: HashMap<(IdentityClass, String), DateTime<Utc>>,
}

/// Mutex-guarded in-process store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block check shared by `is_blocked` and `api_key_attributes`.
    ///
    /// Expired blocks are purged on sight; an expired block must never read
    /// back as active.
    fn check_block(state: &mut MemoryState, class: IdentityClass, identifier: &str) -> bool {
        let entry = (class, identifier.to_string());
        match state.blocks.get(&entry) {
            Some(expiry) if Utc::now() < *expiry => true,
            Some(_) => {
                state.blocks.remove(&entry);
                false
            }
            None => false,
        }
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn save_key(&self, record: &ApiKeyRecord) -> Result<(), StoreError> {
        if record.expiration <= Utc::now() {
            return Err(StoreError::Validation("api key already expired".into()));
        }

        let mut state = self.state.lock();
        state.keys.insert(
            record.identifier.clone(),
            StoredKey {
                rate: record.rate_per_second,
                expiration: record.expiration,
            },
        );
        Ok(())
    }

    async fn api_key_attributes(&self, identifier: &str) -> Result<KeyAttributes, StoreError> {
        let mut state = self.state.lock();

        let stored = match state.keys.get(identifier) {
            Some(k) if Utc::now() <= k.expiration => k.clone(),
            _ => return Ok(KeyAttributes::invalid()),
        };

        let blocked = Self::check_block(&mut state, IdentityClass::ApiKey, identifier);
        Ok(KeyAttributes {
            rate: stored.rate,
            valid: true,
            blocked,
        })
    }

    async fn requests_in_window(
        &self,
        class: IdentityClass,
        identifier: &str,
    ) -> Result<u64, StoreError> {
        let state = self.state.lock();
        let window_start = now_nanos() - DECISION_WINDOW.as_nanos() as i64;

        let count = state
            .requests
            .get(&(class, identifier.to_string()))
            .map(|entries| entries.iter().filter(|ts| **ts > window_start).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn add_request(&self, class: IdentityClass, identifier: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let now = now_nanos();
        let cutoff = now - RETENTION_HORIZON.as_nanos() as i64;

        let entries = state
            .requests
            .entry((class, identifier.to_string()))
            .or_default();
        entries.retain(|ts| *ts > cutoff);
        entries.push(now);
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

        let expiry = super::identity::saturating_from_now(duration);

        let mut state = self.state.lock();
        state.blocks.insert((class, identifier.to_string()), expiry);
        Ok(())
    }

    async fn is_blocked(
        &self,
        class: IdentityClass,
        identifier: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        Ok(Self::check_block(&mut state, class, identifier))
    }
}
