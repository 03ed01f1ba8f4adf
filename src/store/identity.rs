//! Identity classes and API key records.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Namespace tag distinguishing IP-based from key-based identities.
///
/// Store keys are always qualified by the class, so an IP string can never
/// collide with an API-key string in the keyspace.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum IdentityClass {
    /// Client IP address
    Ip,
    /// Issued API key
    ApiKey,
}

impl IdentityClass {
    /// Returns the string representation used in store keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityClass::Ip => "ip",
            IdentityClass::ApiKey => "apikey",
        }
    }
}

impl fmt::Display for IdentityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An issued API key with its own rate and expiration.
///
/// Read-only after creation; it becomes implicitly invalid once `expiration`
/// passes, no deletion required.
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    /// Opaque key identifier handed to the client
    pub identifier: String,
    /// Instant after which the key no longer admits anything
    pub expiration: DateTime<Utc>,
    /// Requests allowed per trailing one-second window
    pub rate_per_second: u32,
}

impl ApiKeyRecord {
    /// Create a record with a fresh random identifier, valid for `validity`
    /// from now. An unrepresentably large validity saturates to the far
    /// future.
    pub fn generate(validity: Duration, rate_per_second: u32) -> Self {
        Self {
            identifier: Uuid::new_v4().to_string(),
            expiration: saturating_from_now(validity),
            rate_per_second,
        }
    }

    /// Whether the key is past its expiration.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expiration
    }
}

/// `now + span`, saturating to the far future instead of overflowing.
pub(crate) fn saturating_from_now(span: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(span)
        .ok()
        .and_then(|d| Utc::now().checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Result of the one-logical-query API key lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyAttributes {
    /// The key's own requests-per-second rate
    pub rate: u32,
    /// False if the key is absent or expired
    pub valid: bool,
    /// True if the key is currently under an active block
    pub blocked: bool,
}

impl KeyAttributes {
    /// Attributes for an absent or expired key.
    pub fn invalid() -> Self {
        Self {
            rate: 0,
            valid: false,
            blocked: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_namespaces_are_distinct() {
        assert_eq!(IdentityClass::Ip.as_str(), "ip");
        assert_eq!(IdentityClass::ApiKey.as_str(), "apikey");
        assert_ne!(IdentityClass::Ip, IdentityClass::ApiKey);
    }

    #[test]
    fn test_generate_produces_unique_identifiers() {
        let a = ApiKeyRecord::generate(Duration::from_secs(60), 5);
        let b = ApiKeyRecord::generate(Duration::from_secs(60), 5);
        assert_ne!(a.identifier, b.identifier);
    }

    #[test]
    fn test_generated_key_expires_in_the_future() {
        let record = ApiKeyRecord::generate(Duration::from_secs(3600), 10);
        assert!(!record.is_expired());
        assert!(record.expiration > Utc::now());
        assert_eq!(record.rate_per_second, 10);
    }

    #[test]
    fn test_invalid_attributes() {
        let attrs = KeyAttributes::invalid();
        assert!(!attrs.valid);
        assert!(!attrs.blocked);
        assert_eq!(attrs.rate, 0);
    }
}
