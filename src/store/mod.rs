//! Counter stores and the capability contract the decision engine consumes.

mod backend;
mod identity;
mod memory;
mod redis;

pub use backend::{CounterStore, DECISION_WINDOW, RETENTION_HORIZON};
pub use identity::{ApiKeyRecord, IdentityClass, KeyAttributes};
pub use memory::MemoryStore;
pub use redis::RedisStore;
