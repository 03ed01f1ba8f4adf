//! Admission decision logic.

mod limiter;

pub use limiter::RateLimiter;
