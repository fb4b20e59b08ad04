//! Resilience primitives for fanning calls out to unreliable catalog
//! systems: a per-system circuit breaker, a per-host concurrency limiter,
//! and a jittered retry engine.
//!
//! None of these know anything about HTTP or catalogs; the adapter layer
//! composes them around each concrete adapter call.

pub mod breaker;
pub mod host_limiter;
pub mod retry;

pub use breaker::CircuitBreaker;
pub use host_limiter::HostLimiter;
pub use retry::{retry as retry_with_policy, RetryPolicy};
