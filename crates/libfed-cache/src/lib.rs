//! The three in-process "opaque collaborator" stores the coordinator
//! leans on (spec §3, §5): the TTL search-result cache, the per-system
//! health tracker, and the metrics collector. Concrete in-memory
//! implementations, swappable behind the same API for a Redis/Postgres
//! backed deployment without touching the coordinator.

pub mod health;
pub mod metrics;
pub mod search_cache;

pub use health::{HealthRecord, HealthTracker};
pub use metrics::{MetricEvent, MetricsCollector};
pub use search_cache::{SaveError, SearchCache};
