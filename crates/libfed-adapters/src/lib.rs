//! The polymorphic catalog-adapter contract, every concrete adapter
//! pattern (spec §4.7), and the registry that builds one per configured
//! library system (spec §4.8).

pub mod base;
pub mod error;
pub mod http;
pub mod marc;
pub mod normalize;
pub mod patterns;
pub mod registry;

pub use base::{fingerprint, BaseAdapter, CatalogAdapter, HealthProbe, SearchOutcome};
pub use error::AdapterError;
pub use registry::AdapterRegistry;
