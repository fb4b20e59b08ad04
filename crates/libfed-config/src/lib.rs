//! Library-registry loading and startup settings for the federated search
//! service (spec §6). No adapter or HTTP knowledge lives here: this crate
//! only turns YAML + environment into validated [`libfed_domain`] types.

pub mod error;
pub mod registry;
pub mod settings;

pub use error::ConfigError;
pub use registry::{discover, load_one};
pub use settings::{resolve_credential, MissingCredential, Settings};
