use camino::Utf8PathBuf;
use thiserror::Error;

use libfed_domain::SystemValidationError;

/// Failures loading the library registry or startup settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML in '{path}': {source}")]
    Yaml {
        path: Utf8PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid library system in '{path}': {source}")]
    Invalid {
        path: Utf8PathBuf,
        #[source]
        source: SystemValidationError,
    },

    #[error("duplicate system id '{id}' (first seen in '{first}', again in '{second}')")]
    DuplicateSystemId {
        id: String,
        first: Utf8PathBuf,
        second: Utf8PathBuf,
    },
}
