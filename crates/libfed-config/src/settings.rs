//! Non-credential tunables, read once at startup from the environment with
//! defaults (spec §6 "Environment variables"). Credential env var *names*
//! live on [`libfed_domain::AdapterConfig`] and are resolved separately, at
//! adapter construction, never here.

use std::time::Duration;

/// The per-system and global deadlines from spec §5 plus cache/concurrency
/// sizing from spec §3, each overridable by an environment variable with a
/// documented default (same env-over-default precedence as the teacher's
/// config discovery, minus the CLI-argument layer this crate has no
/// analogue for). The third nested deadline, spec §5's `perRequestTimeoutMs`,
/// has no field here: it's enforced per adapter via
/// `AdapterConfig.timeout_ms` (each concrete adapter passes its own
/// configured timeout to every HTTP call it makes), not as a single
/// process-wide default.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub per_system_timeout_ms: u64,
    pub global_timeout_ms: u64,
    pub cache_ttl_secs: u64,
    pub max_host_concurrency: usize,
    pub breaker_failure_threshold: u32,
    pub breaker_reset_timeout_ms: u64,
    pub retry_max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Extra credential-redaction patterns, beyond the built-in set in
    /// `libfed-redaction`, for deployment-specific secret shapes.
    pub extra_secret_patterns: Vec<String>,
    /// Built-in redaction pattern ids to disable (spec §9 leaves the exact
    /// set operator-tunable rather than fixed).
    pub ignore_secret_patterns: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            per_system_timeout_ms: 8_000,
            global_timeout_ms: 12_000,
            cache_ttl_secs: 3_600,
            max_host_concurrency: 4,
            breaker_failure_threshold: 5,
            breaker_reset_timeout_ms: 60_000,
            retry_max_retries: 2,
            retry_base_delay_ms: 200,
            extra_secret_patterns: Vec::new(),
            ignore_secret_patterns: Vec::new(),
        }
    }
}

fn env_csv(name: &str) -> Vec<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
        .unwrap_or_default()
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Settings {
    /// Read tunables from the process environment, falling back to the
    /// spec's documented defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            per_system_timeout_ms: env_u64("LIBFED_PER_SYSTEM_TIMEOUT_MS", defaults.per_system_timeout_ms),
            global_timeout_ms: env_u64("LIBFED_GLOBAL_TIMEOUT_MS", defaults.global_timeout_ms),
            cache_ttl_secs: env_u64("LIBFED_CACHE_TTL_SECS", defaults.cache_ttl_secs),
            max_host_concurrency: env_usize("LIBFED_MAX_HOST_CONCURRENCY", defaults.max_host_concurrency),
            breaker_failure_threshold: env_u32("LIBFED_BREAKER_FAILURE_THRESHOLD", defaults.breaker_failure_threshold),
            breaker_reset_timeout_ms: env_u64("LIBFED_BREAKER_RESET_TIMEOUT_MS", defaults.breaker_reset_timeout_ms),
            retry_max_retries: env_u32("LIBFED_RETRY_MAX_RETRIES", defaults.retry_max_retries),
            retry_base_delay_ms: env_u64("LIBFED_RETRY_BASE_DELAY_MS", defaults.retry_base_delay_ms),
            extra_secret_patterns: env_csv("LIBFED_EXTRA_SECRET_PATTERNS"),
            ignore_secret_patterns: env_csv("LIBFED_IGNORE_SECRET_PATTERNS"),
        }
    }

    pub fn per_system_timeout(&self) -> Duration {
        Duration::from_millis(self.per_system_timeout_ms)
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_millis(self.global_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn breaker_reset_timeout(&self) -> Duration {
        Duration::from_millis(self.breaker_reset_timeout_ms)
    }
}

impl libfed_redaction::SecretConfigProvider for Settings {
    fn extra_secret_patterns(&self) -> &[String] {
        &self.extra_secret_patterns
    }

    fn ignore_secret_patterns(&self) -> &[String] {
        &self.ignore_secret_patterns
    }
}

/// Resolve a credential environment-variable *name* to its current value.
/// Per spec §3's adapter-configuration invariant, failure to resolve (the
/// name is set on the config but the variable itself is unset) is an auth
/// error, not a panic or a silently-missing credential.
pub fn resolve_credential(var_name: &str) -> Result<String, MissingCredential> {
    std::env::var(var_name).map_err(|_| MissingCredential {
        var_name: var_name.to_string(),
    })
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("credential environment variable '{var_name}' is not set")]
pub struct MissingCredential {
    pub var_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let s = Settings::default();
        assert_eq!(s.global_timeout_ms, 12_000);
        assert_eq!(s.breaker_failure_threshold, 5);
        assert_eq!(s.breaker_reset_timeout_ms, 60_000);
    }

    #[test]
    fn missing_credential_is_an_error_not_a_default() {
        let err = resolve_credential("LIBFED_TEST_DEFINITELY_UNSET_VAR_XYZ").unwrap_err();
        assert!(err.to_string().contains("LIBFED_TEST_DEFINITELY_UNSET_VAR_XYZ"));
    }
}
