//! The unified data model shared by every crate in the workspace:
//! library/branch identity, adapter configuration, the normalized
//! `BookHolding` record, and the `SearchResult` envelope.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, slug-shaped identifier for a library system. Unique within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemId(pub String);

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SystemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SystemId {
    fn from(s: &str) -> Self {
        SystemId(s.to_string())
    }
}

/// Opaque branch identifier. By invariant, begins with `"<system_id>:"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchId(pub String);

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl BranchId {
    /// Build a branch id from its owning system and a unique code, enforcing
    /// the `"<system_id>:<code>"` invariant.
    pub fn new(system: &SystemId, code: &str) -> Self {
        BranchId(format!("{}:{}", system.0, code))
    }
}

/// Closed adapter-protocol vocabulary (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    KohaSru,
    Sru,
    OclcWorldcat,
    SierraRest,
    PolarisPapi,
    SirsiEnterpriseScrape,
    BibliocommonsScrape,
    WebScrape,
    ApolloApi,
    AspenDiscoveryApi,
    AtriuumScrape,
    SpydusScrape,
    TlcApi,
    PlaywrightScrape,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("{:?}", self));
        write!(f, "{s}")
    }
}

/// A single branch belonging to a [`LibrarySystem`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchRecord {
    pub id: BranchId,
    pub code: String,
    pub name: String,
    pub city: Option<String>,
}

/// Named reference to an environment variable carrying a credential value.
/// The config layer stores only the *name*; the value is resolved at
/// adapter-construction time and never logged or serialized back out.
pub type EnvVarName = String;

/// One adapter's configuration, as loaded from the YAML registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub protocol: Protocol,
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    #[serde(default)]
    pub client_key_env_var: Option<EnvVarName>,
    #[serde(default)]
    pub client_secret_env_var: Option<EnvVarName>,
    /// Free-form, adapter-specific configuration (URL templates, CSS
    /// selectors, institution-symbol maps, ...). Never logged verbatim if
    /// it may contain credential-shaped values.
    #[serde(default)]
    pub extra: std::collections::HashMap<String, serde_json::Value>,
}

fn default_timeout_ms() -> u64 {
    8_000
}

fn default_max_concurrency() -> u32 {
    4
}

/// One library system: identity, branches, and adapter configurations.
/// Constructed once at startup; immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrarySystem {
    pub id: SystemId,
    pub name: String,
    pub vendor: String,
    pub region: String,
    pub catalog_url: String,
    #[serde(default)]
    pub enabled: bool,
    pub branches: Vec<BranchRecord>,
    pub adapters: Vec<AdapterConfig>,
}

/// Violations of the [`LibrarySystem`] invariants from spec §3.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SystemValidationError {
    #[error("system '{system}' has no adapter configurations")]
    NoAdapters { system: String },
    #[error("branch id '{branch}' in system '{system}' does not start with '{system}:'")]
    BranchIdPrefixMismatch { system: String, branch: String },
    #[error("duplicate branch code '{code}' in system '{system}'")]
    DuplicateBranchCode { system: String, code: String },
}

impl LibrarySystem {
    /// Check the invariants spec §3 places on a library system: at least one
    /// adapter, and every branch id is `"<system_id>:<unique code>"`.
    pub fn validate(&self) -> Result<(), SystemValidationError> {
        if self.adapters.is_empty() {
            return Err(SystemValidationError::NoAdapters {
                system: self.id.0.clone(),
            });
        }

        let prefix = format!("{}:", self.id.0);
        let mut seen_codes = std::collections::HashSet::new();
        for branch in &self.branches {
            if !branch.id.0.starts_with(&prefix) {
                return Err(SystemValidationError::BranchIdPrefixMismatch {
                    system: self.id.0.clone(),
                    branch: branch.id.0.clone(),
                });
            }
            if !seen_codes.insert(branch.code.clone()) {
                return Err(SystemValidationError::DuplicateBranchCode {
                    system: self.id.0.clone(),
                    code: branch.code.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Canonical material-type vocabulary (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialType {
    Book,
    LargePrint,
    AudiobookCd,
    Ebook,
    Dvd,
    Unknown,
}

impl Default for MaterialType {
    fn default() -> Self {
        MaterialType::Unknown
    }
}

/// Canonical availability-status vocabulary (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Available,
    CheckedOut,
    InTransit,
    OnHold,
    OnOrder,
    InProcessing,
    Missing,
    Unknown,
}

/// One normalized holding: a single item instance at a single branch,
/// produced by an adapter and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookHolding {
    pub isbn: String,
    pub system_id: SystemId,
    pub branch_id: BranchId,
    pub system_name: String,
    pub branch_name: String,

    pub call_number: Option<String>,
    #[serde(default)]
    pub collection: String,
    pub volume: Option<String>,
    pub material_type: MaterialType,

    pub status: Status,
    pub due_date: Option<NaiveDate>,
    pub hold_count: Option<u32>,
    pub copy_count: Option<u32>,
    pub raw_status: String,

    pub catalog_url: String,
    pub fingerprint: String,

    /// Explicit alternative to sentinel-string matching for cross-source
    /// preference (spec §9 open question): true when this holding came
    /// from an aggregate/union-catalog adapter rather than the system's
    /// own catalog.
    #[serde(default)]
    pub is_secondary_source: bool,
}

/// Sentinel raw-status text used by aggregate sources (e.g. WorldCat) that
/// report holdings without real-time per-system status (spec §4.10, §9).
pub const AGGREGATE_SOURCE_SENTINEL: &str = "WorldCat holdings - real-time status unavailable";

impl BookHolding {
    /// Whether this holding should be treated as an aggregate-source record
    /// for cross-source dedup preference purposes.
    pub fn is_aggregate_source(&self) -> bool {
        self.is_secondary_source || self.raw_status == AGGREGATE_SOURCE_SENTINEL
    }
}

/// Build the dedup fingerprint: non-null, non-empty parts, lowercased and
/// trimmed, joined by `":"`.
pub fn fingerprint(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .filter_map(|p| *p)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(":")
}

/// Closed error-kind taxonomy surfaced per failed system (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Timeout,
    Auth,
    RateLimit,
    Parse,
    Unknown,
}

/// One error record, one per failed system, attached to a [`SearchResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemError {
    pub system_id: SystemId,
    pub system_name: String,
    pub protocol: Protocol,
    pub error_type: ErrorKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// The unified, deduplicated response to a single ISBN search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub search_id: Uuid,
    pub isbn: String,
    pub normalized_isbn13: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub holdings: Vec<BookHolding>,
    pub errors: Vec<SystemError>,
    pub systems_searched: u32,
    pub systems_succeeded: u32,
    pub systems_failed: u32,
    pub systems_timed_out: u32,
    pub is_partial: bool,
    pub from_cache: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_id_invariant() {
        let sys = SystemId::from("houston-public");
        let branch = BranchId::new(&sys, "main");
        assert_eq!(branch.0, "houston-public:main");
    }

    #[test]
    fn fingerprint_drops_empty_and_lowercases() {
        let fp = fingerprint(&[Some("Sys-A"), None, Some(""), Some(" Main ")]);
        assert_eq!(fp, "sys-a:main");
    }

    #[test]
    fn aggregate_source_detected_by_sentinel_or_flag() {
        let mut h = sample_holding();
        h.raw_status = AGGREGATE_SOURCE_SENTINEL.to_string();
        assert!(h.is_aggregate_source());

        let mut h2 = sample_holding();
        h2.is_secondary_source = true;
        h2.raw_status = "Available".to_string();
        assert!(h2.is_aggregate_source());

        let h3 = sample_holding();
        assert!(!h3.is_aggregate_source());
    }

    fn sample_holding() -> BookHolding {
        BookHolding {
            isbn: "9780306406157".into(),
            system_id: SystemId::from("sys-a"),
            branch_id: BranchId::new(&SystemId::from("sys-a"), "main"),
            system_name: "Sys A".into(),
            branch_name: "Main".into(),
            call_number: None,
            collection: String::new(),
            volume: None,
            material_type: MaterialType::Unknown,
            status: Status::Available,
            due_date: None,
            hold_count: None,
            copy_count: None,
            raw_status: "Available".into(),
            catalog_url: "https://example.org".into(),
            fingerprint: "sys-a:9780306406157:main".into(),
            is_secondary_source: false,
        }
    }
}
