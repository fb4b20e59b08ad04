//! Search-result cache: normalized ISBN13 -> [`SearchResult`], TTL ~1 hour
//! (spec §3 "Caches"). Treated by the coordinator as the one opaque
//! collaborator store spec §1 calls out, but given a concrete in-memory
//! implementation here so the workspace runs and tests end to end without
//! an external key/value service.
//!
//! Optionally persisted to a single JSON file between CLI invocations (spec
//! §9: the core is stateless across restarts *except* for this cache, which
//! is worth keeping warm across runs of a short-lived CLI process). Writes
//! are guarded by `libfed-lock` so two CLI invocations never interleave
//! their writes to the same file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use libfed_domain::SearchResult;
use serde::{Deserialize, Serialize};
use tracing::warn;

struct Entry {
    value: SearchResult,
    inserted_at: Instant,
}

/// On-disk representation of one entry: `inserted_at` becomes a Unix-epoch
/// millisecond timestamp since `Instant` itself can't be serialized or
/// compared across process restarts.
#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    value: SearchResult,
    inserted_at_unix_ms: u64,
}

#[derive(Serialize, Deserialize, Default)]
struct PersistedCache {
    entries: HashMap<String, PersistedEntry>,
}

const CACHE_LOCK_KEY: &str = "search-cache";

/// Thread-safe, TTL-expiring search cache keyed by normalized ISBN13.
pub struct SearchCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl SearchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a prior result for `isbn13`. Returns `None` on a miss or an
    /// entry past its TTL (which is also evicted as a side effect).
    pub fn get(&self, isbn13: &str) -> Option<SearchResult> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(isbn13) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(isbn13);
                None
            }
            None => None,
        }
    }

    /// Store `result` under `isbn13`, overwriting any prior entry.
    pub fn set(&self, isbn13: &str, result: SearchResult) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            isbn13.to_string(),
            Entry {
                value: result,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Number of live (not necessarily unexpired) entries. Test/diagnostic use.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load a previously persisted cache from `path`, discarding entries
    /// already past `ttl`. Missing or corrupt files are treated as an empty
    /// cache -- a stale cache file should never stop the CLI from starting.
    pub fn load_from_file(path: &Path, ttl: Duration) -> Self {
        let cache = Self::new(ttl);

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return cache,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to read search cache file, starting empty");
                return cache;
            }
        };

        let persisted: PersistedCache = match serde_json::from_str(&content) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "search cache file is corrupt, starting empty");
                return cache;
            }
        };

        let now_ms = unix_millis();
        let mut entries = cache.entries.lock().unwrap();
        for (isbn13, entry) in persisted.entries {
            let age_ms = now_ms.saturating_sub(entry.inserted_at_unix_ms);
            if age_ms >= ttl.as_millis() as u64 {
                continue;
            }
            entries.insert(
                isbn13,
                Entry {
                    value: entry.value,
                    inserted_at: Instant::now() - Duration::from_millis(age_ms),
                },
            );
        }
        drop(entries);
        cache
    }

    /// Persist every live entry to `path`, holding an advisory lock for the
    /// duration of the write so a concurrently running CLI invocation can't
    /// interleave its own save.
    pub fn save_to_file(&self, path: &Path) -> Result<(), SaveError> {
        let _lock = libfed_lock::FileLock::acquire(CACHE_LOCK_KEY, false, Some(30))?;

        let now_ms = unix_millis();
        let entries = self.entries.lock().unwrap();
        let persisted = PersistedCache {
            entries: entries
                .iter()
                .map(|(k, v)| {
                    let age_ms = v.inserted_at.elapsed().as_millis() as u64;
                    (
                        k.clone(),
                        PersistedEntry {
                            value: v.value.clone(),
                            inserted_at_unix_ms: now_ms.saturating_sub(age_ms),
                        },
                    )
                })
                .collect(),
        };
        drop(entries);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&persisted)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn unix_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("failed to acquire search cache lock: {0}")]
    Lock(#[from] libfed_lock::LockError),
    #[error("failed to serialize search cache: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write search cache file: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use libfed_domain::SearchResult;
    use uuid::Uuid;

    fn sample(isbn13: &str) -> SearchResult {
        SearchResult {
            search_id: Uuid::new_v4(),
            isbn: isbn13.to_string(),
            normalized_isbn13: isbn13.to_string(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            holdings: vec![],
            errors: vec![],
            systems_searched: 0,
            systems_succeeded: 0,
            systems_failed: 0,
            systems_timed_out: 0,
            is_partial: false,
            from_cache: false,
        }
    }

    #[test]
    fn hit_then_expiry() {
        let cache = SearchCache::new(Duration::from_millis(20));
        cache.set("9780306406157", sample("9780306406157"));
        assert!(cache.get("9780306406157").is_some());

        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get("9780306406157").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn miss_on_unknown_key() {
        let cache = SearchCache::new(Duration::from_secs(3600));
        assert!(cache.get("nope").is_none());
    }

    #[test]
    fn save_then_load_round_trips_live_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache = SearchCache::new(Duration::from_secs(3600));
        cache.set("9780306406157", sample("9780306406157"));
        cache.save_to_file(&path).unwrap();

        let reloaded = SearchCache::load_from_file(&path, Duration::from_secs(3600));
        let entry = reloaded.get("9780306406157").unwrap();
        assert_eq!(entry.normalized_isbn13, "9780306406157");
    }

    #[test]
    fn load_drops_entries_older_than_the_new_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache = SearchCache::new(Duration::from_secs(3600));
        cache.set("9780306406157", sample("9780306406157"));
        cache.save_to_file(&path).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let reloaded = SearchCache::load_from_file(&path, Duration::from_millis(5));
        assert!(reloaded.get("9780306406157").is_none());
    }

    #[test]
    fn load_from_missing_file_is_an_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        let cache = SearchCache::load_from_file(&path, Duration::from_secs(3600));
        assert!(cache.is_empty());
    }
}
