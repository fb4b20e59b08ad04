//! Advisory file locking with crash recovery, scoped to a lock key (spec §9's
//! "the core itself is stateless across restarts" -- this guards the one
//! piece of process state that isn't: the on-disk search-result cache file
//! `libfed-cache` maintains between runs of the CLI).
//!
//! The locking is advisory and coordinates cooperating processes; it is not
//! a security boundary. Lock acquisition is atomic (`O_EXCL`/`create_new`)
//! to avoid TOCTOU races, with an `fd-lock` held for the process's lifetime
//! and stale-lock recovery driven by a liveness check on the owning PID.

use camino::Utf8PathBuf;
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default age threshold for considering a lock stale.
const DEFAULT_STALE_THRESHOLD_SECS: u64 = 3600;

/// Lock information persisted in the lock file, read back by a contending
/// process to decide whether the lock is still live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub created_at: u64,
    pub key: String,
    pub crate_version: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock '{key}' is held by another running process (pid {pid}, created {created_ago} ago)")]
    ConcurrentlyHeld { key: String, pid: u32, created_ago: String },

    #[error("stale lock '{key}' found (pid {pid}, age {age_secs}s); pass force=true to override")]
    Stale { key: String, pid: u32, age_secs: u64 },

    #[error("lock file for '{key}' is corrupted or unreadable: {reason}")]
    Corrupted { key: String, reason: String },

    #[error("failed to acquire lock '{key}': {reason}")]
    AcquisitionFailed { key: String, reason: String },

    #[error("failed to release lock '{key}': {reason}")]
    ReleaseFailed { key: String, reason: String },

    #[error("io error during lock operation: {0}")]
    Io(#[from] io::Error),
}

fn ensure_dir_all(path: &Path) -> io::Result<()> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

/// Default directory lock files live under: `$XDG_CACHE_HOME/libfed/locks`,
/// falling back to `.libfed/locks` under the current directory.
fn lock_dir() -> Utf8PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        return Utf8PathBuf::from(xdg).join("libfed").join("locks");
    }
    Utf8PathBuf::from(".libfed").join("locks")
}

fn lock_path_for(key: &str) -> PathBuf {
    lock_dir().join(format!("{key}.lock")).into_std_path_buf()
}

/// RAII guard for one held lock. Releases (deletes the lock file) on drop.
pub struct FileLock {
    lock_path: PathBuf,
    _fd_lock: Option<Box<RwLock<fs::File>>>,
    lock_info: LockInfo,
}

impl FileLock {
    /// Acquire the lock named `key`, recovering from a lock left behind by a
    /// process that is no longer running or whose lock has exceeded
    /// `ttl_seconds` (default one hour). `force` overrides a live lock too.
    pub fn acquire(key: &str, force: bool, ttl_seconds: Option<u64>) -> Result<Self, LockError> {
        let dir = lock_dir();
        ensure_dir_all(dir.as_std_path()).map_err(|e| LockError::AcquisitionFailed {
            key: key.to_string(),
            reason: format!("failed to create lock directory: {e}"),
        })?;

        let ttl = ttl_seconds.unwrap_or(DEFAULT_STALE_THRESHOLD_SECS);
        let lock_path = lock_path_for(key);
        Self::acquire_with_retry(key, &lock_path, force, ttl, 3)
    }

    fn acquire_with_retry(key: &str, lock_path: &Path, force: bool, ttl_seconds: u64, max_retries: u32) -> Result<Self, LockError> {
        for attempt in 0..max_retries {
            let lock_info = LockInfo {
                pid: process::id(),
                created_at: now_secs(),
                key: key.to_string(),
                crate_version: env!("CARGO_PKG_VERSION").to_string(),
            };

            match fs::OpenOptions::new().create_new(true).write(true).open(lock_path) {
                Ok(file) => return Self::finalize(lock_path.to_path_buf(), file, lock_info),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    Self::check_existing(lock_path, key, force, ttl_seconds)?;
                    match Self::try_remove_stale(lock_path) {
                        Ok(()) => match fs::OpenOptions::new().create_new(true).write(true).open(lock_path) {
                            Ok(file) => return Self::finalize(lock_path.to_path_buf(), file, lock_info),
                            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt + 1 < max_retries => {
                                std::thread::sleep(std::time::Duration::from_millis(10u64.saturating_mul(1 << attempt)));
                                continue;
                            }
                            Err(e) => {
                                return Err(LockError::AcquisitionFailed {
                                    key: key.to_string(),
                                    reason: format!("failed to create lock after removing stale lock: {e}"),
                                })
                            }
                        },
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => {
                    return Err(LockError::AcquisitionFailed {
                        key: key.to_string(),
                        reason: format!("failed to create lock file at '{}': {e}", lock_path.display()),
                    })
                }
            }
        }

        Err(LockError::AcquisitionFailed {
            key: key.to_string(),
            reason: format!("max retries ({max_retries}) exceeded"),
        })
    }

    fn finalize(lock_path: PathBuf, file: fs::File, lock_info: LockInfo) -> Result<Self, LockError> {
        let json = serde_json::to_string_pretty(&lock_info).map_err(|e| LockError::AcquisitionFailed {
            key: lock_info.key.clone(),
            reason: format!("failed to serialize lock info: {e}"),
        })?;

        let mut rw_lock = Box::new(RwLock::new(file));
        {
            let mut guard = rw_lock.try_write().map_err(|_| LockError::ConcurrentlyHeld {
                key: lock_info.key.clone(),
                pid: 0,
                created_ago: "unknown".to_string(),
            })?;
            guard.write_all(json.as_bytes()).map_err(|e| LockError::AcquisitionFailed {
                key: lock_info.key.clone(),
                reason: format!("failed to write lock info: {e}"),
            })?;
            guard.sync_all().map_err(|e| LockError::AcquisitionFailed {
                key: lock_info.key.clone(),
                reason: format!("failed to sync lock file: {e}"),
            })?;
        }

        Ok(Self { lock_path, _fd_lock: Some(rw_lock), lock_info })
    }

    fn try_remove_stale(lock_path: &Path) -> Result<(), LockError> {
        let stale_path = lock_path.with_extension(format!("stale.{}.{}", now_secs(), process::id()));
        match fs::rename(lock_path, &stale_path) {
            Ok(()) => {
                let _ = fs::remove_file(&stale_path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::AcquisitionFailed {
                key: lock_path.display().to_string(),
                reason: format!("failed to rename stale lock: {e}"),
            }),
        }
    }

    fn check_existing(lock_path: &Path, key: &str, force: bool, ttl_seconds: u64) -> Result<(), LockError> {
        let content = match fs::read_to_string(lock_path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(LockError::Corrupted {
                    key: key.to_string(),
                    reason: format!("failed to read lock file: {e}"),
                })
            }
        };

        if content.is_empty() {
            return Err(LockError::Corrupted {
                key: key.to_string(),
                reason: "lock file exists but is empty (concurrent initialization)".to_string(),
            });
        }

        let existing: LockInfo = serde_json::from_str(&content).map_err(|e| LockError::Corrupted {
            key: key.to_string(),
            reason: format!("failed to parse lock file: {e}"),
        })?;

        Self::validate_existing(&existing, force, ttl_seconds)
    }

    fn validate_existing(existing: &LockInfo, force: bool, ttl_seconds: u64) -> Result<(), LockError> {
        let age = now_secs().saturating_sub(existing.created_at);
        let stale = age > ttl_seconds;
        let alive = is_process_running(existing.pid);

        if force {
            return Ok(());
        }
        if alive {
            return Err(LockError::ConcurrentlyHeld {
                key: existing.key.clone(),
                pid: existing.pid,
                created_ago: format_duration(age),
            });
        }
        if stale {
            Err(LockError::Stale { key: existing.key.clone(), pid: existing.pid, age_secs: age })
        } else {
            Err(LockError::ConcurrentlyHeld {
                key: existing.key.clone(),
                pid: existing.pid,
                created_ago: format_duration(age),
            })
        }
    }

    /// Whether a lock is currently present for `key` (does not validate liveness).
    pub fn exists(key: &str) -> bool {
        lock_path_for(key).exists()
    }

    pub fn lock_info(&self) -> &LockInfo {
        &self.lock_info
    }

    /// Release the lock, removing the lock file. Also happens automatically on drop.
    pub fn release(mut self) -> Result<(), LockError> {
        self._fd_lock.take();
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path).map_err(|e| LockError::ReleaseFailed {
                key: self.lock_info.key.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for FileLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLock")
            .field("lock_path", &self.lock_path)
            .field("lock_info", &self.lock_info)
            .field("_fd_lock", &"<RwLock>")
            .finish()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if self._fd_lock.take().is_some() && self.lock_path.exists() {
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86_400)
    }
}

fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let rc = unsafe { libc::kill(pid as i32, 0) };
        if rc == 0 {
            true
        } else {
            matches!(io::Error::last_os_error().raw_os_error(), Some(code) if code == libc::EPERM)
        }
    }

    #[cfg(windows)]
    {
        use winapi::um::handleapi::CloseHandle;
        use winapi::um::minwinbase::STILL_ACTIVE;
        use winapi::um::processthreadsapi::{GetExitCodeProcess, OpenProcess};
        use winapi::um::winnt::PROCESS_QUERY_LIMITED_INFORMATION;

        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle.is_null() {
                return false;
            }
            let mut exit_code: u32 = 0;
            let ok = GetExitCodeProcess(handle, &mut exit_code);
            CloseHandle(handle);
            ok != 0 && exit_code == STILL_ACTIVE
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        true
    }
}
