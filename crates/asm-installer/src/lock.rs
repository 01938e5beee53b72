use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::fs_utils::remove_file_if_exists;
use crate::layout::lock_path_for;

pub const LOCK_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Contents of `<skill>.asm-update.lock`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub pid: u32,
    pub timestamp: DateTime<Utc>,
    pub operation_type: String,
    pub skill_path: PathBuf,
    #[serde(default)]
    pub package_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("skill is locked by another operation: {}{}", path.display(), holder_detail(*pid, timestamp.as_deref()))]
    AlreadyLocked {
        path: PathBuf,
        pid: Option<u32>,
        timestamp: Option<String>,
    },
    #[error("failed to manage lock file {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

fn holder_detail(pid: Option<u32>, timestamp: Option<&str>) -> String {
    match (pid, timestamp) {
        (Some(pid), Some(timestamp)) => format!(" (pid={pid}, since {timestamp})"),
        (Some(pid), None) => format!(" (pid={pid})"),
        _ => String::new(),
    }
}

/// Exclusive claim on a skill directory. Released explicitly with
/// [`UpdateLock::release`] or when dropped.
#[derive(Debug)]
pub struct UpdateLock {
    path: PathBuf,
    released: bool,
}

impl UpdateLock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            release_lock_path(&self.path);
        }
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

pub fn acquire_update_lock(
    skill_path: &Path,
    package_path: &Path,
) -> Result<UpdateLock, LockError> {
    acquire_skill_lock(skill_path, "update", Some(package_path))
}

pub fn acquire_skill_lock(
    skill_path: &Path,
    operation_type: &str,
    package_path: Option<&Path>,
) -> Result<UpdateLock, LockError> {
    let path = lock_path_for(skill_path);
    let info = LockInfo {
        pid: std::process::id(),
        timestamp: Utc::now(),
        operation_type: operation_type.to_string(),
        skill_path: skill_path.to_path_buf(),
        package_path: package_path.map(Path::to_path_buf),
    };
    let payload = serde_json::to_vec_pretty(&info).map_err(|err| LockError::Io {
        path: path.clone(),
        message: format!("failed to serialize lock info: {err}"),
    })?;

    let mut evicted = false;
    loop {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                if let Err(err) = file.write_all(&payload).and_then(|()| file.flush()) {
                    let _ = remove_file_if_exists(&path);
                    return Err(LockError::Io {
                        path,
                        message: format!("failed to write lock file: {err}"),
                    });
                }
                tracing::debug!(lock = %path.display(), operation = operation_type, "acquired skill lock");
                return Ok(UpdateLock {
                    path,
                    released: false,
                });
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let holder = read_lock_info(&path);
                if !evicted && lock_is_stale(&path, holder.as_ref()) {
                    tracing::warn!(
                        lock = %path.display(),
                        pid = holder.as_ref().map(|info| info.pid),
                        "removing stale skill lock"
                    );
                    if evict_stale_lock(&path, holder.as_ref())? {
                        evicted = true;
                        continue;
                    }
                }
                return Err(LockError::AlreadyLocked {
                    path,
                    pid: holder.as_ref().map(|info| info.pid),
                    timestamp: holder.map(|info| info.timestamp.to_rfc3339()),
                });
            }
            Err(err) => {
                return Err(LockError::Io {
                    path,
                    message: format!("failed to create lock file: {err}"),
                });
            }
        }
    }
}

/// Removes a lock file, ignoring every error including absence.
pub fn release_lock_path(path: &Path) {
    if let Err(err) = remove_file_if_exists(path) {
        tracing::debug!(lock = %path.display(), error = %err, "ignoring lock release failure");
    }
}

fn eviction_guard_path(lock_path: &Path) -> PathBuf {
    let mut name = lock_path.as_os_str().to_owned();
    name.push(".evict");
    PathBuf::from(name)
}

/// Removes `path` only if it still holds the stale `observed` lock.
///
/// Evictors serialize on a `<lock>.evict` guard created with `create_new`,
/// and the lock is re-read under the guard, so a fresh lock written by a
/// faster acquirer is never removed. Returns `false` when another evictor
/// holds the guard or the lock changed hands.
fn evict_stale_lock(path: &Path, observed: Option<&LockInfo>) -> Result<bool, LockError> {
    let guard = eviction_guard_path(path);
    match OpenOptions::new().write(true).create_new(true).open(&guard) {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            let abandoned = fs::metadata(&guard)
                .and_then(|metadata| metadata.modified())
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok())
                .is_some_and(|age| age > LOCK_STALE_AFTER);
            if abandoned {
                tracing::warn!(guard = %guard.display(), "removing abandoned eviction guard");
                release_lock_path(&guard);
            }
            return Ok(false);
        }
        Err(err) => {
            return Err(LockError::Io {
                path: guard,
                message: format!("failed to create eviction guard: {err}"),
            });
        }
    }

    let current = read_lock_info(path);
    let outcome = if !path.exists() {
        Ok(true)
    } else if current.as_ref() == observed && lock_is_stale(path, current.as_ref()) {
        remove_file_if_exists(path)
            .map(|()| true)
            .map_err(|err| LockError::Io {
                path: path.to_path_buf(),
                message: format!("failed to remove stale lock: {err}"),
            })
    } else {
        tracing::debug!(lock = %path.display(), "lock changed hands during eviction");
        Ok(false)
    };
    release_lock_path(&guard);
    outcome
}

fn read_lock_info(path: &Path) -> Option<LockInfo> {
    let raw = fs::read(path).ok()?;
    serde_json::from_slice(&raw).ok()
}

fn lock_is_stale(path: &Path, holder: Option<&LockInfo>) -> bool {
    let age = match holder {
        Some(info) => Utc::now()
            .signed_duration_since(info.timestamp)
            .to_std()
            .ok(),
        None => fs::metadata(path)
            .and_then(|metadata| metadata.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok()),
    };
    age.is_some_and(|age| age > LOCK_STALE_AFTER)
}
