//! The durable job lock, stored as a small file naming the pid of the
//! process that owns the print slot.

use std::{
    ffi::OsString,
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::LockStore;

/// Diagnostic information about the owner of the print slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LockOwner {
    /// OS process id of the running slice-and-print stage.
    pub pid: u32,

    /// When the lock record was written, if the filesystem can tell us.
    pub since: Option<DateTime<Utc>>,
}

/// Possible errors returned when touching the lock record.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock record exists, but could not be read.
    #[error("failed to read lock record {}", path.display())]
    Read {
        /// Path to the lock record.
        path: PathBuf,
        /// Underlying i/o error.
        #[source]
        source: io::Error,
    },

    /// The lock record could not be written.
    #[error("failed to write lock record {}", path.display())]
    Write {
        /// Path to the lock record.
        path: PathBuf,
        /// Underlying i/o error.
        #[source]
        source: io::Error,
    },

    /// Exclusive use of the print slot could not be taken.
    #[error("failed to lock {}", path.display())]
    Guard {
        /// Path to the guard file.
        path: PathBuf,
        /// Underlying i/o error.
        #[source]
        source: io::Error,
    },

    /// The lock record could not be removed.
    #[error("failed to remove lock record {}", path.display())]
    Remove {
        /// Path to the lock record.
        path: PathBuf,
        /// Underlying i/o error.
        #[source]
        source: io::Error,
    },
}

/// [LockStore] backed by a pid file on disk, so the lock outlives (and is
/// shared between) the processes that check it.
#[derive(Clone, Debug)]
pub struct FileLockStore {
    path: PathBuf,
}

/// An exclusive `flock` on a file beside the lock record. Dropping it
/// (or the death of the process holding it) lets the next holder in.
pub struct SubmitGuard {
    #[cfg(unix)]
    _lock: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

impl SubmitGuard {
    fn open(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).truncate(false).write(true).open(path)
    }

    #[cfg(unix)]
    fn lock(path: &Path) -> io::Result<Self> {
        use nix::fcntl::{Flock, FlockArg};

        let lock = Flock::lock(Self::open(path)?, FlockArg::LockExclusive).map_err(|(_, errno)| io::Error::from(errno))?;
        Ok(Self { _lock: lock })
    }

    /// Without `flock` only the in-process callers are kept apart.
    #[cfg(not(unix))]
    fn lock(path: &Path) -> io::Result<Self> {
        Ok(Self { _file: Self::open(path)? })
    }
}

impl std::fmt::Debug for SubmitGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmitGuard").finish_non_exhaustive()
    }
}

/// What's on disk right now.
enum Record {
    Absent,
    Owner(LockOwner),
    Garbage(String),
}

impl FileLockStore {
    /// Create a new [FileLockStore] using the record at `path`.
    pub fn new(path: &Path) -> Self {
        Self { path: path.to_owned() }
    }

    /// Return the path on the filesystem.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the path of a file living beside the lock record.
    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.file_name().map(OsString::from).unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    async fn create_parent(&self) -> io::Result<()> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent).await,
            _ => Ok(()),
        }
    }

    async fn read(&self) -> Result<Record, LockError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Record::Absent),
            Err(source) => {
                return Err(LockError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let Ok(pid) = contents.trim().parse::<u32>() else {
            return Ok(Record::Garbage(contents));
        };

        let since = tokio::fs::metadata(&self.path)
            .await
            .and_then(|metadata| metadata.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        Ok(Record::Owner(LockOwner { pid, since }))
    }

    async fn remove(&self) -> Result<(), LockError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LockError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write_error(&self, source: io::Error) -> LockError {
        LockError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl LockStore for FileLockStore {
    type Error = LockError;
    type Guard = SubmitGuard;

    async fn exclusive(&self) -> Result<SubmitGuard, LockError> {
        let path = self.sibling(".guard");
        let guard_error = |source| LockError::Guard {
            path: path.clone(),
            source,
        };
        self.create_parent().await.map_err(guard_error)?;

        let blocking = path.clone();
        let guard = tokio::task::spawn_blocking(move || SubmitGuard::lock(&blocking))
            .await
            .map_err(io::Error::other)
            .and_then(|locked| locked)
            .map_err(guard_error)?;

        tracing::debug!(path = format!("{:?}", path), "print slot guard taken");
        Ok(guard)
    }

    async fn is_locked(&self) -> Result<bool, LockError> {
        match self.read().await? {
            Record::Absent => Ok(false),
            Record::Owner(owner) if process_alive(owner.pid) => Ok(true),
            Record::Owner(owner) => {
                tracing::warn!(pid = owner.pid, "reclaiming stale lock left by a dead process");
                self.remove().await?;
                Ok(false)
            }
            Record::Garbage(contents) => {
                tracing::warn!(contents = contents.as_str(), "reclaiming unreadable lock record");
                self.remove().await?;
                Ok(false)
            }
        }
    }

    async fn acquire(&self, pid: u32) -> Result<(), LockError> {
        self.create_parent().await.map_err(|e| self.write_error(e))?;

        // Readers must never see a half written pid.
        let staging = self.sibling(".tmp");
        tokio::fs::write(&staging, pid.to_string())
            .await
            .map_err(|e| self.write_error(e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| self.write_error(e))?;

        tracing::debug!(pid = pid, path = format!("{:?}", self.path), "lock acquired");
        Ok(())
    }

    async fn release(&self) -> Result<(), LockError> {
        self.remove().await?;
        tracing::debug!(path = format!("{:?}", self.path), "lock released");
        Ok(())
    }

    async fn release_if_owner(&self, pid: u32) -> Result<bool, LockError> {
        match self.read().await? {
            Record::Owner(owner) if owner.pid == pid => {
                self.remove().await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn current_owner(&self) -> Result<Option<LockOwner>, LockError> {
        Ok(match self.read().await? {
            Record::Owner(owner) => Some(owner),
            Record::Absent | Record::Garbage(_) => None,
        })
    }
}

/// Return true if `pid` names a process that still exists, even one we're
/// not permitted to signal.
#[cfg(unix)]
pub(crate) fn process_alive(pid: u32) -> bool {
    use nix::{errno::Errno, sys::signal::kill, unistd::Pid};

    // 0 and anything past i32::MAX would address a process group.
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }

    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Without a liveness probe a record is only ever cleared by its owner.
#[cfg(not(unix))]
pub(crate) fn process_alive(_pid: u32) -> bool {
    true
}
