//! Common traits used at the seams of the print pipeline, where the
//! orchestrator hands off to storage or to a remote collaborator.

use std::{
    future::Future,
    path::{Path, PathBuf},
};

use crate::LockOwner;

/// [Fetch] retrieves the source models of a job into a local slot.
pub trait Fetch {
    /// Error type returned by this trait.
    type Error: Into<anyhow::Error>;

    /// Retrieve every url, in order, into the `slot`, returning the local
    /// path of each fetched model.
    fn fetch(&self, urls: &[String], slot: &Path) -> impl Future<Output = Result<Vec<PathBuf>, Self::Error>>;
}

/// [LockStore] is the durable record of which process currently owns the
/// single print slot.
///
/// The presence of a record naming a live process is the only authority
/// for "a job is in progress". A record naming a dead process is stale,
/// and is reclaimed the next time it is checked.
pub trait LockStore {
    /// Error type returned by this trait.
    type Error: Into<anyhow::Error>;

    /// Held while a job start checks and takes the print slot.
    type Guard;

    /// Wait for exclusive use of the print slot's check-and-acquire
    /// sequence. This excludes every other holder, including ones in
    /// other processes, until the returned guard is dropped.
    fn exclusive(&self) -> impl Future<Output = Result<Self::Guard, Self::Error>>;

    /// Return true if a lock record exists and the process it names is
    /// still alive. A stale record is deleted, and `false` returned.
    fn is_locked(&self) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Write a lock record naming `pid`. Callers must hold
    /// [LockStore::exclusive] and have seen [LockStore::is_locked] return
    /// false first.
    fn acquire(&self, pid: u32) -> impl Future<Output = Result<(), Self::Error>>;

    /// Delete the lock record. Releasing an absent record is not an error.
    fn release(&self) -> impl Future<Output = Result<(), Self::Error>>;

    /// Delete the lock record only if it still names `pid`. Returns true
    /// if a record was removed.
    fn release_if_owner(&self, pid: u32) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Return the current owner, if a record exists.
    fn current_owner(&self) -> impl Future<Output = Result<Option<LockOwner>, Self::Error>>;
}
