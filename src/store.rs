use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};

/// Result of an atomic create-if-absent link operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Created,
    AlreadyExists,
}

/// The atomic filesystem primitives the lock protocol rests on.
///
/// The two create operations must be atomic with respect to concurrent
/// callers on the same filesystem and must report "already exists" as an
/// outcome, not an error. "Not found" on reads and removals is likewise an
/// expected signal. Any other OS failure is fatal and propagates; the
/// protocol deliberately attempts no recovery from those.
pub trait LockStore {
    /// Atomically hard-link `target` at `link`, failing if `link` exists.
    fn create_hard_link(&self, target: &Path, link: &Path) -> Result<LinkOutcome>;

    /// Atomically create a symlink to `target` at `link`, failing if `link` exists.
    fn create_symlink(&self, target: &Path, link: &Path) -> Result<LinkOutcome>;

    /// Modification time of `path` without following symlinks, or `None` if absent.
    fn mtime_no_follow(&self, path: &Path) -> Result<Option<SystemTime>>;

    /// Follow the record at `path` to the holder's pid file and parse its pid.
    ///
    /// `None` when the record or the pid file has vanished, or when the
    /// content does not parse; races here are expected, not errors.
    fn read_owner_pid(&self, path: &Path) -> Result<Option<i32>>;

    /// Remove `path`, treating an already-absent path as a no-op.
    fn remove_if_exists(&self, path: &Path) -> Result<()>;

    /// Remove `path` only if its modification time still equals `seen`.
    ///
    /// Used to break a stale secondary lock without racing another waiter
    /// that broke and recreated it in the meantime. Returns whether the
    /// removal happened.
    fn remove_if_unchanged(&self, path: &Path, seen: SystemTime) -> Result<bool>;
}

/// Real store operating on a shared lock directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLockStore;

fn absent_is_none<T>(res: io::Result<T>) -> io::Result<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

impl LockStore for FsLockStore {
    fn create_hard_link(&self, target: &Path, link: &Path) -> Result<LinkOutcome> {
        match fs::hard_link(target, link) {
            Ok(()) => Ok(LinkOutcome::Created),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(LinkOutcome::AlreadyExists),
            Err(e) => Err(e).with_context(|| {
                format!("failed to link {} at {}", target.display(), link.display())
            }),
        }
    }

    fn create_symlink(&self, target: &Path, link: &Path) -> Result<LinkOutcome> {
        match symlink(target, link) {
            Ok(()) => Ok(LinkOutcome::Created),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(LinkOutcome::AlreadyExists),
            Err(e) => Err(e).with_context(|| {
                format!("failed to symlink {} at {}", target.display(), link.display())
            }),
        }
    }

    fn mtime_no_follow(&self, path: &Path) -> Result<Option<SystemTime>> {
        let meta = absent_is_none(fs::symlink_metadata(path))
            .with_context(|| format!("failed to stat {}", path.display()))?;
        match meta {
            Some(m) => {
                let mtime = m
                    .modified()
                    .with_context(|| format!("no modification time for {}", path.display()))?;
                Ok(Some(mtime))
            }
            None => Ok(None),
        }
    }

    fn read_owner_pid(&self, path: &Path) -> Result<Option<i32>> {
        // Reads through the link: a hard link yields the pid file content
        // directly, a symlink is followed to it.
        let content = absent_is_none(fs::read_to_string(path))
            .with_context(|| format!("failed to read lock record {}", path.display()))?;
        Ok(content.and_then(|s| s.trim().parse().ok()))
    }

    fn remove_if_exists(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
        }
    }

    fn remove_if_unchanged(&self, path: &Path, seen: SystemTime) -> Result<bool> {
        // Not atomic against a break-and-recreate in the stat-to-remove
        // window, but it rejects every case where the record demonstrably
        // changed since we judged it stale.
        match self.mtime_no_follow(path)? {
            Some(mtime) if mtime == seen => {
                self.remove_if_exists(path)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
