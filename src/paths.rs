use std::env;
use std::path::{Path, PathBuf};

use nix::unistd::Uid;

use crate::identity::RunIdentity;

/// Environment variable overriding the shared lock directory.
pub const DIR_ENV: &str = "RUNLOCK_DIR";

const PREFIX: &str = "runlock";

/// Shared directory holding pid files and lock records.
///
/// `$RUNLOCK_DIR` if set, otherwise the system temporary directory. All
/// coordinating invocations must resolve to the same directory, and it must
/// support hard links and symlinks atomically.
#[must_use]
pub fn lock_dir() -> PathBuf {
    env::var_os(DIR_ENV).map_or_else(env::temp_dir, PathBuf::from)
}

/// Deterministic paths of the two lock records for one run identity.
#[derive(Debug, Clone)]
pub struct LockPaths {
    /// Primary instance lock: named per (effective uid, identity) so distinct
    /// users never collide on the same slot.
    pub primary: PathBuf,
    /// Secondary gate serializing inspect/act passes: named per identity only.
    pub secondary: PathBuf,
}

impl LockPaths {
    #[must_use]
    pub fn new(dir: &Path, identity: &RunIdentity) -> Self {
        let uid = Uid::effective();
        Self {
            primary: dir.join(format!("{PREFIX}.{uid}.{identity}.lock")),
            secondary: dir.join(format!("{PREFIX}.{identity}.guard")),
        }
    }
}
