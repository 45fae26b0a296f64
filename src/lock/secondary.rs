use std::path::Path;

use anyhow::Result;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::policy::LockPolicy;
use crate::store::{LinkOutcome, LockStore};

/// Short-lived gate serializing inspect/act passes on the primary lock.
///
/// Held only for a single check/act sequence, never across a sleep. Its age
/// is independently monitored: a record older than the staleness ceiling is
/// considered abandoned and force-broken by any waiter, which bounds how long
/// a crashed holder can stall everyone else.
pub struct SecondaryLock<'a> {
    store: &'a dyn LockStore,
    clock: &'a dyn Clock,
    policy: &'a LockPolicy,
    path: &'a Path,
    pidfile: &'a Path,
}

impl<'a> SecondaryLock<'a> {
    pub fn new(
        store: &'a dyn LockStore,
        clock: &'a dyn Clock,
        policy: &'a LockPolicy,
        path: &'a Path,
        pidfile: &'a Path,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
            path,
            pidfile,
        }
    }

    /// Block until the gate is held.
    ///
    /// The loop has no upper bound; progress is guaranteed by the staleness
    /// ceiling, since holders never keep the gate longer than one pass.
    ///
    /// # Errors
    /// Propagates unexpected store failures.
    pub fn acquire(self) -> Result<SecondaryGuard<'a>> {
        loop {
            if self.store.create_symlink(self.pidfile, self.path)? == LinkOutcome::Created {
                debug!(path = %self.path.display(), "acquired secondary lock");
                return Ok(SecondaryGuard {
                    store: self.store,
                    path: self.path,
                });
            }

            let Some(mtime) = self.store.mtime_no_follow(self.path)? else {
                // vanished between create and stat; retry immediately
                continue;
            };

            let age = self.clock.now().duration_since(mtime).unwrap_or_default();
            if age >= self.policy.secondary_stale {
                // Abandoned gate. Break it only if it has not changed since
                // we judged it stale; losing that race to another waiter just
                // means another pass through the loop.
                if self.store.remove_if_unchanged(self.path, mtime)? {
                    warn!(path = %self.path.display(), "broke abandoned secondary lock");
                }
                continue;
            }

            self.clock.sleep(self.policy.retry_interval);
        }
    }
}

/// Holds the gate; releasing is idempotent and also runs on drop, so an
/// error unwind cannot leave the gate held.
pub struct SecondaryGuard<'a> {
    store: &'a dyn LockStore,
    path: &'a Path,
}

impl Drop for SecondaryGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.remove_if_exists(self.path) {
            warn!(path = %self.path.display(), "failed to release secondary lock: {e:#}");
        }
    }
}
