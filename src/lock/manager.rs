use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Result;
use tracing::{debug, info, warn};

use super::secondary::SecondaryLock;
use crate::clock::Clock;
use crate::paths::LockPaths;
use crate::policy::LockPolicy;
use crate::probe::ProcessProbe;
use crate::store::{LinkOutcome, LockStore};

/// Terminal result of one acquisition attempt.
pub enum Outcome<'a> {
    /// This invocation owns the primary lock; dropping the guard releases it.
    Acquired(PrimaryGuard<'a>),
    /// A live, in-tolerance holder owns it and waiting was not requested.
    Held,
}

/// Decision of a single pass made under the secondary lock.
enum Pass {
    Acquired,
    /// A stale or timed-out holder was removed; retry immediately without
    /// assuming the retry will win.
    Broke,
    /// A live holder within tolerance owns the lock.
    Contended,
}

/// The acquisition state machine.
///
/// Orchestrates the secondary gate, the primary lock record and the process
/// probe: per outer pass it inspects the primary record under the gate,
/// claims it if free, reclaims it if the holder is dead or has exceeded the
/// configured timeout, and otherwise either declines or sleeps and retries.
pub struct LockManager<'a> {
    store: &'a dyn LockStore,
    probe: &'a dyn ProcessProbe,
    clock: &'a dyn Clock,
    policy: LockPolicy,
    paths: &'a LockPaths,
    pidfile: &'a Path,
    timeout: Option<Duration>,
    wait: bool,
}

impl<'a> LockManager<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: &'a dyn LockStore,
        probe: &'a dyn ProcessProbe,
        clock: &'a dyn Clock,
        policy: LockPolicy,
        paths: &'a LockPaths,
        pidfile: &'a Path,
        timeout: Option<Duration>,
        wait: bool,
    ) -> Self {
        Self {
            store,
            probe,
            clock,
            policy,
            paths,
            pidfile,
            timeout,
            wait,
        }
    }

    /// Run the acquisition loop until the primary lock is held or the
    /// attempt terminates with `Outcome::Held`.
    ///
    /// With `wait` and no timeout this blocks indefinitely until the holder
    /// releases; waiters get no fairness ordering, the next atomic link call
    /// to succeed wins.
    ///
    /// # Errors
    /// Propagates unexpected store or signal failures. The secondary lock is
    /// never left held across an error.
    pub fn acquire(&self) -> Result<Outcome<'a>> {
        // Cache of (mtime, owner pid) so an unchanged record is not re-read
        // every pass; liveness is still probed fresh each time.
        let mut seen: Option<(SystemTime, Option<i32>)> = None;
        loop {
            let gate = SecondaryLock::new(
                self.store,
                self.clock,
                &self.policy,
                &self.paths.secondary,
                self.pidfile,
            )
            .acquire()?;
            let pass = self.try_claim(&mut seen);
            // Released before any sleep and before returning; the gate bounds
            // the inspect/act sequence, nothing more.
            drop(gate);

            match pass? {
                Pass::Acquired => {
                    info!(path = %self.paths.primary.display(), "acquired instance lock");
                    return Ok(Outcome::Acquired(PrimaryGuard {
                        store: self.store,
                        path: self.paths.primary.clone(),
                    }));
                }
                Pass::Broke => {}
                Pass::Contended => {
                    if !self.wait {
                        return Ok(Outcome::Held);
                    }
                    self.clock.sleep(self.policy.retry_interval);
                }
            }
        }
    }

    /// One inspect/act pass over the primary record, caller holding the gate.
    fn try_claim(&self, seen: &mut Option<(SystemTime, Option<i32>)>) -> Result<Pass> {
        let Some(mtime) = self.store.mtime_no_follow(&self.paths.primary)? else {
            return match self.store.create_hard_link(self.pidfile, &self.paths.primary)? {
                LinkOutcome::Created => Ok(Pass::Acquired),
                // Cannot happen while we hold the gate, but never assume the win.
                LinkOutcome::AlreadyExists => Ok(Pass::Broke),
            };
        };

        let owner_pid = match seen {
            Some((m, pid)) if *m == mtime => *pid,
            _ => {
                let pid = self.store.read_owner_pid(&self.paths.primary)?;
                *seen = Some((mtime, pid));
                pid
            }
        };
        let owner = owner_pid.filter(|pid| self.probe.is_alive(*pid));

        let timed_out = self.timeout.is_some_and(|limit| {
            self.clock
                .now()
                .duration_since(mtime)
                .is_ok_and(|age| age > limit)
        });

        if let Some(pid) = owner {
            if !timed_out {
                debug!(pid, "instance lock held by live process");
                return Ok(Pass::Contended);
            }
            warn!(pid, "holder exceeded timeout; escalating termination");
            self.escalate(pid)?;
        } else {
            info!("reclaiming instance lock abandoned by dead holder");
        }

        self.store.remove_if_exists(&self.paths.primary)?;
        *seen = None;
        Ok(Pass::Broke)
    }

    /// Graceful-then-forced termination of a confirmed-live holder.
    ///
    /// The grace window is strictly shorter than the secondary staleness
    /// ceiling (enforced by `LockPolicy`), so escalating cannot cost us our
    /// own gate.
    fn escalate(&self, pid: i32) -> Result<()> {
        self.probe.terminate_gracefully(pid)?;

        let mut waited = Duration::ZERO;
        while waited < self.policy.grace_period {
            self.clock.sleep(self.policy.grace_poll);
            waited += self.policy.grace_poll;
            if !self.probe.is_alive(pid) {
                debug!(pid, "holder exited within the grace window");
                return Ok(());
            }
        }

        warn!(pid, "holder survived the grace window; killing");
        // No further polling: a kill that reports success (or "no such
        // process") is assumed to have worked.
        self.probe.terminate_forcibly(pid)
    }
}

/// Owns the primary lock record; dropping removes it unconditionally.
///
/// This is the guaranteed-release contract: every exit path after a
/// successful acquisition, including child-timeout kills and error unwinds,
/// frees the lock.
pub struct PrimaryGuard<'a> {
    store: &'a dyn LockStore,
    path: PathBuf,
}

impl Drop for PrimaryGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.remove_if_exists(&self.path) {
            warn!(path = %self.path.display(), "failed to release instance lock: {e:#}");
        }
    }
}
