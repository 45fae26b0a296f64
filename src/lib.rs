pub mod cli;
pub mod clock;
pub mod identity;
pub mod lock;
pub mod logging;
pub mod paths;
pub mod pidfile;
pub mod policy;
pub mod probe;
pub mod store;
pub mod supervisor;

#[cfg(test)]
mod testing;

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::Cli;
use crate::clock::SystemClock;
use crate::identity::RunIdentity;
use crate::lock::manager::{LockManager, Outcome};
use crate::paths::LockPaths;
use crate::pidfile::PidFile;
use crate::policy::LockPolicy;
use crate::probe::SignalProbe;
use crate::store::FsLockStore;
use crate::supervisor::Supervisor;

/// Run one locked invocation end to end: acquire (or decline), supervise the
/// command, release.
///
/// Exits cleanly both after the command ran (its own exit status is reported
/// as a diagnostic only) and after declining because a live holder owns the
/// lock and `--wait` was not given.
///
/// # Errors
/// Returns an error only for unexpected OS failures; "already locked" is not
/// one.
pub fn run(cli: &Cli) -> Result<()> {
    let identity = cli.id.as_ref().map_or_else(
        || RunIdentity::derive(&cli.command),
        |id| RunIdentity::explicit(id.clone()),
    );
    let timeout = cli.timeout.map(Duration::from_secs);
    let policy = LockPolicy::default().validated()?;

    let dir = paths::lock_dir();
    let lock_paths = LockPaths::new(&dir, &identity);
    debug!(identity = %identity, dir = %dir.display(), "coordinating through lock directory");

    // Created before any lock activity, removed on every exit path by drop.
    let pidfile = PidFile::create(&dir)?;

    let store = FsLockStore;
    let probe = SignalProbe;
    let clock = SystemClock;

    let manager = LockManager::new(
        &store,
        &probe,
        &clock,
        policy,
        &lock_paths,
        pidfile.path(),
        timeout,
        cli.wait,
    );

    match manager.acquire()? {
        Outcome::Held => {
            info!(identity = %identity, "another instance is running; not executing");
            Ok(())
        }
        Outcome::Acquired(release) => {
            let outcome = Supervisor::new(&clock, policy, timeout).run(&cli.command);
            // The guard removes the primary record here whether the
            // supervisor succeeded or not.
            drop(release);
            let outcome = outcome?;
            info!(identity = %identity, ?outcome, "command finished");
            Ok(())
        }
    }
}
