use std::process::{Child, Command, ExitStatus};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::policy::LockPolicy;

/// How the supervised child ended. Diagnostic only; lock release does not
/// depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildOutcome {
    /// Normal exit with a code.
    Exited(i32),
    /// Killed by a signal (including our own timeout kill).
    Signaled(i32),
    /// Status the platform could not decode.
    Unknown,
}

/// Runs the user's command once the lock is held.
pub struct Supervisor<'a> {
    clock: &'a dyn Clock,
    policy: LockPolicy,
    timeout: Option<Duration>,
}

impl<'a> Supervisor<'a> {
    pub fn new(clock: &'a dyn Clock, policy: LockPolicy, timeout: Option<Duration>) -> Self {
        Self {
            clock,
            policy,
            timeout,
        }
    }

    /// Spawn `command` through a shell and wait for it, enforcing the
    /// configured timeout with a final kill.
    ///
    /// # Errors
    /// Fails if the shell cannot be spawned or the child cannot be waited on;
    /// the child's own exit status is never an error.
    pub fn run(&self, command: &str) -> Result<ChildOutcome> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .spawn()
            .with_context(|| format!("failed to spawn `{command}`"))?;
        info!(pid = child.id(), "running command");

        let status = match self.timeout {
            None => child.wait().context("failed to wait for command")?,
            Some(limit) => self.wait_with_deadline(&mut child, limit)?,
        };
        Ok(classify(status))
    }

    /// Poll for completion; past the deadline, kill the child and reap it.
    fn wait_with_deadline(&self, child: &mut Child, limit: Duration) -> Result<ExitStatus> {
        let started = self.clock.now();
        loop {
            if let Some(status) = child.try_wait().context("failed to poll command")? {
                return Ok(status);
            }
            let elapsed = self.clock.now().duration_since(started).unwrap_or_default();
            if elapsed > limit {
                warn!(
                    pid = child.id(),
                    "command exceeded {}s timeout; killing",
                    limit.as_secs()
                );
                child.kill().context("failed to kill command")?;
                return child.wait().context("failed to reap killed command");
            }
            self.clock.sleep(self.policy.child_poll);
        }
    }
}

fn classify(status: ExitStatus) -> ChildOutcome {
    use std::os::unix::process::ExitStatusExt;

    if let Some(code) = status.code() {
        ChildOutcome::Exited(code)
    } else if let Some(sig) = status.signal() {
        ChildOutcome::Signaled(sig)
    } else {
        ChildOutcome::Unknown
    }
}
