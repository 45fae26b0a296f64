use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

/// Narrow capability over the OS process table: liveness checks and the
/// graceful-then-forced termination pair used on stale lock holders.
pub trait ProcessProbe {
    fn is_alive(&self, pid: i32) -> bool;

    /// Ask the process to exit (SIGTERM). A target that is already gone is
    /// success, not an error.
    fn terminate_gracefully(&self, pid: i32) -> Result<()>;

    /// End the process unconditionally (SIGKILL). Already-gone is success.
    fn terminate_forcibly(&self, pid: i32) -> Result<()>;
}

/// Signal-based probe using nix for type-safe signal handling.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProbe;

fn send(pid: i32, sig: Signal) -> Result<()> {
    match signal::kill(Pid::from_raw(pid), sig) {
        // ESRCH: target already gone, which is what we wanted
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to send {sig:?} to pid {pid}")),
    }
}

impl ProcessProbe for SignalProbe {
    fn is_alive(&self, pid: i32) -> bool {
        // Signal 0 probes existence without delivering anything. EPERM means
        // the process exists but belongs to someone else: still alive.
        match signal::kill(Pid::from_raw(pid), None) {
            Ok(()) | Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn terminate_gracefully(&self, pid: i32) -> Result<()> {
        send(pid, Signal::SIGTERM)
    }

    fn terminate_forcibly(&self, pid: i32) -> Result<()> {
        send(pid, Signal::SIGKILL)
    }
}
