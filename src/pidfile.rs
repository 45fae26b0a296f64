use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

/// This invocation's self descriptor: a uniquely named file in the lock
/// directory holding our pid as text.
///
/// Lock records are links to this file, so other invocations resolve the
/// holder by reading through the link; they never write it. The file is
/// removed exactly once, on drop, on every exit path.
pub struct PidFile {
    file: NamedTempFile,
    pid: i32,
}

impl PidFile {
    /// Create the pid file in `dir` and write our pid into it.
    ///
    /// # Errors
    /// Fails on any I/O error; there is no recovery from a lock directory we
    /// cannot write to.
    pub fn create(dir: &Path) -> Result<Self> {
        let pid = i32::try_from(std::process::id()).context("pid out of range")?;
        let mut file = tempfile::Builder::new()
            .prefix(&format!("runlock.{pid}."))
            .suffix(".pid")
            .tempfile_in(dir)
            .with_context(|| format!("failed to create pid file in {}", dir.display()))?;
        write!(file, "{pid}").context("failed to write pid file")?;
        Ok(Self { file, pid })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    #[must_use]
    pub const fn pid(&self) -> i32 {
        self.pid
    }
}
