use clap::{ArgAction, Parser};

/// runlock command-line interface
#[derive(Parser, Debug, Clone)]
#[command(
    name = "runlock",
    version,
    about = "Run a shell command under a filesystem mutual-exclusion lock",
    long_about = None
)]
pub struct Cli {
    /// Command line to execute through a shell
    #[arg(value_name = "COMMAND")]
    pub command: String,

    /// Explicit run identity (defaults to a hash of COMMAND)
    #[arg(long, value_name = "STRING")]
    pub id: Option<String>,

    /// Seconds before a lock holder is reclaimed and the command is killed
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Wait for the lock instead of declining when it is already held
    #[arg(long)]
    pub wait: bool,

    /// Increase verbosity (-v, -vv). `RUST_LOG` overrides this.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}
