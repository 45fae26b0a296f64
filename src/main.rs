use anyhow::Result;
use clap::Parser;
use runlock::cli::Cli;
use runlock::logging::init_tracing;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    runlock::run(&cli)
}
