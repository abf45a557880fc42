//! autobattle CLI entry point.
//!
//! Sets up logging, parses arguments with clap and runs the selected
//! subcommand via [`Cli::run`].

mod cli;
mod logging;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Best effort, before tracing is initialized.
    if let Some(dir) = cli.log_dir() {
        logging::cleanup_old_logs(dir);
    }

    let _guard = logging::init_tracing(cli.log_dir())?;

    cli.run()
}
