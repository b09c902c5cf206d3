use clap::Parser;
use colored::Colorize;
use tracing::debug;

mod cli;
mod commands;

use cli::Args;
use commands::execute_command;

fn main() {
    let args = Args::parse();

    let _log_guard =
        regsweep_logging::init_with(regsweep_logging::LogSettings::from_env().with_debug(args.debug));
    debug!(command = ?args.command, "Starting regsweep");

    // Registry failures are reported per repository and never reach here;
    // anything that does is a configuration or usage problem.
    if let Err(e) = execute_command(args) {
        eprintln!("{} {:#}", "❌ Error:".red().bold(), e);
        std::process::exit(1);
    }
}
