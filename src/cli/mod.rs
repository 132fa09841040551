//! CLI module for kvguard
//!
//! `kvguard --data-dir DIR [--config FILE] [--audit-log FILE] [-v] <command>`
//!
//! Commands: put, get, rm, history, restore, check, recover, cleanup,
//! usage, health, export, import, predict.

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{execute, run_command, Context};
pub use errors::{CliError, CliResult};
pub use io::{parse_value, write_json};

use crate::observability::{Logger, Severity};

/// Parse the process arguments and run the command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    if !cli.verbose {
        Logger::set_min_severity(Severity::Error);
    }
    run_command(cli)
}
