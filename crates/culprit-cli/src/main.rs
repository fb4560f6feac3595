mod cmd_find;
mod cmd_status;
mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "culprit",
    version,
    about = "Find the commit that pushed a benchmark metric out of range"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bisect a commit range against an acceptance band
    Find(cmd_find::FindArgs),
    /// Show the ledger of a run
    Status {
        /// Run directory (culprit_output/culprit_find-...)
        run_dir: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Find(args) => cmd_find::execute(&args),
        Command::Status { run_dir, json } => cmd_status::execute(&run_dir, json),
    }
}
