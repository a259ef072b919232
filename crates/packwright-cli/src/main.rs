use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod completion;
mod config;
mod dispatch;
mod logging;
mod render;

use completion::CliCompletionShell;

#[derive(Parser, Debug)]
#[command(name = "packwright")]
#[command(about = "Assemble content stores from reusable packs", long_about = None)]
struct Cli {
    /// State directory holding config, sessions and installed ledgers.
    #[arg(long, env = "PACKWRIGHT_HOME", global = true)]
    state_root: Option<PathBuf>,
    #[arg(long, env = "PACKWRIGHT_REGISTRY", global = true)]
    registry_root: Option<PathBuf>,
    #[arg(long, env = "PACKWRIGHT_TARGET", global = true)]
    target_root: Option<PathBuf>,
    #[arg(long, global = true)]
    source: Option<String>,
    #[arg(long = "ref", default_value = "main", global = true)]
    reference: String,
    #[arg(long, env = "PACKWRIGHT_USER", global = true)]
    user: Option<String>,
    /// Log filter, e.g. `debug` or `packwright_session=trace`.
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Print command responses as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a new selection session for the source and ref.
    Init,
    Select {
        pack: String,
    },
    Deselect {
        pack: String,
        /// Also deselect every pack that depends on it.
        #[arg(long)]
        cascade: bool,
    },
    SetTitle {
        pack: String,
        page: String,
        title: String,
    },
    SetPrefix {
        pack: String,
        prefix: String,
    },
    Refresh,
    Clear,
    /// Emit the operation list and close the session.
    Apply {
        /// Record the emitted operations in the installed ledger.
        #[arg(long)]
        record: bool,
    },
    /// Run a raw JSON command request (`-` reads stdin).
    Exec {
        request: String,
    },
    Preflight,
    Graph,
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level.as_deref())?;
    dispatch::run_cli(cli)
}
