//! callerid — caller identification and call blocking from the command line.
//!
//! # Usage
//!
//! ```text
//! callerid list set <payload.json|->
//! callerid list clear
//! callerid list show [--json]
//! callerid lookup <number> [--json]
//! callerid contacts sync <payload.json|-> [--vacation] [--json]
//! callerid contacts plan <payload.json|-> [--vacation]
//! callerid contacts clear
//! callerid contacts block|unblock <source-id>
//! callerid mode [--json]
//! callerid status [--json]
//! callerid daemon start|stop|status
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    contacts::ContactsCommand, daemon::DaemonCommand, list::ListCommand, lookup::LookupArgs,
    mode::ModeArgs, status::StatusArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "callerid",
    version,
    about = "Caller identification, call blocking and contact sync",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage the allowed and blocked caller lists.
    List {
        #[command(subcommand)]
        command: ListCommand,
    },

    /// Look up who is calling from a number.
    Lookup(LookupArgs),

    /// Sync, plan, clear and block contacts in the contacts store.
    Contacts {
        #[command(subcommand)]
        command: ContactsCommand,
    },

    /// Show the resolved caller-id mode.
    Mode(ModeArgs),

    /// Show caller lists, directory and contact sync state.
    Status(StatusArgs),

    /// Run or query the background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::List { command } => commands::list::run(command),
        Commands::Lookup(args) => args.run(),
        Commands::Contacts { command } => commands::contacts::run(command),
        Commands::Mode(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
