//! `callerid daemon` — foreground daemon lifecycle.

use anyhow::{Context, Result};
use clap::Subcommand;

use callerid_core::paths::socket_path;
use callerid_daemon::{request_status, request_stop, start_blocking, DaemonError};

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run daemon in foreground (document watcher + socket server).
    Start,
    /// Request graceful daemon shutdown over Unix socket.
    Stop,
    /// Query daemon runtime status over Unix socket.
    Status,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = home_dir()?;

    match command {
        DaemonCommand::Start => {
            start_blocking(&home).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&home) {
            Ok(status) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
    }

    Ok(())
}
