//! `callerid status` — one view over every store under `~/.callerid/`.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use callerid_core::{config, paths, CallerListStore, Classification};
use callerid_daemon::{send_request, DaemonRequest};
use callerid_directory::LocalDirectory;
use callerid_sync::engine::NAMESPACE_GROUP;
use callerid_sync::state::{self, RunSummary};
use callerid_sync::{ContactStore, LocalContactStore};

use super::home_dir;

/// Arguments for `callerid status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let report = build_report(&home)?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(&report);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    mode: &'static str,
    daemon_running: bool,
    allowed: usize,
    blocked: usize,
    directory_blocking: usize,
    directory_identification: usize,
    synced_contacts: usize,
    synced_at: Option<DateTime<Utc>>,
    last_run: Option<RunSummary>,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "store")]
    store: &'static str,
    #[tabled(rename = "entries")]
    entries: String,
    #[tabled(rename = "detail")]
    detail: String,
}

fn build_report(home: &Path) -> Result<StatusReport> {
    let config = config::load_at(home).context("failed to load config")?;
    let callers = CallerListStore::open_at(home);

    let directory_path = paths::directory_store_path(home);
    let directory = LocalDirectory::open_at(&directory_path)
        .with_context(|| format!("failed to read directory {}", directory_path.display()))?;

    let contacts_path = paths::contacts_store_path(home);
    let contacts = LocalContactStore::open_at(&contacts_path)
        .with_context(|| format!("failed to open contact store {}", contacts_path.display()))?;
    let synced_contacts = match contacts
        .find_group(NAMESPACE_GROUP)
        .context("failed to look up contact group")?
    {
        Some(group) => contacts
            .group_members(group)
            .context("failed to read contact group members")?
            .len(),
        None => 0,
    };

    let saved = state::load_at(home).context("failed to load sync state")?;
    let daemon_running = send_request(home, &DaemonRequest::new("status"))
        .map(|response| response.ok)
        .unwrap_or(false);

    Ok(StatusReport {
        mode: config.caller_id_mode().as_str(),
        daemon_running,
        allowed: callers.records(Classification::Allowed).len(),
        blocked: callers.records(Classification::Blocked).len(),
        directory_blocking: directory.entries().blocking.len(),
        directory_identification: directory.entries().identification.len(),
        synced_contacts,
        synced_at: saved.synced_at,
        last_run: saved.last_run,
    })
}

fn print_table(report: &StatusReport) {
    let daemon = if report.daemon_running {
        "running".green().bold()
    } else {
        "stopped".bright_black().bold()
    };
    println!(
        "callerid v{} | {} | daemon {}",
        env!("CARGO_PKG_VERSION"),
        report.mode,
        daemon,
    );

    let last_sync = match (&report.synced_at, &report.last_run) {
        (Some(at), Some(run)) => format!(
            "{} ago: +{} ~{} -{}{}",
            format_age(*at),
            run.inserted,
            run.updated,
            run.deleted,
            if run.failed_batches > 0 {
                format!(", {} failed batches", run.failed_batches)
            } else {
                String::new()
            }
        ),
        (Some(at), None) => format!("{} ago", format_age(*at)),
        _ => "never".to_string(),
    };

    let rows = vec![
        StatusRow {
            store: "caller lists",
            entries: (report.allowed + report.blocked).to_string(),
            detail: format!("{} allowed, {} blocked", report.allowed, report.blocked),
        },
        StatusRow {
            store: "directory",
            entries: (report.directory_blocking + report.directory_identification).to_string(),
            detail: format!(
                "{} blocking, {} identification",
                report.directory_blocking, report.directory_identification
            ),
        },
        StatusRow {
            store: "contacts",
            entries: report.synced_contacts.to_string(),
            detail: format!("last sync {last_sync}"),
        },
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn format_age(timestamp: DateTime<Utc>) -> String {
    let seconds = Utc::now()
        .signed_duration_since(timestamp)
        .num_seconds()
        .max(0) as u64;
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
