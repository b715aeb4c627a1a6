//! `callerid list set|clear|show` — caller lists and the call directory.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use callerid_core::payload::parse_caller_list;
use callerid_core::{CallerListStore, CallerRecord, Classification};
use callerid_daemon::CallerListOutcome;

use super::{home_dir, open_bridge, read_payload};

#[derive(Subcommand, Debug)]
pub enum ListCommand {
    /// Apply a `{"type": ..., "items": [...]}` caller list and reload the directory.
    Set(SetArgs),

    /// Drop both caller lists and every directory entry.
    Clear,

    /// Print the stored caller lists.
    Show(ShowArgs),
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Payload file, or `-` to read stdin.
    pub payload: String,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run(command: ListCommand) -> Result<()> {
    match command {
        ListCommand::Set(args) => set(args),
        ListCommand::Clear => clear(),
        ListCommand::Show(args) => show(args),
    }
}

fn set(args: SetArgs) -> Result<()> {
    let home = home_dir()?;
    let raw = read_payload(&args.payload)?;
    let payload = parse_caller_list(&raw).context("invalid caller list payload")?;
    let bridge = open_bridge(&home)?;

    let outcome = bridge
        .set_caller_list(&payload)
        .with_context(|| format!("setCallerList '{}' failed", payload.list_type.as_str()))?;
    println!(
        "✓ caller list '{}' applied ({} items)",
        payload.list_type.as_str(),
        payload.items.len()
    );
    print_outcome(&outcome);
    Ok(())
}

fn clear() -> Result<()> {
    let home = home_dir()?;
    let bridge = open_bridge(&home)?;
    let outcome = bridge
        .clear_caller_list()
        .context("clearCallerList failed")?;
    println!("✓ caller lists cleared");
    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &CallerListOutcome) {
    println!(
        "  stored: {} allowed, {} blocked",
        outcome.store.allowed, outcome.store.blocked
    );
    let summary = &outcome.directory;
    println!(
        "  directory: {:?} (+{} blocking, +{} identification, -{} removed)",
        summary.kind, summary.blocking_added, summary.identification_added, summary.removed
    );
    if summary.skipped > 0 {
        println!(
            "  {} {} numbers do not fit a directory entry and were skipped",
            "!".yellow().bold(),
            summary.skipped
        );
    }
}

#[derive(Serialize)]
struct ListsJson<'a> {
    allowed: &'a [CallerRecord],
    blocked: &'a [CallerRecord],
}

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "number")]
    number: String,
    #[tabled(rename = "label")]
    label: String,
    #[tabled(rename = "source")]
    source: String,
}

fn show(args: ShowArgs) -> Result<()> {
    let home = home_dir()?;
    let store = CallerListStore::open_at(&home);

    if args.json {
        let payload = ListsJson {
            allowed: store.records(Classification::Allowed),
            blocked: store.records(Classification::Blocked),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("failed to serialize caller lists")?
        );
        return Ok(());
    }

    for classification in Classification::all() {
        let records = store.records(*classification);
        let heading = match classification {
            Classification::Allowed => "ALLOWED".green().bold(),
            Classification::Blocked => "BLOCKED".red().bold(),
        };
        println!("{heading} ({})", records.len());
        if records.is_empty() {
            println!("  (empty)");
            continue;
        }
        let rows: Vec<RecordRow> = records
            .iter()
            .map(|record| RecordRow {
                number: record.phone_number.to_string(),
                label: record.label.clone(),
                source: record
                    .source_id
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "-".to_string()),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }
    Ok(())
}
