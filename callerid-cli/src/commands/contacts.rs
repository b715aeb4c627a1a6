//! `callerid contacts` — materialize the directory into the contacts store.

use std::collections::HashMap;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use callerid_core::payload::parse_contact_payload;
use callerid_core::{paths, SourceId};
use callerid_sync::engine::{self, NAMESPACE_GROUP};
use callerid_sync::{transform, ChunkReport, ContactStore, LocalContactStore, SyncReport};

use super::{home_dir, open_bridge, read_payload};

#[derive(Subcommand, Debug)]
pub enum ContactsCommand {
    /// Reconcile the contacts store with a `{"items": [...]}` payload.
    Sync(SyncArgs),

    /// Show what a sync would change without touching the store.
    Plan(PlanArgs),

    /// Delete every contact this tool created.
    Clear,

    /// Send a synced contact straight to voicemail.
    Block(SourceArgs),

    /// Let a synced contact ring again.
    Unblock(SourceArgs),
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Payload file, or `-` to read stdin.
    pub payload: String,

    /// Vacation mode: silence everyone except favourites.
    #[arg(long)]
    pub vacation: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Payload file, or `-` to read stdin.
    pub payload: String,

    #[arg(long)]
    pub vacation: bool,
}

#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Source id of the contact (its ihash, guid, or datasource hash).
    pub source_id: String,
}

pub fn run(command: ContactsCommand) -> Result<()> {
    match command {
        ContactsCommand::Sync(args) => sync(args),
        ContactsCommand::Plan(args) => plan(args),
        ContactsCommand::Clear => clear(),
        ContactsCommand::Block(args) => set_blocked(args, true),
        ContactsCommand::Unblock(args) => set_blocked(args, false),
    }
}

fn sync(args: SyncArgs) -> Result<()> {
    let home = home_dir()?;
    let raw = read_payload(&args.payload)?;
    let payload = parse_contact_payload(&raw).context("invalid contact payload")?;
    let bridge = open_bridge(&home)?;

    let outcome = bridge
        .sync_contacts(payload, args.vacation)
        .context("syncContacts rejected")?
        .wait_blocking()
        .context("contact sync failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("failed to serialize sync outcome")?
        );
        return Ok(());
    }

    println!("✓ contacts synced into group {}", outcome.group);
    print_report(&outcome.report);
    Ok(())
}

fn plan(args: PlanArgs) -> Result<()> {
    let home = home_dir()?;
    let raw = read_payload(&args.payload)?;
    let payload = parse_contact_payload(&raw).context("invalid contact payload")?;
    let desired = transform::desired_records(&payload, args.vacation)
        .context("invalid contact payload")?;

    let path = paths::contacts_store_path(&home);
    let store = LocalContactStore::open_at(&path)
        .with_context(|| format!("failed to open contact store {}", path.display()))?;
    let existing = match store
        .find_group(NAMESPACE_GROUP)
        .context("failed to look up contact group")?
    {
        Some(group) => store
            .group_members(group)
            .context("failed to read contact group members")?,
        None => HashMap::new(),
    };

    let plan = engine::plan(&existing, &desired, args.vacation);
    println!(
        "[plan] {} to insert, {} to keep ({} flag changes, {} unblocks), {} to delete",
        plan.diff.to_insert.len(),
        plan.diff.to_update.len(),
        plan.update_ids.len(),
        plan.unblock_ids.len(),
        plan.diff.to_delete.len()
    );
    for key in &plan.diff.to_insert {
        println!("  {} {key}", "+".green());
    }
    for key in &plan.diff.to_delete {
        println!("  {} {key}", "-".red());
    }
    Ok(())
}

fn clear() -> Result<()> {
    let home = home_dir()?;
    let bridge = open_bridge(&home)?;
    let report = bridge.clear_contacts().context("clearContacts failed")?;
    println!("✓ deleted {} contacts", report.applied);
    if report.failed_batches > 0 {
        println!(
            "  {} {} batches failed and were left in place",
            "!".yellow().bold(),
            report.failed_batches
        );
    }
    Ok(())
}

fn set_blocked(args: SourceArgs, blocked: bool) -> Result<()> {
    let home = home_dir()?;
    let bridge = open_bridge(&home)?;
    let source_id = SourceId::from(args.source_id);
    bridge
        .set_local_contact_blocked(&source_id, blocked)
        .with_context(|| format!("failed to update contact '{source_id}'"))?;
    if blocked {
        println!("✓ '{source_id}' now goes to voicemail");
    } else {
        println!("✓ '{source_id}' rings again");
    }
    Ok(())
}

#[derive(Tabled)]
struct PassRow {
    #[tabled(rename = "pass")]
    pass: &'static str,
    #[tabled(rename = "applied")]
    applied: usize,
    #[tabled(rename = "skipped")]
    skipped: usize,
    #[tabled(rename = "batches")]
    batches: usize,
    #[tabled(rename = "failed")]
    failed: usize,
}

fn pass_row(pass: &'static str, report: &ChunkReport) -> PassRow {
    PassRow {
        pass,
        applied: report.applied,
        skipped: report.skipped,
        batches: report.batches,
        failed: report.failed_batches,
    }
}

fn print_report(report: &SyncReport) {
    let rows = vec![
        pass_row("deleted", &report.deleted),
        pass_row("updated", &report.updated),
        pass_row("unblocked", &report.unblocked),
        pass_row("inserted", &report.inserted),
        pass_row("avatars", &report.avatars),
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let failed = report.failed_batches();
    if failed > 0 {
        println!(
            "{} {failed} batches failed; their contacts will be retried on the next sync",
            "!".yellow().bold()
        );
    }
}
