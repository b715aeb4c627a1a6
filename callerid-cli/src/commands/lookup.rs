//! `callerid lookup <number>`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::json;

use callerid_core::{CallerListStore, CallerLookup, PhoneNumber};

use super::home_dir;

#[derive(Args, Debug)]
pub struct LookupArgs {
    /// Number as the dialer reports it; `+` and spaces are ignored.
    pub number: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl LookupArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let store = CallerListStore::open_at(&home);
        let normalized = PhoneNumber::normalize(&self.number);
        let result = store.lookup(&self.number);

        if self.json {
            let payload = match &result {
                CallerLookup::Blocked { label } => {
                    json!({ "number": normalized.as_str(), "result": "blocked", "label": label })
                }
                CallerLookup::Identified { label } => {
                    json!({ "number": normalized.as_str(), "result": "identified", "label": label })
                }
                CallerLookup::Unknown => json!({ "number": normalized.as_str(), "result": "unknown" }),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize lookup")?
            );
            return Ok(());
        }

        match result {
            CallerLookup::Blocked { label } => {
                println!("{} {} {}", "BLOCKED".red().bold(), normalized, label)
            }
            CallerLookup::Identified { label } => {
                println!("{} {} {}", "IDENTIFIED".green().bold(), normalized, label)
            }
            CallerLookup::Unknown => println!("{} {}", "UNKNOWN".bright_black().bold(), normalized),
        }
        Ok(())
    }
}
