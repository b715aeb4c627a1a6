//! `callerid mode` — which caller-id integration this device gets.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

use callerid_core::{config, ModeFlags};

use super::home_dir;

#[derive(Args, Debug)]
pub struct ModeArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl ModeArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let config = config::load_at(&home).context("failed to load config")?;
        let flags = ModeFlags::resolve(config.mode, &config.device);
        let mode = flags.mode();

        if self.json {
            let payload = json!({
                "mode": mode.as_str(),
                "workProfile": flags.work_profile,
                "contentProvider": flags.content_provider,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize mode")?
            );
            return Ok(());
        }

        println!("{mode}");
        println!("  setting:          {:?}", config.mode);
        println!(
            "  default dialer:   {}",
            config.device.default_dialer.as_deref().unwrap_or("-")
        );
        println!("  profile owner:    {}", config.device.profile_owner);
        Ok(())
    }
}
