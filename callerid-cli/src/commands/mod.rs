pub mod contacts;
pub mod daemon;
pub mod list;
pub mod lookup;
pub mod mode;
pub mod status;

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};

use callerid_core::config;
use callerid_daemon::{CallerIdBridge, LocalBridge};

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Bridge over the stores under `<home>/.callerid/`, configured from
/// `config.yaml`.
pub fn open_bridge(home: &std::path::Path) -> Result<LocalBridge> {
    let config = config::load_at(home).context("failed to load config")?;
    CallerIdBridge::open_at(home, &config).context("failed to open caller-id stores")
}

/// Read a JSON payload from `source`, or from stdin when `source` is `-`.
pub fn read_payload(source: &str) -> Result<String> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read payload from stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(source).with_context(|| format!("failed to read payload {source}"))
}
