//! `~/.callerid/config.yaml`
//!
//! Every field is optional. A missing file yields [`CallerIdConfig::default`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, StoreError};
use crate::mode::{resolve_mode, DeviceProfile, ModeSetting};
use crate::paths;
use crate::types::CallerIdMode;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallerIdConfig {
    pub mode: ModeSetting,
    pub device: DeviceProfile,
    pub permissions: Permissions,
    pub batch: BatchConfig,
}

impl CallerIdConfig {
    pub fn caller_id_mode(&self) -> CallerIdMode {
        resolve_mode(self.mode, &self.device)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissions {
    /// Read/write access to the contacts store.
    pub contacts: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self { contacts: true }
    }
}

/// Batch sizes. Tunable; they never change results, only how work is split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Operations per contacts-store batch.
    pub chunk_size: usize,
    /// Bound parameters one native query may hold.
    pub max_parameters: usize,
    /// Entries per directory rebuild pass.
    pub directory_batch: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            max_parameters: 999,
            directory_batch: 5000,
        }
    }
}

impl BatchConfig {
    /// Chunk size actually used: never above the parameter limit, never zero.
    pub fn effective_chunk(&self) -> usize {
        self.chunk_size.min(self.max_parameters).max(1)
    }
}

/// Load config from `<home>/.callerid/config.yaml`.
pub fn load_at(home: &Path) -> Result<CallerIdConfig, StoreError> {
    let path = paths::config_path(home);
    if !path.exists() {
        return Ok(CallerIdConfig::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(CallerIdConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| StoreError::Parse { path, source })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<CallerIdConfig, StoreError> {
    load_at(&paths::home()?)
}

/// Atomically write config: `.yaml.tmp` sibling, then rename.
pub fn save_at(home: &Path, config: &CallerIdConfig) -> Result<(), StoreError> {
    let root = paths::callerid_root(home);
    std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    let path = paths::config_path(home);
    let tmp = path.with_extension("yaml.tmp");
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let home = TempDir::new().expect("tempdir");
        let cfg = load_at(home.path()).expect("load");
        assert_eq!(cfg, CallerIdConfig::default());
        assert!(cfg.permissions.contacts);
        assert_eq!(cfg.batch.effective_chunk(), 100);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let home = TempDir::new().expect("tempdir");
        let root = paths::callerid_root(home.path());
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(
            paths::config_path(home.path()),
            "mode: workProfileMode\nbatch:\n  chunk_size: 2000\n",
        )
        .unwrap();
        let cfg = load_at(home.path()).expect("load");
        assert_eq!(cfg.mode, ModeSetting::WorkProfile);
        assert_eq!(cfg.batch.max_parameters, 999);
        assert_eq!(cfg.batch.effective_chunk(), 999);
        assert_eq!(cfg.caller_id_mode(), CallerIdMode::WorkProfile);
    }

    #[test]
    fn malformed_file_reports_path() {
        let home = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(paths::callerid_root(home.path())).unwrap();
        std::fs::write(paths::config_path(home.path()), "mode: [").unwrap();
        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn save_then_load() {
        let home = TempDir::new().expect("tempdir");
        let mut cfg = CallerIdConfig::default();
        cfg.device.profile_owner = true;
        save_at(home.path(), &cfg).expect("save");
        assert_eq!(load_at(home.path()).expect("load"), cfg);
    }
}
