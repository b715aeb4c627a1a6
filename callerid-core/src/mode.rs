//! Caller-id mode resolution.
//!
//! A device runs in exactly one mode. Work-profile devices get contacts
//! materialized into the native store; devices whose default dialer queries
//! third-party directories use the directory provider; everything else falls
//! back to overlay identification.

use serde::{Deserialize, Serialize};

use crate::types::CallerIdMode;

/// Dialers known to query third-party caller-id directories.
pub const GENUINE_DIALERS: &[&str] = &["com.google.android.dialer", "com.android.dialer"];

/// Facts about the device that decide the mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    /// Package name of the default dialer, if known.
    pub default_dialer: Option<String>,
    /// True when the app runs as a managed work profile owner.
    pub profile_owner: bool,
}

/// Operator override from config. `Auto` leaves the decision to the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeSetting {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "workProfileMode")]
    WorkProfile,
    #[serde(rename = "defaultMode")]
    Default,
    #[serde(rename = "compatibilityMode")]
    Compatibility,
}

/// Capabilities derived from the setting and device facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeFlags {
    pub work_profile: bool,
    pub content_provider: bool,
}

impl ModeFlags {
    pub fn resolve(setting: ModeSetting, device: &DeviceProfile) -> Self {
        if setting == ModeSetting::Compatibility {
            return Self {
                work_profile: false,
                content_provider: false,
            };
        }
        let genuine_dialer = device
            .default_dialer
            .as_deref()
            .map(|d| GENUINE_DIALERS.contains(&d))
            .unwrap_or(false);
        Self {
            work_profile: setting == ModeSetting::WorkProfile || device.profile_owner,
            content_provider: setting == ModeSetting::Default || genuine_dialer,
        }
    }

    pub fn mode(self) -> CallerIdMode {
        if self.work_profile {
            CallerIdMode::WorkProfile
        } else if self.content_provider {
            CallerIdMode::Default
        } else {
            CallerIdMode::Compatibility
        }
    }
}

/// Resolve the reported mode in one step.
pub fn resolve_mode(setting: ModeSetting, device: &DeviceProfile) -> CallerIdMode {
    ModeFlags::resolve(setting, device).mode()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialer(name: &str) -> DeviceProfile {
        DeviceProfile {
            default_dialer: Some(name.into()),
            profile_owner: false,
        }
    }

    #[test]
    fn genuine_dialer_selects_default_mode() {
        assert_eq!(
            resolve_mode(ModeSetting::Auto, &dialer("com.google.android.dialer")),
            CallerIdMode::Default
        );
    }

    #[test]
    fn vendor_dialer_falls_back_to_compatibility() {
        assert_eq!(
            resolve_mode(ModeSetting::Auto, &dialer("com.samsung.android.dialer")),
            CallerIdMode::Compatibility
        );
    }

    #[test]
    fn profile_owner_wins_over_dialer() {
        let device = DeviceProfile {
            default_dialer: Some("com.android.dialer".into()),
            profile_owner: true,
        };
        assert_eq!(resolve_mode(ModeSetting::Auto, &device), CallerIdMode::WorkProfile);
    }

    #[test]
    fn forced_compatibility_clears_everything() {
        let device = DeviceProfile {
            default_dialer: Some("com.android.dialer".into()),
            profile_owner: true,
        };
        assert_eq!(
            resolve_mode(ModeSetting::Compatibility, &device),
            CallerIdMode::Compatibility
        );
    }
}
