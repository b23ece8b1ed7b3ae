//! Host-supplied settings record.
//!
//! Persistence is the host shell's concern; this crate only consumes the
//! values at initialize time and on update. `start_with_windows` and
//! `release_channel` are carried for the host (autostart registration and
//! the update feed) and are not read by the core.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub gateway_auto_start: bool,
    #[serde(default)]
    pub start_with_windows: bool,
    #[serde(default = "default_true")]
    pub search_enabled: bool,
    #[serde(default = "default_release_channel")]
    pub release_channel: String,
    #[serde(default = "default_wsl_distro")]
    pub wsl_distro: String,
}

fn default_true() -> bool {
    true
}

fn default_release_channel() -> String {
    "stable".to_string()
}

fn default_wsl_distro() -> String {
    "Ubuntu".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gateway_auto_start: false,
            start_with_windows: false,
            search_enabled: true,
            release_channel: default_release_channel(),
            wsl_distro: default_wsl_distro(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;

    #[test]
    fn missing_fields_take_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert!(!settings.gateway_auto_start);
        assert!(settings.search_enabled);
        assert_eq!(settings.release_channel, "stable");
        assert_eq!(settings.wsl_distro, "Ubuntu");
    }
}
