use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use super::error::AlertError;
use super::model::{Severity, StyleId};

lazy_static! {
    static ref DEFAULT_SEVERITY_COLORS: HashMap<Severity, &'static str> = {
        let mut colors = HashMap::new();
        colors.insert(Severity::Urgent, "red");
        colors.insert(Severity::High, "orange");
        colors.insert(Severity::Moderate, "yellow");
        colors.insert(Severity::Normal, "green");
        colors.insert(Severity::Low, "blue");
        colors.insert(Severity::Trivial, "purple");
        colors
    };
}

fn default_severity_colors() -> HashMap<Severity, String> {
    DEFAULT_SEVERITY_COLORS
        .iter()
        .map(|(sev, color)| (*sev, (*color).to_string()))
        .collect()
}

/// Global alert settings, persisted as settings.json.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Style used when no rule matches
    pub default_style: Option<StyleId>,
    /// Suppress all delivery (logging still happens)
    pub hide_all_notifications: bool,
    /// Send every alert through the `log` style before matching
    pub log_messages: bool,
    /// Delay before a fading alert is re-checked for removal
    pub fade_time_seconds: u64,
    /// Idle time after which a selected context counts as idle
    pub reveal_idle_threshold_seconds: u64,
    /// Idle time after which fading alerts stay put until the user returns
    pub persist_idle_threshold_seconds: u64,
    /// Per-severity presentation hint copied into each alert
    pub severity_colors: HashMap<Severity, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_style: None,
            hide_all_notifications: false,
            log_messages: true,
            fade_time_seconds: 5,
            reveal_idle_threshold_seconds: 15,
            persist_idle_threshold_seconds: 900,
            severity_colors: default_severity_colors(),
        }
    }
}

impl Settings {
    pub fn fade_time(&self) -> Duration {
        Duration::from_secs(self.fade_time_seconds)
    }

    pub fn reveal_idle_threshold(&self) -> Duration {
        Duration::from_secs(self.reveal_idle_threshold_seconds)
    }

    pub fn persist_idle_threshold(&self) -> Duration {
        Duration::from_secs(self.persist_idle_threshold_seconds)
    }

    pub fn severity_color(&self, severity: Severity) -> Option<&str> {
        self.severity_colors.get(&severity).map(String::as_str)
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            config_path: config_dir.join("settings.json"),
        }
    }

    /// Load settings, falling back to defaults when the file is missing or unreadable.
    pub fn load(&self) -> Settings {
        if self.config_path.exists() {
            match fs::read_to_string(&self.config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(settings) => return settings,
                    Err(e) => log::warn!(
                        "Ignoring malformed {}: {}",
                        self.config_path.display(),
                        e
                    ),
                },
                Err(e) => log::warn!("Failed to read {}: {}", self.config_path.display(), e),
            }
        }
        Settings::default()
    }

    pub fn save(&self, settings: &Settings) -> Result<(), AlertError> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.fade_time(), Duration::from_secs(5));
        assert_eq!(settings.reveal_idle_threshold(), Duration::from_secs(15));
        assert_eq!(settings.persist_idle_threshold(), Duration::from_secs(900));
        assert_eq!(settings.severity_color(Severity::Urgent), Some("red"));
        assert_eq!(settings.severity_color(Severity::Trivial), Some("purple"));
        assert!(settings.default_style.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().join("alerts"));

        let default = manager.load();
        assert_eq!(default.fade_time_seconds, 5);

        let new_settings = Settings {
            default_style: Some("log".to_string()),
            fade_time_seconds: 10,
            hide_all_notifications: true,
            ..Settings::default()
        };

        manager.save(&new_settings).unwrap();
        let loaded = manager.load();

        assert_eq!(loaded, new_settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("settings.json"),
            r#"{"fade_time_seconds": 2, "default_style": "log"}"#,
        )
        .unwrap();

        let loaded = ConfigManager::new(dir.path().to_path_buf()).load();
        assert_eq!(loaded.fade_time_seconds, 2);
        assert_eq!(loaded.default_style.as_deref(), Some("log"));
        assert_eq!(loaded.persist_idle_threshold_seconds, 900);
        assert!(loaded.log_messages);
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), "{ not json").unwrap();

        let loaded = ConfigManager::new(dir.path().to_path_buf()).load();
        assert_eq!(loaded, Settings::default());
    }
}
