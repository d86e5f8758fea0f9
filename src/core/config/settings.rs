use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::error::{LauncherError, LauncherResult};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
    Midnight,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    #[default]
    Ru,
    Uk,
}

impl std::str::FromStr for Theme {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            "midnight" => Ok(Theme::Midnight),
            other => Err(LauncherError::Validation(format!("unknown theme '{other}'"))),
        }
    }
}

impl std::str::FromStr for Language {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "ru" => Ok(Language::Ru),
            "uk" => Ok(Language::Uk),
            other => Err(LauncherError::Validation(format!(
                "unknown language '{other}'"
            ))),
        }
    }
}

/// Launcher-wide settings persisted as `config.json`.
///
/// Every field has a default, so records written by older builds (or edited
/// by hand) load with the missing keys filled in. Unknown keys are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LauncherSettings {
    /// Offline player name used when no account is active.
    pub username: String,
    /// Minimum heap in GB (`-Xms`).
    pub ram_min: u32,
    /// Maximum heap in GB (`-Xmx`).
    pub ram_max: u32,
    /// Explicit Java binary; auto-detected when absent.
    pub java_path: Option<PathBuf>,
    /// Custom game root; the platform `.minecraft` when absent.
    pub game_directory: Option<PathBuf>,
    pub last_profile: Option<String>,
    pub theme: Theme,
    pub language: Language,
    pub show_snapshots: bool,
    pub show_old_versions: bool,
    pub close_on_launch: bool,
    pub show_game_console: bool,
    /// CurseForge requires an API key; the catalog is disabled without one.
    pub curseforge_api_key: Option<String>,
    /// Upper bound on parallel downloads.
    pub download_workers: usize,
    /// Attempts after the first one for retryable network failures.
    pub network_retries: u32,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            username: "Player".into(),
            ram_min: 2,
            ram_max: 4,
            java_path: None,
            game_directory: None,
            last_profile: None,
            theme: Theme::default(),
            language: Language::default(),
            show_snapshots: false,
            show_old_versions: false,
            close_on_launch: false,
            show_game_console: false,
            curseforge_api_key: None,
            download_workers: 8,
            network_retries: 3,
        }
    }
}

impl LauncherSettings {
    pub fn validate(&self) -> LauncherResult<()> {
        if self.ram_min == 0 || self.ram_max == 0 {
            return Err(LauncherError::Validation(
                "memory limits must be greater than zero".into(),
            ));
        }
        if self.ram_min > self.ram_max {
            return Err(LauncherError::Validation(format!(
                "ram_min ({} GB) exceeds ram_max ({} GB)",
                self.ram_min, self.ram_max
            )));
        }
        if self.download_workers == 0 {
            return Err(LauncherError::Validation(
                "download_workers must be at least 1".into(),
            ));
        }
        if self.username.trim().is_empty() {
            return Err(LauncherError::Validation("username must not be empty".into()));
        }
        Ok(())
    }

    pub fn curseforge_key(&self) -> Option<&str> {
        self.curseforge_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = LauncherSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.theme, Theme::Dark);
        assert_eq!(settings.language, Language::Ru);
    }

    #[test]
    fn inverted_memory_limits_are_rejected() {
        let settings = LauncherSettings {
            ram_min: 8,
            ram_max: 4,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(LauncherError::Validation(_))
        ));
    }

    #[test]
    fn zero_memory_is_rejected() {
        let settings = LauncherSettings {
            ram_min: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn partial_record_is_merged_with_defaults() {
        let settings: LauncherSettings =
            serde_json::from_str(r#"{"ram_max": 6, "theme": "midnight", "future_key": 1}"#)
                .unwrap();
        assert_eq!(settings.ram_max, 6);
        assert_eq!(settings.ram_min, 2);
        assert_eq!(settings.theme, Theme::Midnight);
        assert_eq!(settings.username, "Player");
    }

    #[test]
    fn blank_curseforge_key_counts_as_missing() {
        let settings = LauncherSettings {
            curseforge_api_key: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(settings.curseforge_key(), None);
    }
}
