// ─── Launcher Paths ───
// Platform-specific locations for launcher state and the shared game root.

use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "CraftLauncher";

/// Resolved on-disk layout.
///
/// `config_dir` holds launcher records (settings, profiles, accounts, logs);
/// `game_dir` is the shared game root with versions, libraries, assets and
/// the per-profile directories under `profiles/`.
#[derive(Debug, Clone)]
pub struct LauncherPaths {
    config_dir: PathBuf,
    game_dir: PathBuf,
}

impl LauncherPaths {
    pub fn new(config_dir: impl Into<PathBuf>, game_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            game_dir: game_dir.into(),
        }
    }

    /// Platform defaults: `<config>/CraftLauncher` and the usual `.minecraft`.
    pub fn platform_default() -> Self {
        Self::new(default_config_dir(), default_game_dir())
    }

    /// Same config dir, different game root (the `game_directory` setting).
    pub fn with_game_dir(&self, game_dir: impl Into<PathBuf>) -> Self {
        Self::new(self.config_dir.clone(), game_dir)
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn game_dir(&self) -> &Path {
        &self.game_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    pub fn profiles_file(&self) -> PathBuf {
        self.config_dir.join("profiles.json")
    }

    pub fn accounts_file(&self) -> PathBuf {
        self.config_dir.join("accounts.json")
    }

    pub fn client_token_file(&self) -> PathBuf {
        self.config_dir.join("client_token")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.config_dir.join("logs")
    }

    pub fn authlib_injector_jar(&self) -> PathBuf {
        self.config_dir.join("cache").join("authlib-injector.jar")
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.game_dir.join("profiles")
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.game_dir.join("versions")
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.game_dir.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.game_dir.join("assets")
    }
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// `%APPDATA%\.minecraft`, `~/Library/Application Support/minecraft`
/// or `~/.minecraft`.
pub fn default_game_dir() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".minecraft")
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("minecraft")
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".minecraft")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_in_the_two_dirs() {
        let paths = LauncherPaths::new("/cfg", "/game");
        assert_eq!(paths.config_file(), PathBuf::from("/cfg/config.json"));
        assert_eq!(paths.profiles_dir(), PathBuf::from("/game/profiles"));

        let moved = paths.with_game_dir("/other");
        assert_eq!(moved.config_dir(), Path::new("/cfg"));
        assert_eq!(moved.libraries_dir(), PathBuf::from("/other/libraries"));
    }
}
