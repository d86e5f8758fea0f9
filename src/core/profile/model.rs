use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::LauncherError;
use crate::core::mods::ModEntry;

/// Mod loader a profile runs with; `none` is the plain game.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LoaderType {
    #[default]
    #[serde(rename = "none")]
    Vanilla,
    #[serde(rename = "fabric")]
    Fabric,
    #[serde(rename = "forge")]
    Forge,
    #[serde(rename = "neoforge")]
    NeoForge,
    #[serde(rename = "quilt")]
    Quilt,
    #[serde(rename = "optifine")]
    OptiFine,
    #[serde(rename = "forge+optifine")]
    ForgeOptiFine,
}

impl LoaderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderType::Vanilla => "none",
            LoaderType::Fabric => "fabric",
            LoaderType::Forge => "forge",
            LoaderType::NeoForge => "neoforge",
            LoaderType::Quilt => "quilt",
            LoaderType::OptiFine => "optifine",
            LoaderType::ForgeOptiFine => "forge+optifine",
        }
    }

    /// Loader name as mod catalogs understand it. OptiFine alone is not a
    /// mod loader; Forge+OptiFine installs Forge mods.
    pub fn catalog_loader(&self) -> Option<&'static str> {
        match self {
            LoaderType::Fabric => Some("fabric"),
            LoaderType::Forge | LoaderType::ForgeOptiFine => Some("forge"),
            LoaderType::NeoForge => Some("neoforge"),
            LoaderType::Quilt => Some("quilt"),
            LoaderType::Vanilla | LoaderType::OptiFine => None,
        }
    }
}

impl fmt::Display for LoaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoaderType {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "vanilla" => Ok(LoaderType::Vanilla),
            "fabric" => Ok(LoaderType::Fabric),
            "forge" => Ok(LoaderType::Forge),
            "neoforge" => Ok(LoaderType::NeoForge),
            "quilt" => Ok(LoaderType::Quilt),
            "optifine" => Ok(LoaderType::OptiFine),
            "forge+optifine" => Ok(LoaderType::ForgeOptiFine),
            other => Err(LauncherError::Validation(format!("unknown loader '{other}'"))),
        }
    }
}

fn default_icon() -> String {
    "🎮".into()
}

/// A custom game configuration with its own isolated game directory.
///
/// The directory holds `mods/`, `saves/` and `resourcepacks/`; no two
/// profiles ever share one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub game_version: String,
    #[serde(default)]
    pub loader: LoaderType,
    #[serde(default)]
    pub loader_version: Option<String>,
    pub directory: PathBuf,
    #[serde(default)]
    pub mod_set: Vec<ModEntry>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_played: Option<DateTime<Utc>>,
    #[serde(default = "default_icon")]
    pub icon: String,
}

impl Profile {
    /// Installed version id to launch for this game version / loader pair.
    ///
    /// Forge versions are stored as `<mc>-<forge>` or just `<forge>` and
    /// installed as `<mc>-forge-<forge>`.
    pub fn version_id(&self) -> String {
        let Some(loader_version) = self
            .loader_version
            .as_deref()
            .filter(|v| !v.trim().is_empty())
        else {
            return self.game_version.clone();
        };

        match self.loader {
            LoaderType::Vanilla => self.game_version.clone(),
            LoaderType::Fabric => format!("fabric-loader-{}-{}", loader_version, self.game_version),
            LoaderType::Quilt => format!("quilt-loader-{}-{}", loader_version, self.game_version),
            LoaderType::Forge | LoaderType::ForgeOptiFine => match loader_version.split_once('-') {
                Some((mc, forge)) => format!("{mc}-forge-{forge}"),
                None => format!("{}-forge-{}", self.game_version, loader_version),
            },
            LoaderType::NeoForge => format!("neoforge-{loader_version}"),
            LoaderType::OptiFine => format!("{}-OptiFine_{}", self.game_version, loader_version),
        }
    }

    pub fn display_name(&self) -> String {
        match self.loader {
            LoaderType::Vanilla => format!("{} (Vanilla)", self.name),
            LoaderType::Fabric => format!("{} (Fabric)", self.name),
            LoaderType::Forge => format!("{} (Forge)", self.name),
            LoaderType::NeoForge => format!("{} (NeoForge)", self.name),
            LoaderType::Quilt => format!("{} (Quilt)", self.name),
            LoaderType::OptiFine => format!("{} (OptiFine)", self.name),
            LoaderType::ForgeOptiFine => format!("{} (Forge+OptiFine)", self.name),
        }
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.directory.join("mods")
    }

    pub fn saves_dir(&self) -> PathBuf {
        self.directory.join("saves")
    }

    pub fn resourcepacks_dir(&self) -> PathBuf {
        self.directory.join("resourcepacks")
    }

    pub fn find_mod(&self, catalog_id: &str) -> Option<&ModEntry> {
        self.mod_set.iter().find(|m| m.catalog_id == catalog_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(loader: LoaderType, loader_version: Option<&str>) -> Profile {
        Profile {
            id: "abcd1234".into(),
            name: "Test".into(),
            game_version: "1.20.1".into(),
            loader,
            loader_version: loader_version.map(String::from),
            directory: PathBuf::from("/tmp/Test"),
            mod_set: Vec::new(),
            created_at: Utc::now(),
            last_played: None,
            icon: default_icon(),
        }
    }

    #[test]
    fn version_id_per_loader() {
        assert_eq!(profile(LoaderType::Vanilla, None).version_id(), "1.20.1");
        assert_eq!(
            profile(LoaderType::Fabric, Some("0.15.11")).version_id(),
            "fabric-loader-0.15.11-1.20.1"
        );
        assert_eq!(
            profile(LoaderType::Quilt, Some("0.26.0")).version_id(),
            "quilt-loader-0.26.0-1.20.1"
        );
        assert_eq!(
            profile(LoaderType::Forge, Some("1.20.1-47.2.0")).version_id(),
            "1.20.1-forge-47.2.0"
        );
        assert_eq!(
            profile(LoaderType::ForgeOptiFine, Some("47.2.0")).version_id(),
            "1.20.1-forge-47.2.0"
        );
        assert_eq!(
            profile(LoaderType::NeoForge, Some("20.4.237")).version_id(),
            "neoforge-20.4.237"
        );
        assert_eq!(
            profile(LoaderType::OptiFine, Some("HD_U_I6")).version_id(),
            "1.20.1-OptiFine_HD_U_I6"
        );
    }

    #[test]
    fn loader_without_version_launches_plain_game() {
        assert_eq!(profile(LoaderType::Fabric, None).version_id(), "1.20.1");
        assert_eq!(profile(LoaderType::Forge, Some(" ")).version_id(), "1.20.1");
    }

    #[test]
    fn loader_names_round_trip_through_serde() {
        let json = serde_json::to_string(&LoaderType::ForgeOptiFine).unwrap();
        assert_eq!(json, "\"forge+optifine\"");
        assert_eq!(
            serde_json::from_str::<LoaderType>("\"none\"").unwrap(),
            LoaderType::Vanilla
        );
        assert_eq!("NeoForge".parse::<LoaderType>().unwrap(), LoaderType::NeoForge);
    }
}
