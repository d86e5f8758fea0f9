use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::LauncherError;

/// Catalog a mod entry was resolved from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModSource {
    Modrinth,
    #[serde(rename = "curseforge")]
    CurseForge,
}

impl fmt::Display for ModSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModSource::Modrinth => write!(f, "modrinth"),
            ModSource::CurseForge => write!(f, "curseforge"),
        }
    }
}

impl FromStr for ModSource {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "modrinth" => Ok(ModSource::Modrinth),
            "curseforge" => Ok(ModSource::CurseForge),
            other => Err(LauncherError::Validation(format!(
                "unknown mod source '{other}'"
            ))),
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

/// One mod in a profile's mod set.
///
/// `dependency_of` names the entry that pulled this one in. It is a relation
/// only: the dependency is kept while its parent is wanted, nothing more.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModEntry {
    pub catalog_id: String,
    pub source: ModSource,
    pub version_pin: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_of: Option<String>,
}

impl ModEntry {
    pub fn new(
        catalog_id: impl Into<String>,
        source: ModSource,
        version_pin: impl Into<String>,
    ) -> Self {
        Self {
            catalog_id: catalog_id.into(),
            source,
            version_pin: version_pin.into(),
            enabled: true,
            dependency_of: None,
        }
    }

    /// Same catalog item, same source, same pin.
    pub fn same_artifact(&self, other: &ModEntry) -> bool {
        self.catalog_id == other.catalog_id
            && self.source == other.source
            && self.version_pin == other.version_pin
    }

    /// `<source>-<id>-<pin>.jar`, the name the entry's binary has on disk
    /// while enabled.
    pub fn jar_name(&self) -> String {
        format!(
            "{}-{}-{}.jar",
            self.source,
            file_safe(&self.catalog_id),
            file_safe(&self.version_pin)
        )
    }

    pub fn disabled_name(&self) -> String {
        format!("{}.disabled", self.jar_name())
    }

    /// The file name matching the current `enabled` flag.
    pub fn file_name(&self) -> String {
        if self.enabled {
            self.jar_name()
        } else {
            self.disabled_name()
        }
    }
}

fn file_safe(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A jar found in a profile's `mods/` folder.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstalledMod {
    pub file_name: String,
    pub enabled: bool,
    pub size: u64,
}

/// Outcome of a single reconciliation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub installed: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
    pub failed: Vec<ModFailure>,
}

impl ReconcileReport {
    /// True when nothing was installed or removed.
    pub fn is_noop(&self) -> bool {
        self.installed.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModFailure {
    pub catalog_id: String,
    pub source: ModSource,
    pub reason: String,
    pub retryable: bool,
}
