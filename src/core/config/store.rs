use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::{info, warn};

use super::settings::LauncherSettings;
use crate::core::error::LauncherResult;
use crate::core::persist;

/// Shared settings record with single-writer persistence.
///
/// Readers get a snapshot. Writers hold the lock across validation and the
/// atomic disk write, and the in-memory copy changes only after the write
/// succeeded, so memory and disk never disagree.
pub struct ConfigStore {
    path: PathBuf,
    settings: RwLock<LauncherSettings>,
}

impl ConfigStore {
    /// Loads `path`, falling back to defaults when the file is absent,
    /// unreadable or fails validation.
    pub async fn load_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match persist::read_json::<LauncherSettings>(&path).await {
            Ok(Some(settings)) => match settings.validate() {
                Ok(()) => settings,
                Err(e) => {
                    warn!("Ignoring invalid settings in {:?}: {}", path, e);
                    LauncherSettings::default()
                }
            },
            Ok(None) => {
                info!("No settings at {:?}, using defaults", path);
                LauncherSettings::default()
            }
            Err(e) => {
                warn!("Corrupt settings at {:?}: {}", path, e);
                LauncherSettings::default()
            }
        };

        Self {
            path,
            settings: RwLock::new(settings),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self) -> LauncherSettings {
        self.settings.read().await.clone()
    }

    /// Applies `mutate` to a copy, validates, persists, then commits.
    pub async fn update<F>(&self, mutate: F) -> LauncherResult<LauncherSettings>
    where
        F: FnOnce(&mut LauncherSettings),
    {
        let mut guard = self.settings.write().await;
        let mut next = guard.clone();
        mutate(&mut next);
        next.validate()?;

        persist::write_json(&self.path, &next).await?;
        *guard = next.clone();
        Ok(next)
    }

    /// Writes the current record. Called on shutdown.
    pub async fn flush(&self) -> LauncherResult<()> {
        let guard = self.settings.read().await;
        persist::write_json(&self.path, &*guard).await
    }
}
