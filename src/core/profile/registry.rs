use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::model::{LoaderType, Profile};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::manifest;
use crate::core::mods::ModEntry;
use crate::core::persist;

#[derive(Debug, Default, Deserialize)]
struct ProfileIndex {
    #[serde(default)]
    profiles: Vec<Profile>,
}

#[derive(Serialize)]
struct ProfileIndexRef<'a> {
    profiles: &'a [Profile],
}

/// Everything needed to create a profile. The directory is always
/// allocated by the registry.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub name: String,
    pub game_version: String,
    pub loader: LoaderType,
    pub loader_version: Option<String>,
    pub icon: Option<String>,
    pub mod_set: Vec<ModEntry>,
}

impl NewProfile {
    pub fn new(name: impl Into<String>, game_version: impl Into<String>, loader: LoaderType) -> Self {
        Self {
            name: name.into(),
            game_version: game_version.into(),
            loader,
            loader_version: None,
            icon: None,
            mod_set: Vec::new(),
        }
    }
}

/// Partial update. `None` leaves a field as is; `loader_version:
/// Some(None)` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub game_version: Option<String>,
    pub loader: Option<LoaderType>,
    pub loader_version: Option<Option<String>>,
    pub icon: Option<String>,
}

/// Id -> profile map persisted as `profiles.json`.
///
/// Every mutation runs under the write lock, persists a copy of the new
/// list and only then swaps it in.
pub struct ProfileRegistry {
    index_path: PathBuf,
    profiles_root: PathBuf,
    profiles: RwLock<Vec<Profile>>,
}

impl ProfileRegistry {
    pub async fn load(index_path: impl Into<PathBuf>, profiles_root: impl Into<PathBuf>) -> Self {
        let index_path = index_path.into();
        let profiles = match persist::read_json::<ProfileIndex>(&index_path).await {
            Ok(Some(index)) => dedup_ids(index.profiles),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to load profiles from {:?}: {}", index_path, e);
                Vec::new()
            }
        };
        info!("Loaded {} profiles", profiles.len());

        Self {
            index_path,
            profiles_root: profiles_root.into(),
            profiles: RwLock::new(profiles),
        }
    }

    pub fn profiles_root(&self) -> &Path {
        &self.profiles_root
    }

    /// Profiles ordered by creation time, ties broken by id.
    pub async fn list(&self) -> Vec<Profile> {
        let mut profiles = self.profiles.read().await.clone();
        profiles.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        profiles
    }

    pub async fn get(&self, id: &str) -> LauncherResult<Profile> {
        self.profiles
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| LauncherError::ProfileNotFound(id.to_string()))
    }

    pub async fn create(
        &self,
        name: &str,
        game_version: &str,
        loader: LoaderType,
    ) -> LauncherResult<Profile> {
        self.create_with(NewProfile::new(name, game_version, loader)).await
    }

    pub async fn create_with(&self, new: NewProfile) -> LauncherResult<Profile> {
        let name = new.name.trim().to_string();
        let game_version = new.game_version.trim().to_string();
        if name.is_empty() {
            return Err(LauncherError::Validation("profile name must not be empty".into()));
        }
        if game_version.is_empty() {
            return Err(LauncherError::Validation("game version must not be empty".into()));
        }
        ensure_unique_mods(&new.mod_set)?;

        let mut guard = self.profiles.write().await;
        ensure_name_free(&guard, &name, None)?;

        let id = fresh_id(&guard);
        let folder = match sanitize_folder_name(&name)? {
            s if s.is_empty() => id.clone(),
            s => s,
        };
        let directory = self.allocate_directory(&guard, &folder).await;

        let profile = Profile {
            id,
            name,
            game_version,
            loader: new.loader,
            loader_version: new.loader_version.filter(|v| !v.trim().is_empty()),
            directory,
            mod_set: new.mod_set,
            created_at: Utc::now(),
            last_played: None,
            icon: new.icon.unwrap_or_else(|| "🎮".into()),
        };

        let (mods_dir, saves_dir, resourcepacks_dir) =
            (profile.mods_dir(), profile.saves_dir(), profile.resourcepacks_dir());
        tokio::try_join!(
            create_dir_safe(&mods_dir),
            create_dir_safe(&saves_dir),
            create_dir_safe(&resourcepacks_dir),
        )?;

        let mut next = guard.clone();
        next.push(profile.clone());
        if let Err(e) = self.persist(&next).await {
            let _ = tokio::fs::remove_dir_all(&profile.directory).await;
            return Err(e);
        }
        *guard = next;

        info!(
            "Created profile '{}' (MC {}, {}) at {:?}",
            profile.name, profile.game_version, profile.loader, profile.directory
        );
        Ok(profile)
    }

    /// Creates a profile from a shared manifest code. The mod set is recorded
    /// as shared; files arrive with the next reconciliation.
    pub async fn import(&self, code: &str, name_override: Option<&str>) -> LauncherResult<Profile> {
        let shared = manifest::decode(code)?;
        let name = name_override
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or(shared.name);

        let profile = self
            .create_with(NewProfile {
                name,
                game_version: shared.game_version,
                loader: shared.loader,
                loader_version: shared.loader_version,
                icon: None,
                mod_set: shared.mods,
            })
            .await?;
        info!("Imported profile '{}' with {} mods", profile.name, profile.mod_set.len());
        Ok(profile)
    }

    /// Applies `changes`. Renames are collision-checked; the directory
    /// stays where it was allocated.
    pub async fn update(&self, id: &str, changes: ProfileUpdate) -> LauncherResult<Profile> {
        let mut guard = self.profiles.write().await;
        let idx = position(&guard, id)?;

        let mut updated = guard[idx].clone();
        if let Some(name) = changes.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(LauncherError::Validation("profile name must not be empty".into()));
            }
            ensure_name_free(&guard, &name, Some(id))?;
            updated.name = name;
        }
        if let Some(version) = changes.game_version {
            let version = version.trim().to_string();
            if version.is_empty() {
                return Err(LauncherError::Validation("game version must not be empty".into()));
            }
            updated.game_version = version;
        }
        if let Some(loader) = changes.loader {
            updated.loader = loader;
        }
        if let Some(loader_version) = changes.loader_version {
            updated.loader_version = loader_version.filter(|v| !v.trim().is_empty());
        }
        if let Some(icon) = changes.icon {
            updated.icon = icon;
        }

        self.commit(&mut guard, idx, updated.clone()).await?;
        info!("Updated profile: {}", updated.name);
        Ok(updated)
    }

    /// Replaces the stored mod set, e.g. after a reconciliation.
    pub async fn set_mod_set(&self, id: &str, mod_set: Vec<ModEntry>) -> LauncherResult<Profile> {
        ensure_unique_mods(&mod_set)?;

        let mut guard = self.profiles.write().await;
        let idx = position(&guard, id)?;
        let mut updated = guard[idx].clone();
        updated.mod_set = mod_set;

        self.commit(&mut guard, idx, updated.clone()).await?;
        Ok(updated)
    }

    pub async fn mark_played(&self, id: &str) -> LauncherResult<Profile> {
        let mut guard = self.profiles.write().await;
        let idx = position(&guard, id)?;
        let mut updated = guard[idx].clone();
        updated.last_played = Some(Utc::now());

        self.commit(&mut guard, idx, updated.clone()).await?;
        Ok(updated)
    }

    /// Drops the record, then the profile's directory. A directory that
    /// cannot be removed is logged and left behind; the record is gone either
    /// way.
    pub async fn delete(&self, id: &str) -> LauncherResult<()> {
        let mut guard = self.profiles.write().await;
        let idx = position(&guard, id)?;
        let profile = guard[idx].clone();

        let mut next = guard.clone();
        next.remove(idx);
        self.persist(&next).await?;
        *guard = next;

        match tokio::fs::remove_dir_all(&profile.directory).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Profile directory {:?} was already gone", profile.directory);
            }
            Err(e) => warn!("Could not remove {:?}: {}", profile.directory, e),
        }

        info!("Deleted profile: {}", profile.name);
        Ok(())
    }

    async fn commit(
        &self,
        guard: &mut Vec<Profile>,
        idx: usize,
        updated: Profile,
    ) -> LauncherResult<()> {
        let mut next = guard.clone();
        next[idx] = updated;
        self.persist(&next).await?;
        *guard = next;
        Ok(())
    }

    async fn persist(&self, profiles: &[Profile]) -> LauncherResult<()> {
        persist::write_json(&self.index_path, &ProfileIndexRef { profiles }).await
    }

    /// `<root>/<folder>`, suffixed when a stray directory of that name is
    /// already on disk.
    async fn allocate_directory(&self, profiles: &[Profile], folder: &str) -> PathBuf {
        let owned: HashSet<&Path> = profiles.iter().map(|p| p.directory.as_path()).collect();
        let mut candidate = self.profiles_root.join(folder);
        let mut n = 2;
        while owned.contains(candidate.as_path())
            || tokio::fs::try_exists(&candidate).await.unwrap_or(false)
        {
            candidate = self.profiles_root.join(format!("{folder}_{n}"));
            n += 1;
        }
        candidate
    }
}

fn position(profiles: &[Profile], id: &str) -> LauncherResult<usize> {
    profiles
        .iter()
        .position(|p| p.id == id)
        .ok_or_else(|| LauncherError::ProfileNotFound(id.to_string()))
}

/// Names collide case-insensitively, and so do names that sanitize to the
/// same folder.
fn ensure_name_free(profiles: &[Profile], name: &str, except_id: Option<&str>) -> LauncherResult<()> {
    let lower = name.to_lowercase();
    let folder = sanitize_folder_name(name)?.to_lowercase();

    for p in profiles.iter().filter(|p| Some(p.id.as_str()) != except_id) {
        let same_name = p.name.to_lowercase() == lower;
        let same_folder =
            !folder.is_empty() && sanitize_folder_name(&p.name)?.to_lowercase() == folder;
        if same_name || same_folder {
            return Err(LauncherError::DuplicateName(name.to_string()));
        }
    }
    Ok(())
}

fn ensure_unique_mods(mod_set: &[ModEntry]) -> LauncherResult<()> {
    let mut seen = HashSet::new();
    for entry in mod_set {
        if !seen.insert(entry.catalog_id.as_str()) {
            return Err(LauncherError::Validation(format!(
                "mod '{}' appears twice in the mod set",
                entry.catalog_id
            )));
        }
    }
    Ok(())
}

fn fresh_id(profiles: &[Profile]) -> String {
    loop {
        let id = Uuid::new_v4().simple().to_string()[..8].to_string();
        if profiles.iter().all(|p| p.id != id) {
            return id;
        }
    }
}

fn dedup_ids(profiles: Vec<Profile>) -> Vec<Profile> {
    let mut seen = HashSet::new();
    profiles
        .into_iter()
        .filter(|p| {
            let fresh = seen.insert(p.id.clone());
            if !fresh {
                warn!("Dropping duplicate profile id {} from index", p.id);
            }
            fresh
        })
        .collect()
}

/// Word characters and `-` survive; every other run of characters (and
/// runs of `_`) becomes a single `_`, and leading/trailing `_` are stripped.
pub fn sanitize_folder_name(name: &str) -> LauncherResult<String> {
    let unsafe_runs = Regex::new(r"(?:[^\w\-]|_)+")
        .map_err(|e| LauncherError::Other(format!("folder name pattern: {e}")))?;
    let replaced = unsafe_runs.replace_all(name.trim(), "_");
    Ok(replaced.trim_matches('_').to_string())
}

async fn create_dir_safe(path: &Path) -> LauncherResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| LauncherError::Io {
            path: path.to_path_buf(),
            source,
        })
}
