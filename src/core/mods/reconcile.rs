// ─── Mod set reconciliation ───
// Diffs a profile's recorded mod set against the wanted one and applies the
// difference to `<profile>/mods`.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::catalog::{CatalogSet, ModDependency, ModPayload};
use super::model::{InstalledMod, ModEntry, ModFailure, ReconcileReport};
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::profile::Profile;

/// Dependency chains deeper than this are reported, not followed.
const MAX_DEPENDENCY_DEPTH: usize = 8;

/// What a reconciliation did and the mod set the profile should now record.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub report: ReconcileReport,
    pub mod_set: Vec<ModEntry>,
}

pub struct ModSetManager {
    catalogs: CatalogSet,
    downloader: Arc<Downloader>,
}

struct Installed {
    entry: ModEntry,
    dependencies: Vec<ModDependency>,
}

impl ModSetManager {
    pub fn new(catalogs: CatalogSet, downloader: Arc<Downloader>) -> Self {
        Self {
            catalogs,
            downloader,
        }
    }

    pub fn catalogs(&self) -> &CatalogSet {
        &self.catalogs
    }

    /// Brings `<profile>/mods` in line with `desired`.
    ///
    /// Entries are matched by catalog id. Same source and pin: left alone.
    /// Different source or pin: the old file is removed and the new one
    /// installed. Entries only in the recorded set are removed unless a wanted
    /// entry depends on them. Per-entry failures land in the report; only an
    /// invalid `desired` set or an unusable mods folder fail the call.
    ///
    /// The returned mod set keeps wanted entries whose install failed, so the
    /// next reconciliation retries them.
    pub async fn reconcile(
        &self,
        profile: &Profile,
        desired: &[ModEntry],
        cancel: &CancellationToken,
    ) -> LauncherResult<ReconcileOutcome> {
        ensure_unique(desired)?;

        let mods_dir = profile.mods_dir();
        tokio::fs::create_dir_all(&mods_dir)
            .await
            .map_err(|source| LauncherError::Io {
                path: mods_dir.clone(),
                source,
            })?;

        let current: HashMap<&str, &ModEntry> = profile
            .mod_set
            .iter()
            .map(|m| (m.catalog_id.as_str(), m))
            .collect();
        let wanted_ids: HashSet<&str> = desired.iter().map(|m| m.catalog_id.as_str()).collect();

        // Dependencies stay while the entry that pulled them in is wanted,
        // directly or through another kept dependency.
        let retained = retained_dependencies(&profile.mod_set, &wanted_ids);
        let retained_ids: HashSet<&str> = retained.iter().map(|m| m.catalog_id.as_str()).collect();

        let mut report = ReconcileReport::default();
        let mut to_install = Vec::new();
        let mut keep = Vec::new();

        for current_entry in &profile.mod_set {
            let id = current_entry.catalog_id.as_str();
            if !wanted_ids.contains(id) && !retained_ids.contains(id) {
                remove_files(&mods_dir, current_entry).await;
                report.removed.push(current_entry.catalog_id.clone());
            }
        }

        for wanted in desired.iter().chain(retained.iter()) {
            match current.get(wanted.catalog_id.as_str()) {
                Some(existing) if existing.same_artifact(wanted) => {
                    if sync_enabled_state(&mods_dir, wanted).await {
                        report.unchanged.push(wanted.catalog_id.clone());
                        keep.push(wanted.clone());
                    } else {
                        debug!("{} is recorded but missing on disk", wanted.catalog_id);
                        to_install.push(wanted.clone());
                    }
                }
                Some(existing) => {
                    info!(
                        "{}: {}@{} -> {}@{}",
                        wanted.catalog_id,
                        existing.source,
                        existing.version_pin,
                        wanted.source,
                        wanted.version_pin
                    );
                    remove_files(&mods_dir, existing).await;
                    report.removed.push(existing.catalog_id.clone());
                    to_install.push(wanted.clone());
                }
                None => to_install.push(wanted.clone()),
            }
        }

        let mut mod_set = keep;
        let mut known: HashSet<String> = desired
            .iter()
            .chain(retained.iter())
            .map(|m| m.catalog_id.clone())
            .collect();

        let mut wave = to_install;
        let mut depth = 0;
        let mut rolled_back = HashSet::new();
        while !wave.is_empty() {
            let results = self.install_all(&mods_dir, wave, cancel).await;

            let mut next_wave = Vec::new();
            let mut pending_deps = Vec::new();
            for (entry, result) in results {
                match result {
                    Ok(installed) => {
                        report.installed.push(installed.entry.catalog_id.clone());
                        for dep in installed.dependencies.into_iter().filter(|d| d.required) {
                            if known.insert(dep.catalog_id.clone()) {
                                pending_deps.push((installed.entry.clone(), dep));
                            }
                        }
                        mod_set.push(installed.entry);
                    }
                    Err(e) => {
                        warn!("Failed to install {}: {}", entry.catalog_id, e);
                        report.failed.push(failure(&entry, &e));
                        // Recorded either way; the next reconciliation retries it.
                        mod_set.push(entry);
                    }
                }
            }

            depth += 1;
            for (parent, dep) in pending_deps {
                if depth > MAX_DEPENDENCY_DEPTH {
                    report.failed.push(ModFailure {
                        catalog_id: dep.catalog_id,
                        source: parent.source,
                        reason: "dependency chain too deep".into(),
                        retryable: false,
                    });
                    continue;
                }
                match self.resolve_dependency(profile, &parent, &dep).await {
                    Ok(entry) => next_wave.push(entry),
                    Err(e) => {
                        warn!("Cannot resolve dependency {} of {}: {}", dep.catalog_id, parent.catalog_id, e);
                        report.failed.push(ModFailure {
                            catalog_id: dep.catalog_id.clone(),
                            source: parent.source,
                            reason: e.to_string(),
                            retryable: e.is_retryable(),
                        });
                        // Without a pin the dependency cannot be recorded. The
                        // parent's file goes instead, so the next run fetches
                        // the parent again and rediscovers it.
                        if rolled_back.insert(parent.catalog_id.clone()) {
                            remove_files(&mods_dir, &parent).await;
                            report.installed.retain(|id| id != &parent.catalog_id);
                            report.failed.push(ModFailure {
                                catalog_id: parent.catalog_id.clone(),
                                source: parent.source,
                                reason: format!("required dependency {} is unavailable", dep.catalog_id),
                                retryable: e.is_retryable(),
                            });
                        }
                    }
                }
            }
            wave = next_wave;
        }

        mod_set.sort_by_key(|m| order_key(desired, &retained, m));

        info!(
            "Reconciled '{}': {} installed, {} removed, {} unchanged, {} failed",
            profile.name,
            report.installed.len(),
            report.removed.len(),
            report.unchanged.len(),
            report.failed.len()
        );
        Ok(ReconcileOutcome { report, mod_set })
    }

    /// Flips one entry's flag. Files follow on the next reconciliation.
    pub fn toggle(profile: &Profile, catalog_id: &str, enabled: bool) -> LauncherResult<Vec<ModEntry>> {
        let mut mod_set = profile.mod_set.clone();
        let entry = mod_set
            .iter_mut()
            .find(|m| m.catalog_id == catalog_id)
            .ok_or_else(|| LauncherError::ModNotFound(catalog_id.to_string()))?;
        entry.enabled = enabled;
        Ok(mod_set)
    }

    /// Drops an entry from the wanted set together with the dependencies it
    /// pulled in, transitively. Entries the user added themselves stay.
    pub fn remove(profile: &Profile, catalog_id: &str) -> LauncherResult<Vec<ModEntry>> {
        if profile.find_mod(catalog_id).is_none() {
            return Err(LauncherError::ModNotFound(catalog_id.to_string()));
        }

        let mut dropped: HashSet<&str> = HashSet::from([catalog_id]);
        loop {
            let before = dropped.len();
            for entry in &profile.mod_set {
                let pulled_in_by_dropped = entry
                    .dependency_of
                    .as_deref()
                    .is_some_and(|parent| dropped.contains(parent));
                if pulled_in_by_dropped {
                    dropped.insert(entry.catalog_id.as_str());
                }
            }
            if dropped.len() == before {
                break;
            }
        }

        Ok(profile
            .mod_set
            .iter()
            .filter(|m| !dropped.contains(m.catalog_id.as_str()))
            .cloned()
            .collect())
    }

    /// Adds or re-pins an entry in the wanted set.
    pub fn upsert(profile: &Profile, entry: ModEntry) -> Vec<ModEntry> {
        let mut mod_set = profile.mod_set.clone();
        match mod_set.iter_mut().find(|m| m.catalog_id == entry.catalog_id) {
            Some(existing) => *existing = entry,
            None => mod_set.push(entry),
        }
        mod_set
    }

    /// Jars currently in `<profile>/mods`, whether or not they are tracked.
    pub async fn scan(profile: &Profile) -> LauncherResult<Vec<InstalledMod>> {
        let mods_dir = profile.mods_dir();
        let mut found = Vec::new();

        let mut entries = match tokio::fs::read_dir(&mods_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(source) => {
                return Err(LauncherError::Io {
                    path: mods_dir,
                    source,
                })
            }
        };

        while let Some(entry) = entries.next_entry().await.map_err(|source| LauncherError::Io {
            path: mods_dir.clone(),
            source,
        })? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let enabled = if file_name.ends_with(".jar") {
                true
            } else if file_name.ends_with(".jar.disabled") {
                false
            } else {
                continue;
            };
            let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            found.push(InstalledMod {
                file_name,
                enabled,
                size,
            });
        }

        found.sort_by(|a, b| a.file_name.to_lowercase().cmp(&b.file_name.to_lowercase()));
        Ok(found)
    }

    async fn install_all(
        &self,
        mods_dir: &Path,
        entries: Vec<ModEntry>,
        cancel: &CancellationToken,
    ) -> Vec<(ModEntry, LauncherResult<Installed>)> {
        stream::iter(entries)
            .map(|entry| async move {
                let result = self.install_one(mods_dir, &entry, cancel).await;
                (entry, result)
            })
            .buffer_unordered(self.downloader.concurrency())
            .collect()
            .await
    }

    async fn install_one(
        &self,
        mods_dir: &Path,
        entry: &ModEntry,
        cancel: &CancellationToken,
    ) -> LauncherResult<Installed> {
        let catalog = self.catalogs.get(entry.source)?;

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LauncherError::Cancelled),
            fetched = catalog.fetch(&entry.catalog_id, &entry.version_pin) => fetched?,
        };

        let dest = mods_dir.join(entry.file_name());
        match &fetched.payload {
            ModPayload::Bytes(bytes) => self.downloader.write_bytes(&dest, bytes, cancel).await?,
            ModPayload::Remote { url, sha1, .. } => {
                self.downloader
                    .download_file_cancellable(url, &dest, sha1.as_deref(), cancel)
                    .await?
            }
        }

        // A stale copy under the other name would load twice or not at all.
        let other = if entry.enabled {
            entry.disabled_name()
        } else {
            entry.jar_name()
        };
        remove_if_exists(&mods_dir.join(other)).await;

        debug!("Installed {} -> {:?}", entry.catalog_id, dest);
        Ok(Installed {
            entry: entry.clone(),
            dependencies: fetched.dependencies,
        })
    }

    async fn resolve_dependency(
        &self,
        profile: &Profile,
        parent: &ModEntry,
        dep: &ModDependency,
    ) -> LauncherResult<ModEntry> {
        let version_pin = match &dep.version_pin {
            Some(pin) => pin.clone(),
            None => {
                self.catalogs
                    .get(parent.source)?
                    .latest_version(
                        &dep.catalog_id,
                        Some(&profile.game_version),
                        profile.loader.catalog_loader(),
                    )
                    .await?
                    .id
            }
        };

        Ok(ModEntry {
            catalog_id: dep.catalog_id.clone(),
            source: parent.source,
            version_pin,
            enabled: true,
            dependency_of: Some(parent.catalog_id.clone()),
        })
    }
}

fn ensure_unique(mod_set: &[ModEntry]) -> LauncherResult<()> {
    let mut seen = HashSet::new();
    for entry in mod_set {
        if !seen.insert(entry.catalog_id.as_str()) {
            return Err(LauncherError::Validation(format!(
                "mod '{}' appears twice in the requested set",
                entry.catalog_id
            )));
        }
    }
    Ok(())
}

/// Recorded entries that are not wanted themselves but whose
/// `dependency_of` chain ends at a wanted entry.
fn retained_dependencies(recorded: &[ModEntry], wanted: &HashSet<&str>) -> Vec<ModEntry> {
    let mut kept: HashSet<&str> = HashSet::new();
    loop {
        let before = kept.len();
        for entry in recorded {
            let id = entry.catalog_id.as_str();
            if wanted.contains(id) || kept.contains(id) {
                continue;
            }
            let parent_stays = entry
                .dependency_of
                .as_deref()
                .is_some_and(|parent| wanted.contains(parent) || kept.contains(parent));
            if parent_stays {
                kept.insert(id);
            }
        }
        if kept.len() == before {
            break;
        }
    }

    recorded
        .iter()
        .filter(|m| kept.contains(m.catalog_id.as_str()))
        .cloned()
        .collect()
}

fn failure(entry: &ModEntry, e: &LauncherError) -> ModFailure {
    ModFailure {
        catalog_id: entry.catalog_id.clone(),
        source: entry.source,
        reason: e.to_string(),
        retryable: e.is_retryable(),
    }
}

/// Wanted entries keep their order, then retained dependencies, then new ones.
fn order_key(desired: &[ModEntry], retained: &[ModEntry], entry: &ModEntry) -> (usize, usize) {
    if let Some(i) = desired.iter().position(|m| m.catalog_id == entry.catalog_id) {
        return (0, i);
    }
    if let Some(i) = retained.iter().position(|m| m.catalog_id == entry.catalog_id) {
        return (1, i);
    }
    (2, 0)
}

/// Renames the entry's file to match `enabled`. False when neither name
/// exists.
async fn sync_enabled_state(mods_dir: &Path, entry: &ModEntry) -> bool {
    let wanted = mods_dir.join(entry.file_name());
    if tokio::fs::try_exists(&wanted).await.unwrap_or(false) {
        return true;
    }

    let other = if entry.enabled {
        mods_dir.join(entry.disabled_name())
    } else {
        mods_dir.join(entry.jar_name())
    };
    if !tokio::fs::try_exists(&other).await.unwrap_or(false) {
        return false;
    }

    match tokio::fs::rename(&other, &wanted).await {
        Ok(()) => {
            debug!("{} {}", if entry.enabled { "Enabled" } else { "Disabled" }, entry.catalog_id);
            true
        }
        Err(e) => {
            warn!("Could not rename {:?} -> {:?}: {}", other, wanted, e);
            true
        }
    }
}

async fn remove_files(mods_dir: &Path, entry: &ModEntry) {
    for name in [entry.jar_name(), entry.disabled_name()] {
        remove_if_exists(&mods_dir.join(name)).await;
    }
}

async fn remove_if_exists(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove {:?}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use super::*;
    use crate::core::http::build_http_client;
    use crate::core::mods::catalog::fakes::FakeCatalog;
    use crate::core::mods::catalog::ModDependency;
    use crate::core::mods::ModSource;
    use crate::core::profile::LoaderType;

    fn profile_in(dir: &Path) -> Profile {
        Profile {
            id: "p1".into(),
            name: "Mods".into(),
            game_version: "1.20.1".into(),
            loader: LoaderType::Fabric,
            loader_version: Some("0.15.11".into()),
            directory: dir.to_path_buf(),
            mod_set: Vec::new(),
            created_at: Utc::now(),
            last_played: None,
            icon: "🎮".into(),
        }
    }

    fn manager(catalog: FakeCatalog) -> (ModSetManager, Arc<FakeCatalog>) {
        let catalog = Arc::new(catalog);
        let downloader = Arc::new(Downloader::new(build_http_client().unwrap()).with_concurrency(4));
        let dyn_catalog: Arc<dyn crate::core::mods::ModCatalog> = catalog.clone();
        let set = CatalogSet::new().with(dyn_catalog);
        (ModSetManager::new(set, downloader), catalog)
    }

    fn sodium(pin: &str) -> ModEntry {
        ModEntry::new("sodium", ModSource::Modrinth, pin)
    }

    #[tokio::test]
    async fn second_reconcile_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (mgr, catalog) = manager(FakeCatalog::new(ModSource::Modrinth));
        let mut profile = profile_in(dir.path());
        let desired = vec![sodium("0.5.0"), ModEntry::new("lithium", ModSource::Modrinth, "0.11.2")];

        let first = mgr.reconcile(&profile, &desired, &CancellationToken::new()).await.unwrap();
        assert_eq!(first.report.installed.len(), 2);
        assert!(dir.path().join("mods/modrinth-sodium-0.5.0.jar").is_file());

        profile.mod_set = first.mod_set;
        let second = mgr.reconcile(&profile, &desired, &CancellationToken::new()).await.unwrap();
        assert!(second.report.is_noop());
        assert_eq!(second.report.unchanged.len(), 2);
        assert_eq!(catalog.fetch_count(), 2);
        assert_eq!(second.mod_set, desired);
    }

    #[tokio::test]
    async fn failed_fetch_is_reported_and_kept_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        let (mgr, _) = manager(FakeCatalog::new(ModSource::Modrinth).fail_on(&["sodium"]));
        let profile = profile_in(dir.path());
        let desired = vec![sodium("0.5.0"), ModEntry::new("lithium", ModSource::Modrinth, "0.11.2")];

        let outcome = mgr.reconcile(&profile, &desired, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.report.failed.len(), 1);
        assert_eq!(outcome.report.failed[0].catalog_id, "sodium");
        assert!(outcome.report.failed[0].retryable);
        assert_eq!(outcome.report.installed, vec!["lithium".to_string()]);
        assert_eq!(outcome.mod_set, desired);
        assert!(!dir.path().join("mods/modrinth-sodium-0.5.0.jar").exists());
        assert!(!dir.path().join("mods/modrinth-sodium-0.5.0.jar.part").exists());
    }

    #[tokio::test]
    async fn pin_change_removes_then_installs() {
        let dir = tempfile::tempdir().unwrap();
        let (mgr, _) = manager(FakeCatalog::new(ModSource::Modrinth));
        let mut profile = profile_in(dir.path());

        let first = mgr
            .reconcile(&profile, &[sodium("0.5.0")], &CancellationToken::new())
            .await
            .unwrap();
        profile.mod_set = first.mod_set;

        let second = mgr
            .reconcile(&profile, &[sodium("0.5.3")], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(second.report.removed, vec!["sodium".to_string()]);
        assert_eq!(second.report.installed, vec!["sodium".to_string()]);
        assert!(!dir.path().join("mods/modrinth-sodium-0.5.0.jar").exists());
        assert_eq!(
            std::fs::read(dir.path().join("mods/modrinth-sodium-0.5.3.jar")).unwrap(),
            b"sodium@0.5.3"
        );
    }

    #[tokio::test]
    async fn entries_no_longer_wanted_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let (mgr, _) = manager(FakeCatalog::new(ModSource::Modrinth));
        let mut profile = profile_in(dir.path());

        let first = mgr
            .reconcile(&profile, &[sodium("0.5.0")], &CancellationToken::new())
            .await
            .unwrap();
        profile.mod_set = first.mod_set;

        let second = mgr.reconcile(&profile, &[], &CancellationToken::new()).await.unwrap();
        assert_eq!(second.report.removed, vec!["sodium".to_string()]);
        assert!(second.mod_set.is_empty());
        assert!(std::fs::read_dir(dir.path().join("mods")).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn required_dependencies_follow_their_parent() {
        let dir = tempfile::tempdir().unwrap();
        let mut fake = FakeCatalog::new(ModSource::Modrinth);
        fake.dependencies = HashMap::from([(
            "modmenu".to_string(),
            vec![
                ModDependency {
                    catalog_id: "fabric-api".into(),
                    version_pin: None,
                    required: true,
                },
                ModDependency {
                    catalog_id: "optional-thing".into(),
                    version_pin: None,
                    required: false,
                },
            ],
        )]);
        fake.latest = HashMap::from([("fabric-api".to_string(), "0.92.0".to_string())]);
        let (mgr, _) = manager(fake);
        let mut profile = profile_in(dir.path());
        let desired = vec![ModEntry::new("modmenu", ModSource::Modrinth, "7.2.2")];

        let first = mgr.reconcile(&profile, &desired, &CancellationToken::new()).await.unwrap();
        assert_eq!(first.report.installed, vec!["modmenu".to_string(), "fabric-api".to_string()]);
        let dep = &first.mod_set[1];
        assert_eq!(dep.catalog_id, "fabric-api");
        assert_eq!(dep.version_pin, "0.92.0");
        assert_eq!(dep.dependency_of.as_deref(), Some("modmenu"));

        // Reconciling against the original wanted set keeps the dependency.
        profile.mod_set = first.mod_set.clone();
        let second = mgr.reconcile(&profile, &desired, &CancellationToken::new()).await.unwrap();
        assert!(second.report.is_noop());
        assert_eq!(second.mod_set, first.mod_set);

        // Dropping the parent drops the dependency.
        let third = mgr.reconcile(&profile, &[], &CancellationToken::new()).await.unwrap();
        assert_eq!(third.report.removed.len(), 2);
        assert!(third.mod_set.is_empty());
    }

    fn requires(id: &str) -> ModDependency {
        ModDependency {
            catalog_id: id.into(),
            version_pin: None,
            required: true,
        }
    }

    fn modmenu_catalog() -> FakeCatalog {
        let mut fake = FakeCatalog::new(ModSource::Modrinth);
        fake.dependencies = HashMap::from([("modmenu".to_string(), vec![requires("fabric-api")])]);
        fake.latest = HashMap::from([("fabric-api".to_string(), "0.92.0".to_string())]);
        fake
    }

    #[tokio::test]
    async fn dependency_chains_survive_a_second_reconcile() {
        let dir = tempfile::tempdir().unwrap();
        let mut fake = FakeCatalog::new(ModSource::Modrinth);
        fake.dependencies = HashMap::from([
            ("a".to_string(), vec![requires("b")]),
            ("b".to_string(), vec![requires("c")]),
        ]);
        fake.latest = HashMap::from([
            ("b".to_string(), "2".to_string()),
            ("c".to_string(), "3".to_string()),
        ]);
        let (mgr, catalog) = manager(fake);
        let mut profile = profile_in(dir.path());
        let desired = vec![ModEntry::new("a", ModSource::Modrinth, "1")];

        let first = mgr.reconcile(&profile, &desired, &CancellationToken::new()).await.unwrap();
        assert_eq!(first.report.installed, vec!["a", "b", "c"]);
        assert_eq!(first.mod_set[2].dependency_of.as_deref(), Some("b"));

        profile.mod_set = first.mod_set.clone();
        let second = mgr.reconcile(&profile, &desired, &CancellationToken::new()).await.unwrap();
        assert!(second.report.is_noop(), "{:?}", second.report);
        assert_eq!(second.mod_set, first.mod_set);
        assert_eq!(catalog.fetch_count(), 3);
        assert!(dir.path().join("mods/modrinth-c-3.jar").is_file());

        // Dropping the head of the chain drops all of it.
        let third = mgr.reconcile(&profile, &[], &CancellationToken::new()).await.unwrap();
        assert_eq!(third.report.removed.len(), 3);
    }

    #[tokio::test]
    async fn failed_dependency_is_recorded_and_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (mgr, catalog) = manager(modmenu_catalog().fail_on(&["fabric-api"]));
        let mut profile = profile_in(dir.path());
        let desired = vec![ModEntry::new("modmenu", ModSource::Modrinth, "7.2.2")];

        let first = mgr.reconcile(&profile, &desired, &CancellationToken::new()).await.unwrap();
        assert_eq!(first.report.installed, vec!["modmenu"]);
        assert_eq!(first.report.failed[0].catalog_id, "fabric-api");
        let dep = &first.mod_set[1];
        assert_eq!(dep.catalog_id, "fabric-api");
        assert_eq!(dep.dependency_of.as_deref(), Some("modmenu"));

        catalog.set_failing(&[]);
        profile.mod_set = first.mod_set.clone();
        let second = mgr.reconcile(&profile, &desired, &CancellationToken::new()).await.unwrap();
        assert_eq!(second.report.installed, vec!["fabric-api"]);
        assert_eq!(second.report.unchanged, vec!["modmenu"]);
        assert!(second.report.failed.is_empty());
        assert_eq!(second.mod_set, first.mod_set);
        assert!(dir.path().join("mods/modrinth-fabric-api-0.92.0.jar").is_file());
    }

    #[tokio::test]
    async fn unresolvable_dependency_rolls_back_its_parent() {
        let dir = tempfile::tempdir().unwrap();
        let mut fake = FakeCatalog::new(ModSource::Modrinth);
        fake.dependencies = HashMap::from([("modmenu".to_string(), vec![requires("ghost")])]);
        let (mgr, catalog) = manager(fake);
        let mut profile = profile_in(dir.path());
        let desired = vec![ModEntry::new("modmenu", ModSource::Modrinth, "7.2.2")];

        let first = mgr.reconcile(&profile, &desired, &CancellationToken::new()).await.unwrap();
        assert!(first.report.installed.is_empty());
        let failed: Vec<_> = first.report.failed.iter().map(|f| f.catalog_id.as_str()).collect();
        assert_eq!(failed, ["ghost", "modmenu"]);
        assert_eq!(first.mod_set, desired);
        assert!(!dir.path().join("mods/modrinth-modmenu-7.2.2.jar").exists());

        // The parent is fetched again, which brings the dependency back up.
        profile.mod_set = first.mod_set;
        let second = mgr.reconcile(&profile, &desired, &CancellationToken::new()).await.unwrap();
        assert_eq!(catalog.fetch_count(), 2);
        assert_eq!(second.report.failed.len(), 2);
    }

    #[tokio::test]
    async fn removing_a_mod_drops_what_it_pulled_in() {
        let dir = tempfile::tempdir().unwrap();
        let (mgr, _) = manager(modmenu_catalog());
        let mut profile = profile_in(dir.path());
        let lithium = ModEntry::new("lithium", ModSource::Modrinth, "0.11.2");
        let desired = vec![ModEntry::new("modmenu", ModSource::Modrinth, "7.2.2"), lithium.clone()];

        let first = mgr.reconcile(&profile, &desired, &CancellationToken::new()).await.unwrap();
        profile.mod_set = first.mod_set;
        assert_eq!(profile.mod_set.len(), 3);

        let remaining = ModSetManager::remove(&profile, "modmenu").unwrap();
        assert_eq!(remaining, vec![lithium]);

        let outcome = mgr.reconcile(&profile, &remaining, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.report.removed, vec!["modmenu", "fabric-api"]);
        assert_eq!(outcome.mod_set, remaining);
        assert!(!dir.path().join("mods/modrinth-fabric-api-0.92.0.jar").exists());
    }

    #[tokio::test]
    async fn toggle_flips_flag_and_reconcile_renames() {
        let dir = tempfile::tempdir().unwrap();
        let (mgr, catalog) = manager(FakeCatalog::new(ModSource::Modrinth));
        let mut profile = profile_in(dir.path());

        let first = mgr
            .reconcile(&profile, &[sodium("0.5.0")], &CancellationToken::new())
            .await
            .unwrap();
        profile.mod_set = first.mod_set;

        let toggled = ModSetManager::toggle(&profile, "sodium", false).unwrap();
        assert!(!toggled[0].enabled);
        // Toggling alone never touches files.
        assert!(dir.path().join("mods/modrinth-sodium-0.5.0.jar").exists());

        let outcome = mgr.reconcile(&profile, &toggled, &CancellationToken::new()).await.unwrap();
        assert!(outcome.report.is_noop());
        assert_eq!(catalog.fetch_count(), 1);
        assert!(!dir.path().join("mods/modrinth-sodium-0.5.0.jar").exists());
        assert!(dir.path().join("mods/modrinth-sodium-0.5.0.jar.disabled").exists());

        let scanned = ModSetManager::scan(&profile).await.unwrap();
        assert_eq!(scanned.len(), 1);
        assert!(!scanned[0].enabled);
    }

    #[tokio::test]
    async fn toggle_unknown_mod_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let profile = profile_in(dir.path());
        assert!(matches!(
            ModSetManager::toggle(&profile, "nope", true),
            Err(LauncherError::ModNotFound(_))
        ));
    }

    #[tokio::test]
    async fn missing_file_is_reinstalled() {
        let dir = tempfile::tempdir().unwrap();
        let (mgr, catalog) = manager(FakeCatalog::new(ModSource::Modrinth));
        let mut profile = profile_in(dir.path());

        let first = mgr
            .reconcile(&profile, &[sodium("0.5.0")], &CancellationToken::new())
            .await
            .unwrap();
        profile.mod_set = first.mod_set;
        std::fs::remove_file(dir.path().join("mods/modrinth-sodium-0.5.0.jar")).unwrap();

        let second = mgr
            .reconcile(&profile, &[sodium("0.5.0")], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(second.report.installed, vec!["sodium".to_string()]);
        assert_eq!(catalog.fetch_count(), 2);
    }

    #[tokio::test]
    async fn cancelled_reconcile_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let (mgr, _) = manager(FakeCatalog::new(ModSource::Modrinth));
        let profile = profile_in(dir.path());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = mgr.reconcile(&profile, &[sodium("0.5.0")], &cancel).await.unwrap();

        assert_eq!(outcome.report.failed.len(), 1);
        assert!(outcome.report.installed.is_empty());
        assert!(std::fs::read_dir(dir.path().join("mods")).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn duplicate_ids_in_request_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (mgr, _) = manager(FakeCatalog::new(ModSource::Modrinth));
        let profile = profile_in(dir.path());

        let err = mgr
            .reconcile(&profile, &[sodium("0.5.0"), sodium("0.5.1")], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::Validation(_)));
    }

    #[tokio::test]
    async fn unconfigured_source_fails_only_that_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (mgr, _) = manager(FakeCatalog::new(ModSource::Modrinth));
        let profile = profile_in(dir.path());
        let desired = vec![
            sodium("0.5.0"),
            ModEntry::new("238222", ModSource::CurseForge, "4712866"),
        ];

        let outcome = mgr.reconcile(&profile, &desired, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.report.installed, vec!["sodium".to_string()]);
        assert_eq!(outcome.report.failed[0].catalog_id, "238222");
        assert!(!outcome.report.failed[0].retryable);
    }
}
