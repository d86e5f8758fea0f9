// ─── Commands ───
// UI-facing facade over the core. Every command takes the shared state and
// returns plain serializable data or a `LauncherError` ({ kind, message }).

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::auth::{Account, AccountKind, Credentials};
use crate::core::config::LauncherSettings;
use crate::core::error::LauncherError;
use crate::core::java::{self, JavaInstallation};
use crate::core::launch::LaunchOutcome;
use crate::core::manifest;
use crate::core::mods::{
    CatalogHit, CatalogVersion, InstalledMod, ModEntry, ModSetManager, ModSource, ReconcileReport,
    SearchQuery,
};
use crate::core::profile::{LoaderType, NewProfile, Profile, ProfileUpdate};
use crate::core::state::AppState;
use crate::core::version::list_loader_versions;

#[derive(Debug, Serialize)]
pub struct MinecraftVersionInfo {
    pub id: String,
    pub release_time: String,
    pub version_type: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProfilePayload {
    pub name: String,
    pub game_version: String,
    #[serde(default)]
    pub loader: LoaderType,
    pub loader_version: Option<String>,
    pub icon: Option<String>,
    /// OptiFine edition dropped into `mods/` of a Forge+OptiFine profile.
    #[serde(default)]
    pub optifine_version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileInfo {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub game_version: String,
    pub loader: LoaderType,
    pub loader_version: Option<String>,
    pub version_id: String,
    pub directory: String,
    pub mods: Vec<ModEntry>,
    pub icon: String,
    pub created_at: String,
    pub last_played: Option<String>,
    pub launching: bool,
}

impl ProfileInfo {
    fn new(profile: &Profile, launching: bool) -> Self {
        Self {
            id: profile.id.clone(),
            name: profile.name.clone(),
            display_name: profile.display_name(),
            game_version: profile.game_version.clone(),
            loader: profile.loader,
            loader_version: profile.loader_version.clone(),
            version_id: profile.version_id(),
            directory: profile.directory.to_string_lossy().to_string(),
            mods: profile.mod_set.clone(),
            icon: profile.icon.clone(),
            created_at: profile.created_at.to_rfc3339(),
            last_played: profile.last_played.map(|t| t.to_rfc3339()),
            launching,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchModsPayload {
    pub query: String,
    pub source: Option<ModSource>,
    /// Narrows results to the profile's game version and loader.
    pub profile_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AddModPayload {
    pub profile_id: String,
    pub catalog_id: String,
    pub source: ModSource,
    /// Latest compatible version when absent.
    pub version_pin: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccountInfo {
    pub kind: AccountKind,
    pub username: String,
    pub uuid: String,
    pub active: bool,
}

impl AccountInfo {
    fn new(account: &Account, active: Option<&Account>) -> Self {
        Self {
            kind: account.kind(),
            username: account.username().to_string(),
            uuid: account.uuid().to_string(),
            active: active.is_some_and(|a| a.kind() == account.kind() && a.uuid() == account.uuid()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LoginPayload {
    #[serde(alias = "offline")]
    Local { username: String },
    Microsoft { code: String },
    #[serde(rename = "elyby")]
    ElyBy { username: String, password: String },
}

// ── Versions & Java ─────────────────────────────────────

pub async fn get_minecraft_versions(
    state: &AppState,
) -> Result<Vec<MinecraftVersionInfo>, LauncherError> {
    let settings = state.config.get().await;
    let manifest = state.resolver.manifest().await?;

    Ok(manifest
        .visible(settings.show_snapshots, settings.show_old_versions)
        .into_iter()
        .map(|entry| MinecraftVersionInfo {
            id: entry.id.clone(),
            release_time: entry.release_time.clone(),
            version_type: entry.version_type.clone(),
        })
        .collect())
}

pub async fn get_loader_versions(
    state: &AppState,
    loader: LoaderType,
    minecraft_version: &str,
) -> Result<Vec<String>, LauncherError> {
    match loader {
        LoaderType::OptiFine => state.optifine.list_editions(minecraft_version).await,
        _ => list_loader_versions(&state.http_client, loader, minecraft_version).await,
    }
}

pub async fn get_java_installations() -> Result<Vec<JavaInstallation>, LauncherError> {
    Ok(java::detect_java_installations().await)
}

// ── Profiles ────────────────────────────────────────────

pub async fn list_profiles(state: &AppState) -> Result<Vec<ProfileInfo>, LauncherError> {
    Ok(state
        .registry
        .list()
        .await
        .iter()
        .map(|p| ProfileInfo::new(p, state.orchestrator.is_launching(&p.id)))
        .collect())
}

pub async fn get_profile(state: &AppState, id: &str) -> Result<ProfileInfo, LauncherError> {
    let profile = state.registry.get(id).await?;
    Ok(ProfileInfo::new(&profile, state.orchestrator.is_launching(id)))
}

pub async fn create_profile(
    state: &AppState,
    payload: CreateProfilePayload,
) -> Result<ProfileInfo, LauncherError> {
    let profile = state
        .registry
        .create_with(NewProfile {
            name: payload.name,
            game_version: payload.game_version,
            loader: payload.loader,
            loader_version: payload.loader_version,
            icon: payload.icon,
            mod_set: Vec::new(),
        })
        .await?;

    let edition = payload.optifine_version.filter(|v| !v.trim().is_empty());
    if let (LoaderType::ForgeOptiFine, Some(edition)) = (profile.loader, edition) {
        let installed = state
            .optifine
            .install_as_mod(
                &profile.game_version,
                &edition,
                &profile.mods_dir(),
                &CancellationToken::new(),
            )
            .await;
        if let Err(e) = installed {
            warn!("OptiFine mod installation failed, Forge is ready: {}", e);
        }
    }
    Ok(ProfileInfo::new(&profile, false))
}

pub async fn update_profile(
    state: &AppState,
    id: &str,
    changes: ProfileUpdate,
) -> Result<ProfileInfo, LauncherError> {
    let busy = state.orchestrator.reserve(id)?;
    let profile = state.registry.update(id, changes).await?;
    drop(busy);
    Ok(ProfileInfo::new(&profile, false))
}

pub async fn delete_profile(state: &AppState, id: &str) -> Result<(), LauncherError> {
    let _busy = state.orchestrator.reserve(id)?;
    state.registry.delete(id).await?;
    info!("Deleted profile {}", id);
    Ok(())
}

pub async fn export_profile(state: &AppState, id: &str) -> Result<String, LauncherError> {
    let profile = state.registry.get(id).await?;
    Ok(manifest::encode(&profile)?.into_string())
}

pub async fn import_profile(
    state: &AppState,
    code: &str,
    name: Option<&str>,
) -> Result<ProfileInfo, LauncherError> {
    let profile = state.registry.import(code, name).await?;
    Ok(ProfileInfo::new(&profile, false))
}

// ── Mods ────────────────────────────────────────────────

pub async fn search_mods(
    state: &AppState,
    payload: SearchModsPayload,
) -> Result<Vec<CatalogHit>, LauncherError> {
    let mut query = SearchQuery::new(payload.query);
    if let Some(limit) = payload.limit {
        query.limit = limit;
    }
    if let Some(offset) = payload.offset {
        query.offset = offset;
    }
    if let Some(id) = &payload.profile_id {
        let profile = state.registry.get(id).await?;
        query.loader = profile.loader.catalog_loader().map(str::to_string);
        query.game_version = Some(profile.game_version);
    }
    state.mods.catalogs().search(&query, payload.source).await
}

pub async fn get_mod_versions(
    state: &AppState,
    profile_id: &str,
    source: ModSource,
    catalog_id: &str,
) -> Result<Vec<CatalogVersion>, LauncherError> {
    let profile = state.registry.get(profile_id).await?;
    state
        .mods
        .catalogs()
        .get(source)?
        .versions(
            catalog_id,
            Some(&profile.game_version),
            profile.loader.catalog_loader(),
        )
        .await
}

/// Adds (or re-pins) a mod and installs it right away.
pub async fn add_mod(
    state: &AppState,
    payload: AddModPayload,
    cancel: &CancellationToken,
) -> Result<ReconcileReport, LauncherError> {
    let _busy = state.orchestrator.reserve(&payload.profile_id)?;
    let profile = state.registry.get(&payload.profile_id).await?;

    let pin = match payload.version_pin.filter(|p| !p.trim().is_empty()) {
        Some(pin) => pin,
        None => {
            state
                .mods
                .catalogs()
                .get(payload.source)?
                .latest_version(
                    &payload.catalog_id,
                    Some(&profile.game_version),
                    profile.loader.catalog_loader(),
                )
                .await?
                .id
        }
    };

    let entry = ModEntry::new(payload.catalog_id, payload.source, pin);
    let desired = ModSetManager::upsert(&profile, entry);
    apply_mod_set(state, &profile, desired, cancel).await
}

/// Flips the flag; the file is renamed on the next reconciliation.
pub async fn toggle_mod(
    state: &AppState,
    profile_id: &str,
    catalog_id: &str,
    enabled: bool,
) -> Result<ProfileInfo, LauncherError> {
    let _busy = state.orchestrator.reserve(profile_id)?;
    let profile = state.registry.get(profile_id).await?;
    let mod_set = ModSetManager::toggle(&profile, catalog_id, enabled)?;
    let profile = state.registry.set_mod_set(profile_id, mod_set).await?;
    Ok(ProfileInfo::new(&profile, false))
}

/// Drops the entry and deletes its file.
pub async fn remove_mod(
    state: &AppState,
    profile_id: &str,
    catalog_id: &str,
    cancel: &CancellationToken,
) -> Result<ReconcileReport, LauncherError> {
    let _busy = state.orchestrator.reserve(profile_id)?;
    let profile = state.registry.get(profile_id).await?;
    let desired = ModSetManager::remove(&profile, catalog_id)?;
    apply_mod_set(state, &profile, desired, cancel).await
}

pub async fn reconcile_mods(
    state: &AppState,
    profile_id: &str,
    cancel: &CancellationToken,
) -> Result<ReconcileReport, LauncherError> {
    let _busy = state.orchestrator.reserve(profile_id)?;
    let profile = state.registry.get(profile_id).await?;
    let desired = profile.mod_set.clone();
    apply_mod_set(state, &profile, desired, cancel).await
}

pub async fn list_installed_mods(
    state: &AppState,
    profile_id: &str,
) -> Result<Vec<InstalledMod>, LauncherError> {
    let profile = state.registry.get(profile_id).await?;
    ModSetManager::scan(&profile).await
}

async fn apply_mod_set(
    state: &AppState,
    profile: &Profile,
    desired: Vec<ModEntry>,
    cancel: &CancellationToken,
) -> Result<ReconcileReport, LauncherError> {
    let outcome = state.mods.reconcile(profile, &desired, cancel).await?;
    state.registry.set_mod_set(&profile.id, outcome.mod_set).await?;
    Ok(outcome.report)
}


// ── Accounts ────────────────────────────────────────────

pub async fn list_accounts(state: &AppState) -> Result<Vec<AccountInfo>, LauncherError> {
    let active = state.accounts.active().await;
    Ok(state
        .accounts
        .list()
        .await
        .iter()
        .map(|a| AccountInfo::new(a, active.as_ref()))
        .collect())
}

pub fn microsoft_login_url(state: &AppState) -> String {
    state.microsoft.login_url()
}

pub async fn login(state: &AppState, payload: LoginPayload) -> Result<AccountInfo, LauncherError> {
    let (kind, credentials) = match payload {
        LoginPayload::Local { username } => (AccountKind::Local, Credentials::Offline { username }),
        LoginPayload::Microsoft { code } => (AccountKind::Microsoft, Credentials::AuthCode { code }),
        LoginPayload::ElyBy { username, password } => (
            AccountKind::ElyBy,
            Credentials::Password { username, password },
        ),
    };

    let account = state
        .authenticators
        .get(kind)?
        .authenticate(credentials)
        .await?;
    let account = state.accounts.add(account).await?;
    Ok(AccountInfo::new(&account, Some(&account)))
}

pub async fn set_active_account(state: &AppState, uuid: &str) -> Result<(), LauncherError> {
    state.accounts.set_active(uuid).await
}

pub async fn remove_account(state: &AppState, uuid: &str) -> Result<(), LauncherError> {
    state.accounts.remove(uuid).await
}

pub async fn logout(state: &AppState) -> Result<(), LauncherError> {
    state.accounts.logout().await
}

// ── Settings ────────────────────────────────────────────

pub async fn get_settings(state: &AppState) -> Result<LauncherSettings, LauncherError> {
    Ok(state.config.get().await)
}

/// Replaces the settings record. Catalog keys, worker counts and the game
/// directory are picked up on the next start.
pub async fn update_settings(
    state: &AppState,
    settings: LauncherSettings,
) -> Result<LauncherSettings, LauncherError> {
    state.config.update(move |current| *current = settings).await
}

// ── Launch ──────────────────────────────────────────────

/// Launches with the active account, or offline as the configured username.
pub async fn launch_profile(
    state: &AppState,
    profile_id: &str,
    cancel: &CancellationToken,
) -> Result<LaunchOutcome, LauncherError> {
    let settings = state.config.get().await;
    let session = state
        .accounts
        .session(&state.authenticators, &settings.username)
        .await?;
    state
        .orchestrator
        .launch(profile_id, &session, cancel)
        .await
        .into_result()
}
