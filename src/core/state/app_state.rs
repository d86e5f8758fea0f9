use std::sync::Arc;

use reqwest::Client;
use tracing::{info, warn};

use crate::core::auth::{
    AccountStore, AuthenticatorSet, AuthlibInjector, ElyByAuthenticator, MicrosoftAuthenticator,
    OfflineAuthenticator,
};
use crate::core::config::ConfigStore;
use crate::core::downloader::Downloader;
use crate::core::error::LauncherResult;
use crate::core::http::build_http_client;
use crate::core::launch::{Orchestrator, SystemProcessStarter};
use crate::core::mods::{CatalogSet, CurseForgeCatalog, ModSetManager, ModrinthCatalog};
use crate::core::paths::LauncherPaths;
use crate::core::profile::ProfileRegistry;
use crate::core::version::{GameDirInstaller, MojangResolver, OptiFineSource};

/// Everything the launcher holds for the lifetime of the process.
///
/// Built once by [`AppState::init`] and handed to the command layer;
/// nothing reaches for it globally. [`AppState::shutdown`] flushes what
/// needs flushing.
pub struct AppState {
    pub paths: LauncherPaths,
    pub config: Arc<ConfigStore>,
    pub registry: Arc<ProfileRegistry>,
    pub accounts: Arc<AccountStore>,
    pub http_client: Client,
    pub downloader: Arc<Downloader>,
    pub mods: Arc<ModSetManager>,
    pub authenticators: AuthenticatorSet,
    pub microsoft: Arc<MicrosoftAuthenticator>,
    pub resolver: Arc<MojangResolver>,
    pub optifine: Arc<OptiFineSource>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Loads settings (or defaults), then the profile index and accounts,
    /// and wires the network collaborators. A `game_directory` setting
    /// overrides the game root in `paths`.
    pub async fn init(paths: LauncherPaths) -> LauncherResult<Self> {
        Self::build(paths, true).await
    }

    /// Like [`AppState::init`], but `paths.game_dir()` wins over the
    /// `game_directory` setting.
    pub async fn init_pinned(paths: LauncherPaths) -> LauncherResult<Self> {
        Self::build(paths, false).await
    }

    async fn build(paths: LauncherPaths, use_configured_game_dir: bool) -> LauncherResult<Self> {
        let config = Arc::new(ConfigStore::load_or_default(paths.config_file()).await);
        let settings = config.get().await;
        let paths = match (&settings.game_directory, use_configured_game_dir) {
            (Some(dir), true) => paths.with_game_dir(dir),
            _ => paths,
        };
        info!(
            "Config dir {:?}, game dir {:?}",
            paths.config_dir(),
            paths.game_dir()
        );

        let registry =
            Arc::new(ProfileRegistry::load(paths.profiles_file(), paths.profiles_dir()).await);
        let accounts =
            Arc::new(AccountStore::load(paths.accounts_file(), &paths.client_token_file()).await?);

        let http_client = build_http_client()?;
        let downloader = Arc::new(
            Downloader::new(http_client.clone()).with_concurrency(settings.download_workers),
        );

        let mut catalogs = CatalogSet::new().with(Arc::new(ModrinthCatalog::new(http_client.clone())));
        match settings.curseforge_key() {
            Some(key) => {
                catalogs = catalogs.with(Arc::new(CurseForgeCatalog::new(http_client.clone(), key)));
            }
            None => warn!("No CurseForge API key configured; CurseForge is disabled"),
        }
        let mods = Arc::new(ModSetManager::new(catalogs, downloader.clone()));

        let microsoft = Arc::new(MicrosoftAuthenticator::new(http_client.clone()));
        let authenticators = AuthenticatorSet::new()
            .with(Arc::new(OfflineAuthenticator))
            .with(microsoft.clone())
            .with(Arc::new(ElyByAuthenticator::new(
                http_client.clone(),
                accounts.client_token(),
            )));

        let installer = GameDirInstaller::new(paths.clone(), downloader.clone())
            .with_java(settings.java_path.clone());
        let resolver = Arc::new(
            MojangResolver::new(paths.clone(), downloader.clone())
                .with_installer(Arc::new(installer)),
        );
        let optifine = Arc::new(OptiFineSource::new(downloader.clone()));
        let injector = AuthlibInjector::new(
            Downloader::new(http_client.clone()),
            paths.authlib_injector_jar(),
        );
        let orchestrator = Arc::new(
            Orchestrator::new(
                registry.clone(),
                config.clone(),
                mods.clone(),
                resolver.clone(),
                Arc::new(SystemProcessStarter::new()),
            )
            .with_injector(Arc::new(injector)),
        );

        Ok(Self {
            paths,
            config,
            registry,
            accounts,
            http_client,
            downloader,
            mods,
            authenticators,
            microsoft,
            resolver,
            optifine,
            orchestrator,
        })
    }

    /// Writes the settings record one last time.
    pub async fn shutdown(&self) -> LauncherResult<()> {
        self.config.flush().await?;
        info!("Launcher state flushed");
        Ok(())
    }
}
