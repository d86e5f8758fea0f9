// ─── Version resolution ───
// Turns a version id (vanilla or loader profile) into everything a launch
// needs on disk: client jar, libraries, natives, assets.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::install::{LoaderInstaller, LoaderTarget};
use super::manifest::VersionManifest;
use super::version_file::{LibraryFile, VersionJson};
use crate::core::assets::install_assets;
use crate::core::downloader::{DownloadEntry, Downloader};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::ensure_success;
use crate::core::java::required_java_for_minecraft_version;
use crate::core::paths::LauncherPaths;
use crate::core::persist::write_safe;

const FABRIC_META_BASE: &str = "https://meta.fabricmc.net/v2";
const QUILT_META_BASE: &str = "https://meta.quiltmc.org/v3";

/// Longest `inheritsFrom` chain followed.
const MAX_INHERITANCE: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedVersion {
    pub version_id: String,
    pub main_class: String,
    /// Libraries in load order, client jar last.
    pub classpath: Vec<PathBuf>,
    pub client_jar: PathBuf,
    pub libraries_dir: PathBuf,
    pub asset_index: String,
    pub assets_dir: PathBuf,
    pub natives_dir: Option<PathBuf>,
    pub jvm_args: Vec<String>,
    pub game_args: Vec<String>,
    pub java_major: u32,
    pub version_type: String,
}

#[async_trait]
pub trait VersionResolver: Send + Sync {
    /// Fails with `VersionNotFound` when no source knows `version_id`.
    async fn resolve(
        &self,
        version_id: &str,
        cancel: &CancellationToken,
    ) -> LauncherResult<ResolvedVersion>;
}

/// Resolves against the shared game root, fetching from Mojang and the
/// Fabric/Quilt meta services what is not installed locally. Forge, NeoForge
/// and OptiFine versions go through the loader installer on first use.
pub struct MojangResolver {
    paths: LauncherPaths,
    downloader: Arc<Downloader>,
    manifest: OnceCell<VersionManifest>,
    installer: Option<Arc<dyn LoaderInstaller>>,
}

impl MojangResolver {
    pub fn new(paths: LauncherPaths, downloader: Arc<Downloader>) -> Self {
        Self {
            paths,
            downloader,
            manifest: OnceCell::new(),
            installer: None,
        }
    }

    pub fn with_installer(mut self, installer: Arc<dyn LoaderInstaller>) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Uses `manifest` instead of fetching it.
    pub fn with_manifest(mut self, manifest: VersionManifest) -> Self {
        self.manifest = OnceCell::new_with(Some(manifest));
        self
    }

    pub async fn manifest(&self) -> LauncherResult<&VersionManifest> {
        self.manifest
            .get_or_try_init(|| VersionManifest::fetch(self.downloader.client()))
            .await
    }

    fn version_json_path(&self, id: &str) -> PathBuf {
        self.paths.versions_dir().join(id).join(format!("{id}.json"))
    }

    /// The version JSON with its parents merged in, plus the id of the
    /// topmost parent (the game jar to use).
    async fn load_merged(
        &self,
        version_id: &str,
        cancel: &CancellationToken,
    ) -> LauncherResult<(Value, String)> {
        let mut chain = vec![self.load_version_json(version_id, cancel).await?];

        while let Some(parent) = chain
            .last()
            .and_then(|v| v.get("inheritsFrom"))
            .and_then(Value::as_str)
            .map(str::to_string)
        {
            if chain.len() > MAX_INHERITANCE {
                return Err(LauncherError::Other(format!(
                    "{version_id}: inheritsFrom chain is too long"
                )));
            }
            debug!("{} inherits from {}", version_id, parent);
            chain.push(self.load_version_json(&parent, cancel).await?);
        }

        let mut merged = chain.pop().unwrap_or(Value::Null);
        let root_id = merged
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(version_id)
            .to_string();
        while let Some(child) = chain.pop() {
            merged = VersionJson::merge_with_parent(&child, &merged);
        }
        Ok((merged, root_id))
    }

    /// Local copy first, then the installer for loader versions or the
    /// service that publishes `id`. Fetched files are cached under
    /// `versions/<id>/`.
    async fn load_version_json(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> LauncherResult<Value> {
        if let Some(value) = self.read_local_version(id).await? {
            return Ok(value);
        }
        let Some(target) = LoaderTarget::from_version_id(id) else {
            return self.fetch_version_json(id).await;
        };

        self.install_loader(&target, cancel).await?;
        self.read_local_version(id).await?.ok_or_else(|| {
            LauncherError::Loader(format!("installing {id} left no version file"))
        })
    }

    async fn read_local_version(&self, id: &str) -> LauncherResult<Option<Value>> {
        let path = self.version_json_path(id);
        match tokio::fs::read(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(LauncherError::Io { path, source }),
        }
    }

    async fn fetch_version_json(&self, id: &str) -> LauncherResult<Value> {
        let url = match loader_profile_url(id) {
            Some(url) => url,
            None => self.manifest().await?.find_version(id)?.url.clone(),
        };

        info!("Fetching version JSON for {}", id);
        let response = self.downloader.client().get(&url).send().await?;
        let response = match ensure_success(response) {
            Err(LauncherError::DownloadFailed { status: 400 | 404, .. }) => {
                return Err(LauncherError::VersionNotFound(id.to_string()))
            }
            other => other?,
        };
        let raw = response.text().await?;
        let value: Value = serde_json::from_str(&raw)?;

        write_safe(&self.version_json_path(id), raw.as_bytes()).await?;
        Ok(value)
    }

    /// Installs the plain game the loader builds on, then the loader itself.
    async fn install_loader(
        &self,
        target: &LoaderTarget,
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        let Some(installer) = &self.installer else {
            return Err(LauncherError::VersionNotFound(target.version_id()));
        };

        let minecraft = target.minecraft_version();
        let parent = match self.read_local_version(&minecraft).await? {
            Some(value) => value,
            None => self.fetch_version_json(&minecraft).await?,
        };
        let parent_version: VersionJson = serde_json::from_value(parent.clone())?;
        let client_jar = self
            .paths
            .versions_dir()
            .join(&minecraft)
            .join(format!("{minecraft}.jar"));
        self.ensure_client_jar(&parent_version, &client_jar, cancel).await?;

        info!("{} is not installed yet, running its installer", target.version_id());
        installer.install(target, &parent, cancel).await
    }

    async fn fetch_libraries(
        &self,
        files: &[LibraryFile],
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        let libraries_dir = self.paths.libraries_dir();
        let entries: Vec<DownloadEntry> = files
            .iter()
            .map(|f| DownloadEntry {
                url: f.url.clone(),
                dest: libraries_dir.join(&f.path),
                sha1: f.sha1.clone(),
                size: None,
            })
            .filter(|e| !e.dest.exists())
            .collect();
        if entries.is_empty() {
            return Ok(());
        }

        info!("Downloading {} libraries", entries.len());
        match self.downloader.download_batch(entries, cancel).await.into_iter().next() {
            Some((entry, e)) => {
                warn!("Library {} failed: {}", entry.url, e);
                Err(e)
            }
            None => Ok(()),
        }
    }

    async fn ensure_client_jar(
        &self,
        version: &VersionJson,
        client_jar: &Path,
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        let Some(client) = version.downloads.as_ref().and_then(|d| d.client.as_ref()) else {
            return Ok(());
        };
        if Downloader::validate_sha1(client_jar, &client.sha1)
            .await
            .unwrap_or(false)
        {
            return Ok(());
        }

        info!("Downloading client jar ({} bytes)", client.size);
        self.downloader
            .download_file_cancellable(&client.url, client_jar, Some(&client.sha1), cancel)
            .await
    }
}

#[async_trait]
impl VersionResolver for MojangResolver {
    async fn resolve(
        &self,
        version_id: &str,
        cancel: &CancellationToken,
    ) -> LauncherResult<ResolvedVersion> {
        let (merged, root_id) = self.load_merged(version_id, cancel).await?;
        let version: VersionJson = serde_json::from_value(merged)?;

        let jar_id = version.jar.clone().unwrap_or(root_id.clone());
        let client_jar = self
            .paths
            .versions_dir()
            .join(&jar_id)
            .join(format!("{jar_id}.jar"));
        self.ensure_client_jar(&version, &client_jar, cancel).await?;

        let allowed: Vec<_> = version
            .libraries
            .iter()
            .filter(|lib| lib.is_allowed_for_current_os())
            .collect();
        let artifacts: Vec<LibraryFile> = allowed.iter().filter_map(|lib| lib.artifact()).collect();
        let natives: Vec<LibraryFile> = allowed.iter().filter_map(|lib| lib.native()).collect();

        let mut all = artifacts.clone();
        all.extend(natives.iter().cloned());
        self.fetch_libraries(&all, cancel).await?;

        let libraries_dir = self.paths.libraries_dir();
        let mut classpath: Vec<PathBuf> = Vec::with_capacity(artifacts.len() + 1);
        for file in &artifacts {
            let path = libraries_dir.join(&file.path);
            if !classpath.contains(&path) {
                classpath.push(path);
            }
        }
        classpath.push(client_jar.clone());

        let natives_dir = if natives.is_empty() {
            None
        } else {
            let dir = self.paths.versions_dir().join(version_id).join("natives");
            let jars: Vec<PathBuf> = natives.iter().map(|n| libraries_dir.join(&n.path)).collect();
            extract_natives(jars, dir.clone()).await?;
            Some(dir)
        };

        let assets_dir = self.paths.assets_dir();
        if let Some(index) = &version.asset_index {
            install_assets(index, &assets_dir, &self.downloader, cancel).await?;
        }

        let java_major = version
            .required_java_major()
            .unwrap_or_else(|| required_java_for_minecraft_version(&root_id));

        info!(
            "Resolved {}: {} classpath entries, Java {}",
            version_id,
            classpath.len(),
            java_major
        );

        Ok(ResolvedVersion {
            version_id: version_id.to_string(),
            main_class: version.main_class.clone(),
            version_type: version.version_type.clone().unwrap_or_else(|| "release".into()),
            asset_index: version.asset_index_id().unwrap_or("legacy").to_string(),
            jvm_args: version.jvm_args(),
            game_args: version.game_args(),
            classpath,
            client_jar,
            libraries_dir,
            assets_dir,
            natives_dir,
            java_major,
        })
    }
}

/// Meta-service profile URL for Fabric and Quilt version ids
/// (`fabric-loader-<loader>-<game>`).
fn loader_profile_url(id: &str) -> Option<String> {
    let (base, rest) = if let Some(rest) = id.strip_prefix("fabric-loader-") {
        (FABRIC_META_BASE, rest)
    } else if let Some(rest) = id.strip_prefix("quilt-loader-") {
        (QUILT_META_BASE, rest)
    } else {
        return None;
    };
    let (loader, game) = rest.split_once('-')?;
    Some(format!("{base}/versions/loader/{game}/{loader}/profile/json"))
}

/// Unpacks the platform libraries of legacy native jars into `dir`.
async fn extract_natives(jars: Vec<PathBuf>, dir: PathBuf) -> LauncherResult<()> {
    tokio::task::spawn_blocking(move || -> LauncherResult<()> {
        std::fs::create_dir_all(&dir).map_err(|source| LauncherError::Io {
            path: dir.clone(),
            source,
        })?;

        for jar in &jars {
            let file = std::fs::File::open(jar).map_err(|source| LauncherError::Io {
                path: jar.clone(),
                source,
            })?;
            let mut archive = zip::ZipArchive::new(file)?;

            for i in 0..archive.len() {
                let mut entry = archive.by_index(i)?;
                let name = entry.name().to_string();
                if name.starts_with("META-INF") || name.contains('/') || name.contains('\\') {
                    continue;
                }
                let is_native = [".dll", ".so", ".dylib", ".jnilib"]
                    .iter()
                    .any(|ext| name.ends_with(ext));
                if !is_native {
                    continue;
                }

                let dest = dir.join(&name);
                let mut out = std::fs::File::create(&dest).map_err(|source| LauncherError::Io {
                    path: dest.clone(),
                    source,
                })?;
                std::io::copy(&mut entry, &mut out).map_err(|source| LauncherError::Io {
                    path: dest.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    })
    .await
    .map_err(|e| LauncherError::Other(format!("Task join error: {e}")))?
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http::build_http_client;
    use crate::core::version::install::fakes::FakeInstaller;

    fn resolver(root: &Path) -> MojangResolver {
        let paths = LauncherPaths::new(root.join("config"), root.join("game"));
        let downloader = Arc::new(Downloader::new(build_http_client().unwrap()));
        let manifest: VersionManifest =
            serde_json::from_value(serde_json::json!({"versions": []})).unwrap();
        MojangResolver::new(paths, downloader).with_manifest(manifest)
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn loader_ids_map_to_meta_profiles() {
        assert_eq!(
            loader_profile_url("fabric-loader-0.15.11-1.20.1").as_deref(),
            Some("https://meta.fabricmc.net/v2/versions/loader/1.20.1/0.15.11/profile/json")
        );
        assert_eq!(
            loader_profile_url("quilt-loader-0.26.0-1.20.1").as_deref(),
            Some("https://meta.quiltmc.org/v3/versions/loader/1.20.1/0.26.0/profile/json")
        );
        assert!(loader_profile_url("1.20.1-forge-47.2.0").is_none());
    }

    #[tokio::test]
    async fn unknown_version_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolver(dir.path())
            .resolve("1.99", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::VersionNotFound(_)));
    }

    fn vanilla_1_20_1(game: &Path) {
        write(
            &game.join("versions/1.20.1/1.20.1.json"),
            &serde_json::json!({
                "id": "1.20.1",
                "mainClass": "net.minecraft.client.main.Main",
                "javaVersion": {"majorVersion": 17},
                "arguments": {"game": ["--username", "${auth_player_name}"]}
            })
            .to_string(),
        );
    }

    #[tokio::test]
    async fn missing_forge_version_is_installed_then_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let game = dir.path().join("game");
        vanilla_1_20_1(&game);
        let installer = Arc::new(FakeInstaller::new(game.join("versions")));

        let resolved = resolver(dir.path())
            .with_installer(installer.clone())
            .resolve("1.20.1-forge-47.2.0", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolved.main_class, "cpw.mods.bootstraplauncher.BootstrapLauncher");
        assert_eq!(resolved.client_jar, game.join("versions/1.20.1/1.20.1.jar"));
        assert_eq!(
            resolved.game_args,
            ["--username", "${auth_player_name}", "--launchTarget", "forgeclient"]
        );
        assert_eq!(
            *installer.installed.lock().unwrap(),
            vec![LoaderTarget::Forge {
                minecraft: "1.20.1".into(),
                forge: "47.2.0".into()
            }]
        );
    }

    #[tokio::test]
    async fn installed_loader_is_not_installed_again() {
        let dir = tempfile::tempdir().unwrap();
        let game = dir.path().join("game");
        vanilla_1_20_1(&game);
        let installer = Arc::new(FakeInstaller::new(game.join("versions")));
        let resolver = resolver(dir.path()).with_installer(installer.clone());

        for _ in 0..2 {
            resolver
                .resolve("neoforge-20.1.5", &CancellationToken::new())
                .await
                .unwrap();
        }
        assert_eq!(installer.installed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unpublished_loader_version_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let game = dir.path().join("game");
        vanilla_1_20_1(&game);
        let mut installer = FakeInstaller::new(game.join("versions"));
        installer.unavailable = vec!["1.20.1-forge-0.0.0".into()];

        let err = resolver(dir.path())
            .with_installer(Arc::new(installer))
            .resolve("1.20.1-forge-0.0.0", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::VersionNotFound(_)));
    }

    #[tokio::test]
    async fn installed_loader_profile_resolves_through_its_parent() {
        let dir = tempfile::tempdir().unwrap();
        let game = dir.path().join("game");

        write(
            &game.join("versions/1.20.1/1.20.1.json"),
            &serde_json::json!({
                "id": "1.20.1",
                "mainClass": "net.minecraft.client.main.Main",
                "javaVersion": {"majorVersion": 17},
                "libraries": [{
                    "name": "com.mojang:brigadier:1.1.8",
                    "downloads": {"artifact": {
                        "path": "com/mojang/brigadier/1.1.8/brigadier-1.1.8.jar",
                        "sha1": "0000000000000000000000000000000000000000",
                        "size": 1,
                        "url": "https://libraries.minecraft.net/com/mojang/brigadier/1.1.8/brigadier-1.1.8.jar"
                    }}
                }],
                "arguments": {"game": ["--username", "${auth_player_name}"], "jvm": ["-cp", "${classpath}"]}
            })
            .to_string(),
        );
        write(
            &game.join("versions/1.20.1-forge-47.2.0/1.20.1-forge-47.2.0.json"),
            &serde_json::json!({
                "id": "1.20.1-forge-47.2.0",
                "inheritsFrom": "1.20.1",
                "mainClass": "cpw.mods.bootstraplauncher.BootstrapLauncher",
                "libraries": [{"name": "net.minecraftforge:fmlloader:1.20.1-47.2.0", "url": "https://maven.minecraftforge.net/"}],
                "arguments": {"game": ["--launchTarget", "forgeclient"]}
            })
            .to_string(),
        );
        write(&game.join("libraries/com/mojang/brigadier/1.1.8/brigadier-1.1.8.jar"), "jar");
        write(
            &game.join("libraries/net/minecraftforge/fmlloader/1.20.1-47.2.0/fmlloader-1.20.1-47.2.0.jar"),
            "jar",
        );

        let resolved = resolver(dir.path())
            .resolve("1.20.1-forge-47.2.0", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolved.main_class, "cpw.mods.bootstraplauncher.BootstrapLauncher");
        assert_eq!(resolved.java_major, 17);
        assert_eq!(resolved.client_jar, game.join("versions/1.20.1/1.20.1.jar"));
        assert_eq!(resolved.classpath.len(), 3);
        assert!(resolved.classpath[0].ends_with("fmlloader-1.20.1-47.2.0.jar"));
        assert_eq!(resolved.classpath.last(), Some(&resolved.client_jar));
        assert_eq!(
            resolved.game_args,
            ["--username", "${auth_player_name}", "--launchTarget", "forgeclient"]
        );
        assert_eq!(resolved.asset_index, "legacy");
    }
}
