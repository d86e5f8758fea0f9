// ─── Loader installation ───
// Forge and NeoForge are installed by running their official installers
// against the game root. OptiFine is unpacked into a launchwrapper version
// that inherits from the plain game.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::optifine::OptiFineSource;
use super::version_file::maven_path;
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::java::{find_java, required_java_for_minecraft_version};
use crate::core::paths::LauncherPaths;
use crate::core::persist::write_safe;

const FORGE_MAVEN: &str = "https://maven.minecraftforge.net";
const NEOFORGE_MAVEN: &str = "https://maven.neoforged.net/releases";

const LAUNCHWRAPPER_MAIN: &str = "net.minecraft.launchwrapper.Launch";
const LAUNCHWRAPPER: &str = "net.minecraft:launchwrapper:1.12";
const OPTIFINE_TWEAKER: &str = "optifine.OptiFineTweaker";

/// Installer output kept in error messages.
const OUTPUT_TAIL: usize = 500;

/// A loader version the launcher can install when its version JSON is not on
/// disk yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderTarget {
    /// `<mc>-forge-<forge>`
    Forge { minecraft: String, forge: String },
    /// `neoforge-<version>`
    NeoForge { version: String },
    /// `<mc>-OptiFine_<edition>`
    OptiFine { minecraft: String, edition: String },
}

impl LoaderTarget {
    pub fn from_version_id(id: &str) -> Option<Self> {
        if let Some(version) = id.strip_prefix("neoforge-") {
            return (!version.is_empty()).then(|| LoaderTarget::NeoForge {
                version: version.to_string(),
            });
        }
        if let Some((minecraft, forge)) = id.split_once("-forge-") {
            return Some(LoaderTarget::Forge {
                minecraft: minecraft.to_string(),
                forge: forge.to_string(),
            });
        }
        if let Some((minecraft, edition)) = id.split_once("-OptiFine_") {
            return Some(LoaderTarget::OptiFine {
                minecraft: minecraft.to_string(),
                edition: edition.to_string(),
            });
        }
        None
    }

    pub fn version_id(&self) -> String {
        match self {
            LoaderTarget::Forge { minecraft, forge } => format!("{minecraft}-forge-{forge}"),
            LoaderTarget::NeoForge { version } => format!("neoforge-{version}"),
            LoaderTarget::OptiFine { minecraft, edition } => {
                format!("{minecraft}-OptiFine_{edition}")
            }
        }
    }

    /// The plain game version the loader builds on.
    pub fn minecraft_version(&self) -> String {
        match self {
            LoaderTarget::Forge { minecraft, .. } | LoaderTarget::OptiFine { minecraft, .. } => {
                minecraft.clone()
            }
            LoaderTarget::NeoForge { version } => neoforge_minecraft_version(version),
        }
    }

    /// Official installer jars, most likely location first. Empty for
    /// OptiFine.
    pub fn installer_urls(&self) -> Vec<String> {
        match self {
            LoaderTarget::Forge { minecraft, forge } => {
                let full = format!("{minecraft}-{forge}");
                vec![format!(
                    "{FORGE_MAVEN}/net/minecraftforge/forge/{full}/forge-{full}-installer.jar"
                )]
            }
            LoaderTarget::NeoForge { version } => vec![
                format!("{NEOFORGE_MAVEN}/net/neoforged/neoforge/{version}/neoforge-{version}-installer.jar"),
                // 1.20.1 builds were published as net.neoforged:forge.
                format!("{NEOFORGE_MAVEN}/net/neoforged/forge/{version}/forge-{version}-installer.jar"),
            ],
            LoaderTarget::OptiFine { .. } => Vec::new(),
        }
    }
}

/// NeoForge drops the leading `1.` of the game version: `20.4.237` is for
/// 1.20.4 and `21.0.x` for 1.21. Legacy builds carry the game version
/// (`1.20.1-47.1.106`).
fn neoforge_minecraft_version(version: &str) -> String {
    if let Some((minecraft, _)) = version.split_once('-').filter(|(mc, _)| mc.starts_with("1.")) {
        return minecraft.to_string();
    }
    let mut parts = version.split('.');
    let major = parts.next().unwrap_or("0");
    match parts.next() {
        Some("0") | None => format!("1.{major}"),
        Some(minor) => format!("1.{major}.{minor}"),
    }
}

#[async_trait]
pub trait LoaderInstaller: Send + Sync {
    /// Leaves `versions/<id>/<id>.json` for `target` under the game root.
    /// `parent` is the plain game's version JSON, already installed.
    async fn install(
        &self,
        target: &LoaderTarget,
        parent: &Value,
        cancel: &CancellationToken,
    ) -> LauncherResult<()>;
}

/// Installs into the shared game root.
pub struct GameDirInstaller {
    paths: LauncherPaths,
    downloader: Arc<Downloader>,
    optifine: OptiFineSource,
    java_path: Option<PathBuf>,
}

impl GameDirInstaller {
    pub fn new(paths: LauncherPaths, downloader: Arc<Downloader>) -> Self {
        let optifine = OptiFineSource::new(downloader.clone());
        Self {
            paths,
            downloader,
            optifine,
            java_path: None,
        }
    }

    /// Java used to run the installers; detected when unset.
    pub fn with_java(mut self, java_path: Option<PathBuf>) -> Self {
        self.java_path = java_path;
        self
    }

    pub fn with_optifine(mut self, optifine: OptiFineSource) -> Self {
        self.optifine = optifine;
        self
    }

    async fn run_official_installer(
        &self,
        target: &LoaderTarget,
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        let version_id = target.version_id();
        info!("Installing {}", version_id);

        let installer = self
            .paths
            .versions_dir()
            .join(".installers")
            .join(format!("{version_id}-installer.jar"));
        self.fetch_installer(target, &installer, cancel).await?;

        let game_dir = self.paths.game_dir().to_path_buf();
        ensure_launcher_profiles(&game_dir).await?;

        let major = required_java_for_minecraft_version(&target.minecraft_version());
        let java = find_java(self.java_path.as_deref(), major).await?;

        let result = run_installer(&java, &installer, &game_dir, cancel).await;
        if let Err(e) = tokio::fs::remove_file(&installer).await {
            debug!("Could not remove {:?}: {}", installer, e);
        }
        result?;

        info!("{} installed", version_id);
        Ok(())
    }

    async fn fetch_installer(
        &self,
        target: &LoaderTarget,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        let mut last_error = None;
        for url in target.installer_urls() {
            match self
                .downloader
                .download_file_cancellable(&url, dest, None, cancel)
                .await
            {
                Ok(()) => return Ok(()),
                Err(LauncherError::Cancelled) => return Err(LauncherError::Cancelled),
                Err(e) => {
                    warn!("Installer not available at {}: {}", url, e);
                    last_error = Some(e);
                }
            }
        }
        Err(match last_error {
            Some(LauncherError::DownloadFailed { status: 404, .. }) | None => {
                LauncherError::VersionNotFound(target.version_id())
            }
            Some(e) => e,
        })
    }

    async fn install_optifine(
        &self,
        minecraft: &str,
        edition: &str,
        parent: &Value,
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        let libraries_dir = self.paths.libraries_dir();
        let coordinate = format!("optifine:OptiFine:{minecraft}_{edition}");
        let jar = libraries_dir.join(coordinate_path(&coordinate)?);
        if !jar.is_file() {
            self.optifine.download(minecraft, edition, &jar, cancel).await?;
        }

        let wrapper = extract_launchwrapper(jar, libraries_dir).await?;
        let target = LoaderTarget::OptiFine {
            minecraft: minecraft.to_string(),
            edition: edition.to_string(),
        };
        let id = target.version_id();
        let version = optifine_version_json(&id, minecraft, &coordinate, &wrapper, parent);

        let path = self.paths.versions_dir().join(&id).join(format!("{id}.json"));
        write_safe(&path, &serde_json::to_vec_pretty(&version)?).await?;
        info!("OptiFine {} installed as {}", edition, id);
        Ok(())
    }
}

#[async_trait]
impl LoaderInstaller for GameDirInstaller {
    async fn install(
        &self,
        target: &LoaderTarget,
        parent: &Value,
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        match target {
            LoaderTarget::Forge { .. } | LoaderTarget::NeoForge { .. } => {
                self.run_official_installer(target, cancel).await
            }
            LoaderTarget::OptiFine { minecraft, edition } => {
                self.install_optifine(minecraft, edition, parent, cancel).await
            }
        }
    }
}

/// The Forge and NeoForge installers refuse to run without it.
async fn ensure_launcher_profiles(game_dir: &Path) -> LauncherResult<()> {
    let path = game_dir.join("launcher_profiles.json");
    if path.exists() {
        return Ok(());
    }
    let content = json!({
        "profiles": {},
        "selectedProfile": "(Default)",
        "authenticationDatabase": {},
        "launcherVersion": {"name": "CraftLauncher", "format": 21}
    });
    write_safe(&path, &serde_json::to_vec_pretty(&content)?).await
}

async fn run_installer(
    java: &Path,
    installer: &Path,
    game_dir: &Path,
    cancel: &CancellationToken,
) -> LauncherResult<()> {
    let mut cmd = Command::new(java);
    cmd.arg("-jar")
        .arg(installer)
        .arg("--installClient")
        .arg(game_dir)
        .current_dir(game_dir)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = tokio::select! {
        _ = cancel.cancelled() => return Err(LauncherError::Cancelled),
        output = cmd.output() => output
            .map_err(|e| LauncherError::JavaExecution(format!("{}: {}", java.display(), e)))?,
    };

    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let detail = if stderr.trim().is_empty() { stdout } else { stderr };
    Err(LauncherError::Loader(format!(
        "installer {} failed ({}): {}",
        installer.display(),
        output.status,
        tail(&detail, OUTPUT_TAIL)
    )))
}

fn tail(text: &str, max_chars: usize) -> &str {
    let text = text.trim();
    match text.char_indices().rev().nth(max_chars.saturating_sub(1)) {
        Some((at, _)) if at > 0 => &text[at..],
        _ => text,
    }
}

fn coordinate_path(coordinate: &str) -> LauncherResult<PathBuf> {
    maven_path(coordinate)
        .map(PathBuf::from)
        .ok_or_else(|| LauncherError::Loader(format!("bad library coordinate {coordinate}")))
}

/// Newer OptiFine jars bundle their own launchwrapper (`launchwrapper-of`);
/// it is unpacked into the libraries tree. Older ones use Mojang's.
/// Returns the coordinate to put on the classpath.
async fn extract_launchwrapper(optifine_jar: PathBuf, libraries_dir: PathBuf) -> LauncherResult<String> {
    tokio::task::spawn_blocking(move || -> LauncherResult<String> {
        let file = std::fs::File::open(&optifine_jar).map_err(|source| LauncherError::Io {
            path: optifine_jar.clone(),
            source,
        })?;
        let mut archive = zip::ZipArchive::new(file)?;

        let version = match archive.by_name("launchwrapper-of.txt") {
            Ok(mut entry) => {
                let mut text = String::new();
                entry.read_to_string(&mut text)?;
                text.trim().to_string()
            }
            Err(zip::result::ZipError::FileNotFound) => return Ok(LAUNCHWRAPPER.to_string()),
            Err(e) => return Err(e.into()),
        };

        let coordinate = format!("optifine:launchwrapper-of:{version}");
        let dest = libraries_dir.join(coordinate_path(&coordinate)?);
        if dest.is_file() {
            return Ok(coordinate);
        }

        let mut entry = archive.by_name(&format!("launchwrapper-of-{version}.jar"))?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LauncherError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut out = std::fs::File::create(&dest).map_err(|source| LauncherError::Io {
            path: dest.clone(),
            source,
        })?;
        std::io::copy(&mut entry, &mut out).map_err(|source| LauncherError::Io {
            path: dest.clone(),
            source,
        })?;
        Ok(coordinate)
    })
    .await
    .map_err(|e| LauncherError::Other(format!("Task join error: {e}")))?
}

/// Version JSON running the game through launchwrapper with the OptiFine
/// tweaker. Legacy parents get the tweaker appended to their
/// `minecraftArguments`, modern ones an extra `arguments.game` pair.
fn optifine_version_json(
    id: &str,
    minecraft: &str,
    optifine: &str,
    launchwrapper: &str,
    parent: &Value,
) -> Value {
    let mut version = json!({
        "id": id,
        "inheritsFrom": minecraft,
        "type": "release",
        "mainClass": LAUNCHWRAPPER_MAIN,
        "libraries": [{"name": optifine}, {"name": launchwrapper}],
    });
    match parent.get("minecraftArguments").and_then(Value::as_str) {
        Some(legacy) => {
            version["minecraftArguments"] =
                Value::String(format!("{legacy} --tweakClass {OPTIFINE_TWEAKER}"));
        }
        None => {
            version["arguments"] = json!({"game": ["--tweakClass", OPTIFINE_TWEAKER]});
        }
    }
    version
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::Mutex;

    use super::*;

    /// Writes a minimal version JSON for the target instead of running
    /// anything. Fails for the ids in `unavailable`.
    pub struct FakeInstaller {
        pub versions_dir: PathBuf,
        pub installed: Mutex<Vec<LoaderTarget>>,
        pub unavailable: Vec<String>,
    }

    impl FakeInstaller {
        pub fn new(versions_dir: impl Into<PathBuf>) -> Self {
            Self {
                versions_dir: versions_dir.into(),
                installed: Mutex::new(Vec::new()),
                unavailable: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl LoaderInstaller for FakeInstaller {
        async fn install(
            &self,
            target: &LoaderTarget,
            _parent: &Value,
            _cancel: &CancellationToken,
        ) -> LauncherResult<()> {
            let id = target.version_id();
            if self.unavailable.contains(&id) {
                return Err(LauncherError::VersionNotFound(id));
            }
            let path = self.versions_dir.join(&id).join(format!("{id}.json"));
            let version = json!({
                "id": id,
                "inheritsFrom": target.minecraft_version(),
                "mainClass": "cpw.mods.bootstraplauncher.BootstrapLauncher",
                "arguments": {"game": ["--launchTarget", "forgeclient"]}
            });
            write_safe(&path, version.to_string().as_bytes()).await?;
            self.installed.lock().unwrap().push(target.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn loader_version_ids_are_recognised() {
        assert_eq!(
            LoaderTarget::from_version_id("1.20.1-forge-47.2.0"),
            Some(LoaderTarget::Forge {
                minecraft: "1.20.1".into(),
                forge: "47.2.0".into()
            })
        );
        assert_eq!(
            LoaderTarget::from_version_id("neoforge-20.4.237"),
            Some(LoaderTarget::NeoForge {
                version: "20.4.237".into()
            })
        );
        assert_eq!(
            LoaderTarget::from_version_id("1.20.1-OptiFine_HD_U_I6"),
            Some(LoaderTarget::OptiFine {
                minecraft: "1.20.1".into(),
                edition: "HD_U_I6".into()
            })
        );
        assert_eq!(LoaderTarget::from_version_id("1.20.1"), None);
        assert_eq!(LoaderTarget::from_version_id("fabric-loader-0.15.11-1.20.1"), None);
        assert_eq!(LoaderTarget::from_version_id("neoforge-"), None);
    }

    #[test]
    fn neoforge_versions_map_back_to_the_game() {
        assert_eq!(neoforge_minecraft_version("20.4.237"), "1.20.4");
        assert_eq!(neoforge_minecraft_version("21.0.167"), "1.21");
        assert_eq!(neoforge_minecraft_version("21.1.77-beta"), "1.21.1");
        assert_eq!(neoforge_minecraft_version("1.20.1-47.1.106"), "1.20.1");
    }

    #[test]
    fn installer_urls_follow_the_maven_layout() {
        let forge = LoaderTarget::from_version_id("1.20.1-forge-47.2.0").unwrap();
        assert_eq!(
            forge.installer_urls(),
            ["https://maven.minecraftforge.net/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-installer.jar"]
        );

        let neo = LoaderTarget::from_version_id("neoforge-20.4.237").unwrap();
        let urls = neo.installer_urls();
        assert_eq!(urls.len(), 2);
        assert!(urls[0].ends_with("/net/neoforged/neoforge/20.4.237/neoforge-20.4.237-installer.jar"));
        assert!(urls[1].ends_with("/net/neoforged/forge/20.4.237/forge-20.4.237-installer.jar"));
    }

    #[test]
    fn optifine_json_keeps_legacy_arguments() {
        let parent = json!({"minecraftArguments": "--username ${auth_player_name}"});
        let version = optifine_version_json(
            "1.12.2-OptiFine_HD_U_G5",
            "1.12.2",
            "optifine:OptiFine:1.12.2_HD_U_G5",
            LAUNCHWRAPPER,
            &parent,
        );
        assert_eq!(version["inheritsFrom"], "1.12.2");
        assert_eq!(version["mainClass"], LAUNCHWRAPPER_MAIN);
        assert_eq!(
            version["minecraftArguments"],
            "--username ${auth_player_name} --tweakClass optifine.OptiFineTweaker"
        );
        assert!(version.get("arguments").is_none());
        assert_eq!(version["libraries"][1]["name"], LAUNCHWRAPPER);
    }

    #[test]
    fn optifine_json_extends_modern_arguments() {
        let parent = json!({"arguments": {"game": ["--username", "${auth_player_name}"]}});
        let version = optifine_version_json(
            "1.20.1-OptiFine_HD_U_I6",
            "1.20.1",
            "optifine:OptiFine:1.20.1_HD_U_I6",
            "optifine:launchwrapper-of:2.3",
            &parent,
        );
        assert_eq!(
            version["arguments"]["game"],
            json!(["--tweakClass", "optifine.OptiFineTweaker"])
        );
        assert!(version.get("minecraftArguments").is_none());
    }

    fn optifine_jar(path: &Path, bundled_wrapper: Option<&str>) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("Config.class", options).unwrap();
        zip.write_all(b"class").unwrap();
        if let Some(version) = bundled_wrapper {
            zip.start_file("launchwrapper-of.txt", options).unwrap();
            zip.write_all(format!("{version}\n").as_bytes()).unwrap();
            zip.start_file(format!("launchwrapper-of-{version}.jar"), options)
                .unwrap();
            zip.write_all(b"wrapper").unwrap();
        }
        zip.finish().unwrap();
    }

    #[tokio::test]
    async fn bundled_launchwrapper_is_unpacked() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("OptiFine.jar");
        optifine_jar(&jar, Some("2.3"));

        let libraries = dir.path().join("libraries");
        let coordinate = extract_launchwrapper(jar, libraries.clone()).await.unwrap();

        assert_eq!(coordinate, "optifine:launchwrapper-of:2.3");
        let unpacked = libraries.join("optifine/launchwrapper-of/2.3/launchwrapper-of-2.3.jar");
        assert_eq!(std::fs::read(unpacked).unwrap(), b"wrapper");
    }

    #[tokio::test]
    async fn old_optifine_uses_mojang_launchwrapper() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("OptiFine.jar");
        optifine_jar(&jar, None);

        let coordinate = extract_launchwrapper(jar, dir.path().join("libraries"))
            .await
            .unwrap();
        assert_eq!(coordinate, LAUNCHWRAPPER);
    }

    #[tokio::test]
    async fn optifine_install_writes_an_inheriting_version() {
        let dir = tempfile::tempdir().unwrap();
        let paths = LauncherPaths::new(dir.path().join("config"), dir.path().join("game"));
        let jar = paths
            .libraries_dir()
            .join("optifine/OptiFine/1.20.1_HD_U_I6/OptiFine-1.20.1_HD_U_I6.jar");
        optifine_jar(&jar, Some("2.3"));

        let installer = GameDirInstaller::new(
            paths.clone(),
            Arc::new(Downloader::new(reqwest::Client::new())),
        );
        let target = LoaderTarget::from_version_id("1.20.1-OptiFine_HD_U_I6").unwrap();
        installer
            .install(&target, &json!({"arguments": {"game": []}}), &CancellationToken::new())
            .await
            .unwrap();

        let written = paths
            .versions_dir()
            .join("1.20.1-OptiFine_HD_U_I6/1.20.1-OptiFine_HD_U_I6.json");
        let version: Value = serde_json::from_slice(&std::fs::read(written).unwrap()).unwrap();
        assert_eq!(version["inheritsFrom"], "1.20.1");
        assert_eq!(version["libraries"][0]["name"], "optifine:OptiFine:1.20.1_HD_U_I6");
        assert_eq!(version["libraries"][1]["name"], "optifine:launchwrapper-of:2.3");
    }

    #[tokio::test]
    async fn launcher_profiles_are_created_once() {
        let dir = tempfile::tempdir().unwrap();
        ensure_launcher_profiles(dir.path()).await.unwrap();
        let path = dir.path().join("launcher_profiles.json");
        let first: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(first["launcherVersion"]["name"], "CraftLauncher");

        std::fs::write(&path, b"{\"profiles\":{\"mine\":{}}}").unwrap();
        ensure_launcher_profiles(dir.path()).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{\"profiles\":{\"mine\":{}}}");
    }

    #[test]
    fn installer_output_is_cut_to_its_tail() {
        assert_eq!(tail("  short  ", 10), "short");
        assert_eq!(tail("0123456789", 4), "6789");
    }
}
