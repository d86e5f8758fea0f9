// ─── Loader versions ───
// Lists installable loader versions for a game version from the loaders'
// own metadata services.

use serde::Deserialize;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::ensure_success;
use crate::core::profile::LoaderType;

const FABRIC_LOADERS_URL: &str = "https://meta.fabricmc.net/v2/versions/loader";
const QUILT_LOADERS_URL: &str = "https://meta.quiltmc.org/v3/versions/loader";
const FORGE_METADATA_URL: &str =
    "https://maven.minecraftforge.net/net/minecraftforge/forge/maven-metadata.xml";
const NEOFORGE_METADATA_URL: &str =
    "https://maven.neoforged.net/releases/net/neoforged/neoforge/maven-metadata.xml";

#[derive(Debug, Deserialize)]
struct MavenMetadata {
    versioning: MavenVersioning,
}

#[derive(Debug, Deserialize)]
struct MavenVersioning {
    versions: MavenVersions,
}

#[derive(Debug, Deserialize)]
struct MavenVersions {
    #[serde(rename = "version", default)]
    version: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MetaLoaderEntry {
    loader: MetaLoaderVersion,
}

#[derive(Debug, Deserialize)]
struct MetaLoaderVersion {
    version: String,
}

/// Loader versions for `minecraft_version`, newest first. Empty for loaders
/// without a public listing (vanilla, OptiFine).
pub async fn list_loader_versions(
    client: &reqwest::Client,
    loader: LoaderType,
    minecraft_version: &str,
) -> LauncherResult<Vec<String>> {
    let mut versions = match loader {
        LoaderType::Vanilla | LoaderType::OptiFine => Vec::new(),
        LoaderType::Fabric => meta_versions(client, FABRIC_LOADERS_URL, minecraft_version).await?,
        LoaderType::Quilt => meta_versions(client, QUILT_LOADERS_URL, minecraft_version).await?,
        LoaderType::Forge | LoaderType::ForgeOptiFine => {
            let all = maven_versions(client, FORGE_METADATA_URL).await?;
            forge_versions_for(&all, minecraft_version)
        }
        LoaderType::NeoForge => {
            let all = maven_versions(client, NEOFORGE_METADATA_URL).await?;
            neoforge_versions_for(&all, minecraft_version)
        }
    };

    sort_newest_first(&mut versions);
    debug!("{} {} versions for {}", versions.len(), loader, minecraft_version);
    Ok(versions)
}

async fn meta_versions(
    client: &reqwest::Client,
    base: &str,
    minecraft_version: &str,
) -> LauncherResult<Vec<String>> {
    let url = format!("{base}/{minecraft_version}");
    let response = ensure_success(client.get(&url).send().await?)
        .map_err(|e| LauncherError::LoaderApi(e.to_string()))?;
    let entries: Vec<MetaLoaderEntry> = response.json().await?;
    Ok(entries.into_iter().map(|e| e.loader.version).collect())
}

async fn maven_versions(client: &reqwest::Client, url: &str) -> LauncherResult<Vec<String>> {
    let response = ensure_success(client.get(url).send().await?)
        .map_err(|e| LauncherError::LoaderApi(e.to_string()))?;
    let xml = response.text().await?;
    let metadata: MavenMetadata = quick_xml::de::from_str(&xml)
        .map_err(|e| LauncherError::LoaderApi(format!("Unable to parse {url}: {e}")))?;
    Ok(metadata.versioning.versions.version)
}

/// Forge publishes `<mc>-<forge>`; the part after the prefix is the loader
/// version.
fn forge_versions_for(all: &[String], minecraft_version: &str) -> Vec<String> {
    let prefix = format!("{minecraft_version}-");
    all.iter()
        .filter_map(|v| v.strip_prefix(&prefix).map(str::to_owned))
        .collect()
}

/// NeoForge drops the leading `1.`: game 1.20.4 maps to `20.4.x`, and a
/// `.0` patch is omitted (1.21 maps to `21.0.x`).
fn neoforge_versions_for(all: &[String], minecraft_version: &str) -> Vec<String> {
    let mut parts = minecraft_version.trim_start_matches("1.").split('.');
    let minor = parts.next().unwrap_or_default();
    let patch = parts.next().unwrap_or("0");
    let prefix = format!("{minor}.{patch}.");
    all.iter().filter(|v| v.starts_with(&prefix)).cloned().collect()
}

fn version_sort_key(version: &str) -> Vec<u64> {
    version
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u64>().unwrap_or(0))
        .collect()
}

fn sort_newest_first(versions: &mut Vec<String>) {
    versions.sort_by(|a, b| {
        version_sort_key(b)
            .cmp(&version_sort_key(a))
            .then_with(|| b.cmp(a))
    });
    versions.dedup();
}
