// ─── CurseForge catalog ───
// Requires an API key. Catalog ids are numeric mod ids, pins are file ids.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::info;

use super::catalog::{
    CatalogHit, CatalogVersion, FetchedMod, ModCatalog, ModDependency, ModPayload, SearchQuery,
};
use super::model::ModSource;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::ensure_success;

const CURSEFORGE_API: &str = "https://api.curseforge.com/v1";
const MINECRAFT_GAME_ID: u32 = 432;
const MOD_CLASS_ID: u32 = 6;
/// `sortField=2` orders by popularity.
const SORT_BY_POPULARITY: u32 = 2;
const RELATION_REQUIRED: u32 = 3;
const HASH_ALGO_SHA1: u32 = 1;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfMod {
    id: u64,
    name: String,
    slug: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    download_count: f64,
    #[serde(default)]
    authors: Vec<CfAuthor>,
    #[serde(default)]
    logo: Option<CfLogo>,
    #[serde(default)]
    links: Option<CfLinks>,
}

#[derive(Debug, Deserialize)]
struct CfAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CfLogo {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfLinks {
    #[serde(default)]
    website_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfFile {
    id: u64,
    #[serde(default)]
    display_name: String,
    file_name: String,
    #[serde(default)]
    file_date: String,
    #[serde(default)]
    file_length: Option<u64>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    game_versions: Vec<String>,
    #[serde(default)]
    hashes: Vec<CfHash>,
    #[serde(default)]
    dependencies: Vec<CfDependency>,
}

#[derive(Debug, Deserialize)]
struct CfHash {
    value: String,
    algo: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfDependency {
    mod_id: u64,
    relation_type: u32,
}

impl CfFile {
    fn sha1(&self) -> Option<String> {
        self.hashes
            .iter()
            .find(|h| h.algo == HASH_ALGO_SHA1)
            .map(|h| h.value.clone())
    }

    fn dependencies(&self) -> Vec<ModDependency> {
        self.dependencies
            .iter()
            .map(|d| ModDependency {
                catalog_id: d.mod_id.to_string(),
                version_pin: None,
                required: d.relation_type == RELATION_REQUIRED,
            })
            .collect()
    }

    /// CurseForge mixes loader names into `gameVersions`.
    fn to_catalog_version(&self) -> CatalogVersion {
        let (loaders, game_versions): (Vec<String>, Vec<String>) = self
            .game_versions
            .iter()
            .cloned()
            .partition(|v| loader_type(v).is_some());

        CatalogVersion {
            id: self.id.to_string(),
            name: if self.display_name.is_empty() {
                self.file_name.clone()
            } else {
                self.display_name.clone()
            },
            version_number: self.display_name.clone(),
            game_versions,
            loaders: loaders.into_iter().map(|l| l.to_ascii_lowercase()).collect(),
            published: self.file_date.clone(),
        }
    }
}

/// CurseForge `modLoaderType` codes.
fn loader_type(loader: &str) -> Option<u32> {
    match loader.to_ascii_lowercase().as_str() {
        "forge" => Some(1),
        "cauldron" => Some(2),
        "liteloader" => Some(3),
        "fabric" => Some(4),
        "quilt" => Some(5),
        "neoforge" => Some(6),
        _ => None,
    }
}

pub struct CurseForgeCatalog {
    client: Client,
    api_key: String,
}

impl CurseForgeCatalog {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{CURSEFORGE_API}{path}"))
            .header("Accept", "application/json")
            .header("x-api-key", &self.api_key)
    }

    async fn file(&self, mod_id: &str, file_id: &str) -> LauncherResult<CfFile> {
        let resp = self.get(&format!("/mods/{mod_id}/files/{file_id}")).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(LauncherError::Catalog(format!(
                "CurseForge has no file {file_id} for mod {mod_id}"
            )));
        }
        let envelope: Envelope<CfFile> = ensure_success(resp)?.json().await?;
        Ok(envelope.data)
    }

    /// Some authors disable third-party distribution; the API then returns
    /// no `downloadUrl` and the dedicated endpoint may still have one.
    async fn download_url(&self, mod_id: &str, file: &CfFile) -> LauncherResult<String> {
        if let Some(url) = file.download_url.as_ref().filter(|u| !u.is_empty()) {
            return Ok(url.clone());
        }

        let resp = self
            .get(&format!("/mods/{mod_id}/files/{}/download-url", file.id))
            .send()
            .await?;
        if resp.status().is_success() {
            let envelope: Envelope<Option<String>> = resp.json().await?;
            if let Some(url) = envelope.data.filter(|u| !u.is_empty()) {
                return Ok(url);
            }
        }

        Err(LauncherError::Catalog(format!(
            "{} can only be downloaded manually from CurseForge",
            file.file_name
        )))
    }
}

#[async_trait]
impl ModCatalog for CurseForgeCatalog {
    fn source(&self) -> ModSource {
        ModSource::CurseForge
    }

    async fn search(&self, query: &SearchQuery) -> LauncherResult<Vec<CatalogHit>> {
        let mut params = vec![
            ("gameId", MINECRAFT_GAME_ID.to_string()),
            ("classId", MOD_CLASS_ID.to_string()),
            ("searchFilter", query.text.clone()),
            ("pageSize", query.limit.to_string()),
            ("index", query.offset.to_string()),
            ("sortField", SORT_BY_POPULARITY.to_string()),
            ("sortOrder", "desc".to_string()),
        ];
        if let Some(v) = &query.game_version {
            params.push(("gameVersion", v.clone()));
        }
        if let Some(t) = query.loader.as_deref().and_then(loader_type) {
            params.push(("modLoaderType", t.to_string()));
        }

        let resp = self.get("/mods/search").query(&params).send().await?;
        let envelope: Envelope<Vec<CfMod>> = ensure_success(resp)?.json().await?;

        let hits: Vec<CatalogHit> = envelope
            .data
            .into_iter()
            .map(|m| {
                let author = m
                    .authors
                    .iter()
                    .map(|a| a.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                let url = m
                    .links
                    .and_then(|l| l.website_url)
                    .unwrap_or_else(|| format!("https://www.curseforge.com/minecraft/mc-mods/{}", m.slug));
                CatalogHit {
                    catalog_id: m.id.to_string(),
                    name: m.name,
                    source: ModSource::CurseForge,
                    slug: m.slug,
                    description: m.summary,
                    author: if author.is_empty() { "Unknown".into() } else { author },
                    downloads: m.download_count.max(0.0) as u64,
                    icon_url: m.logo.and_then(|l| l.url),
                    url,
                }
            })
            .collect();

        info!("CurseForge search '{}': found {} mods", query.text, hits.len());
        Ok(hits)
    }

    async fn versions(
        &self,
        catalog_id: &str,
        game_version: Option<&str>,
        loader: Option<&str>,
    ) -> LauncherResult<Vec<CatalogVersion>> {
        let mut params = vec![("pageSize", "50".to_string())];
        if let Some(v) = game_version {
            params.push(("gameVersion", v.to_string()));
        }
        if let Some(t) = loader.and_then(loader_type) {
            params.push(("modLoaderType", t.to_string()));
        }

        let resp = self
            .get(&format!("/mods/{catalog_id}/files"))
            .query(&params)
            .send()
            .await?;
        let envelope: Envelope<Vec<CfFile>> = ensure_success(resp)?.json().await?;

        let mut files = envelope.data;
        files.sort_by(|a, b| b.file_date.cmp(&a.file_date));
        Ok(files.iter().map(CfFile::to_catalog_version).collect())
    }

    async fn fetch(&self, catalog_id: &str, version_pin: &str) -> LauncherResult<FetchedMod> {
        let file = self.file(catalog_id, version_pin).await?;
        let url = self.download_url(catalog_id, &file).await?;

        Ok(FetchedMod {
            payload: ModPayload::Remote {
                url,
                sha1: file.sha1(),
                size: file.file_length,
            },
            dependencies: file.dependencies(),
        })
    }
}
