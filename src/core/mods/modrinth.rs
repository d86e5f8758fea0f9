// ─── Modrinth catalog ───
// Open API (no key). Pins are Modrinth version ids; a version number such as
// "0.5.0" is accepted too and resolved against the project's version list.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use super::catalog::{
    CatalogHit, CatalogVersion, FetchedMod, ModCatalog, ModDependency, ModPayload, SearchQuery,
};
use super::model::ModSource;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::ensure_success;

const MODRINTH_API: &str = "https://api.modrinth.com/v2";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    project_id: String,
    title: String,
    slug: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    downloads: u64,
    #[serde(default)]
    icon_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProjectVersion {
    id: String,
    project_id: String,
    #[serde(default)]
    name: Option<String>,
    version_number: String,
    #[serde(default)]
    game_versions: Vec<String>,
    #[serde(default)]
    loaders: Vec<String>,
    #[serde(default)]
    date_published: String,
    #[serde(default)]
    files: Vec<VersionFile>,
    #[serde(default)]
    dependencies: Vec<VersionDependency>,
}

#[derive(Debug, Clone, Deserialize)]
struct VersionFile {
    url: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    hashes: FileHashes,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileHashes {
    #[serde(default)]
    sha1: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct VersionDependency {
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    version_id: Option<String>,
    dependency_type: String,
}

impl ProjectVersion {
    fn primary_file(&self) -> Option<&VersionFile> {
        self.files
            .iter()
            .find(|f| f.primary)
            .or_else(|| self.files.first())
    }

    fn to_catalog_version(&self) -> CatalogVersion {
        CatalogVersion {
            id: self.id.clone(),
            name: self
                .name
                .clone()
                .unwrap_or_else(|| self.version_number.clone()),
            version_number: self.version_number.clone(),
            game_versions: self.game_versions.clone(),
            loaders: self.loaders.clone(),
            published: self.date_published.clone(),
        }
    }
}

pub struct ModrinthCatalog {
    client: Client,
    base_url: String,
}

impl ModrinthCatalog {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: MODRINTH_API.to_string(),
        }
    }

    async fn project_versions(
        &self,
        project_id: &str,
        game_version: Option<&str>,
        loader: Option<&str>,
    ) -> LauncherResult<Vec<ProjectVersion>> {
        let mut params = Vec::new();
        if let Some(v) = game_version {
            params.push(("game_versions", serde_json::to_string(&[v])?));
        }
        if let Some(l) = loader {
            params.push(("loaders", serde_json::to_string(&[l])?));
        }

        let url = format!("{}/project/{}/version", self.base_url, project_id);
        let resp = self.client.get(&url).query(&params).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(LauncherError::Catalog(format!(
                "Modrinth project '{project_id}' not found"
            )));
        }
        Ok(ensure_success(resp)?.json().await?)
    }

    /// Looks a pin up as a version id first, then as a version number.
    async fn find_version(&self, project_id: &str, pin: &str) -> LauncherResult<ProjectVersion> {
        let url = format!("{}/version/{}", self.base_url, pin);
        let resp = self.client.get(&url).send().await?;
        if resp.status() != StatusCode::NOT_FOUND {
            let version: ProjectVersion = ensure_success(resp)?.json().await?;
            if version.project_id == project_id || project_id.is_empty() {
                return Ok(version);
            }
            debug!("Version {} belongs to {}, not {}", pin, version.project_id, project_id);
        }

        self.project_versions(project_id, None, None)
            .await?
            .into_iter()
            .find(|v| v.version_number == pin || v.id == pin)
            .ok_or_else(|| {
                LauncherError::Catalog(format!("Modrinth has no version '{pin}' of '{project_id}'"))
            })
    }
}

#[async_trait]
impl ModCatalog for ModrinthCatalog {
    fn source(&self) -> ModSource {
        ModSource::Modrinth
    }

    async fn search(&self, query: &SearchQuery) -> LauncherResult<Vec<CatalogHit>> {
        let mut facets: Vec<Vec<String>> = Vec::new();
        if let Some(v) = &query.game_version {
            facets.push(vec![format!("versions:{v}")]);
        }
        if let Some(l) = &query.loader {
            facets.push(vec![format!("categories:{l}")]);
        }
        facets.push(vec!["project_type:mod".into()]);

        let params = [
            ("query", query.text.clone()),
            ("limit", query.limit.to_string()),
            ("offset", query.offset.to_string()),
            ("facets", serde_json::to_string(&facets)?),
        ];

        let url = format!("{}/search", self.base_url);
        let resp = self.client.get(&url).query(&params).send().await?;
        let data: SearchResponse = ensure_success(resp)?.json().await?;

        let hits: Vec<CatalogHit> = data
            .hits
            .into_iter()
            .map(|hit| CatalogHit {
                url: format!("https://modrinth.com/mod/{}", hit.slug),
                catalog_id: hit.project_id,
                name: hit.title,
                source: ModSource::Modrinth,
                slug: hit.slug,
                description: hit.description,
                author: hit.author.unwrap_or_else(|| "Unknown".into()),
                downloads: hit.downloads,
                icon_url: hit.icon_url,
            })
            .collect();

        info!("Modrinth search '{}': found {} mods", query.text, hits.len());
        Ok(hits)
    }

    async fn versions(
        &self,
        catalog_id: &str,
        game_version: Option<&str>,
        loader: Option<&str>,
    ) -> LauncherResult<Vec<CatalogVersion>> {
        Ok(self
            .project_versions(catalog_id, game_version, loader)
            .await?
            .iter()
            .filter(|v| !v.files.is_empty())
            .map(ProjectVersion::to_catalog_version)
            .collect())
    }

    async fn fetch(&self, catalog_id: &str, version_pin: &str) -> LauncherResult<FetchedMod> {
        let version = self.find_version(catalog_id, version_pin).await?;
        let file = version.primary_file().ok_or_else(|| {
            LauncherError::Catalog(format!("Modrinth version '{version_pin}' has no files"))
        })?;

        Ok(FetchedMod {
            payload: ModPayload::Remote {
                url: file.url.clone(),
                sha1: file.hashes.sha1.clone(),
                size: file.size,
            },
            dependencies: dependencies_of(&version),
        })
    }
}

fn dependencies_of(version: &ProjectVersion) -> Vec<ModDependency> {
    version
        .dependencies
        .iter()
        .filter_map(|dep| {
            let catalog_id = dep.project_id.clone()?;
            Some(ModDependency {
                catalog_id,
                version_pin: dep.version_id.clone(),
                required: dep.dependency_type == "required",
            })
        })
        .collect()
}
