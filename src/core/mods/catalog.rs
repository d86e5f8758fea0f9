use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use super::model::ModSource;
use crate::core::error::{LauncherError, LauncherResult};

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub game_version: Option<String>,
    /// Catalog loader name (`fabric`, `forge`, ...).
    pub loader: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            game_version: None,
            loader: None,
            limit: 20,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogHit {
    pub catalog_id: String,
    pub name: String,
    pub source: ModSource,
    pub slug: String,
    pub description: String,
    pub author: String,
    pub downloads: u64,
    pub icon_url: Option<String>,
    pub url: String,
}

/// A published file of a catalog item. `id` is what a `version_pin` holds.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogVersion {
    pub id: String,
    pub name: String,
    pub version_number: String,
    pub game_versions: Vec<String>,
    pub loaders: Vec<String>,
    pub published: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModDependency {
    pub catalog_id: String,
    /// Exact version when the catalog names one.
    pub version_pin: Option<String>,
    pub required: bool,
}

/// Where the binary comes from: already in memory, or a URL for the
/// downloader to stream.
#[derive(Debug, Clone)]
pub enum ModPayload {
    Bytes(Vec<u8>),
    Remote {
        url: String,
        sha1: Option<String>,
        size: Option<u64>,
    },
}

#[derive(Debug, Clone)]
pub struct FetchedMod {
    pub payload: ModPayload,
    pub dependencies: Vec<ModDependency>,
}

/// A mod hosting service.
#[async_trait]
pub trait ModCatalog: Send + Sync {
    fn source(&self) -> ModSource;

    async fn search(&self, query: &SearchQuery) -> LauncherResult<Vec<CatalogHit>>;

    /// Versions newest first, filtered by game version and loader when given.
    async fn versions(
        &self,
        catalog_id: &str,
        game_version: Option<&str>,
        loader: Option<&str>,
    ) -> LauncherResult<Vec<CatalogVersion>>;

    async fn fetch(&self, catalog_id: &str, version_pin: &str) -> LauncherResult<FetchedMod>;

    async fn latest_version(
        &self,
        catalog_id: &str,
        game_version: Option<&str>,
        loader: Option<&str>,
    ) -> LauncherResult<CatalogVersion> {
        self.versions(catalog_id, game_version, loader)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                LauncherError::Catalog(format!(
                    "no {} version of '{}' for {} / {}",
                    self.source(),
                    catalog_id,
                    game_version.unwrap_or("any version"),
                    loader.unwrap_or("any loader"),
                ))
            })
    }
}

/// The configured catalogs, addressed by source.
#[derive(Clone, Default)]
pub struct CatalogSet {
    catalogs: HashMap<ModSource, Arc<dyn ModCatalog>>,
}

impl CatalogSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, catalog: Arc<dyn ModCatalog>) -> Self {
        self.catalogs.insert(catalog.source(), catalog);
        self
    }

    pub fn sources(&self) -> Vec<ModSource> {
        let mut sources: Vec<_> = self.catalogs.keys().copied().collect();
        sources.sort_by_key(|s| s.to_string());
        sources
    }

    pub fn get(&self, source: ModSource) -> LauncherResult<Arc<dyn ModCatalog>> {
        self.catalogs
            .get(&source)
            .cloned()
            .ok_or_else(|| LauncherError::Catalog(format!("{source} catalog is not configured")))
    }

    /// Searches one source or all of them, most downloaded first.
    ///
    /// A failing source is logged and skipped; the call only fails when
    /// every queried source did.
    pub async fn search(
        &self,
        query: &SearchQuery,
        only: Option<ModSource>,
    ) -> LauncherResult<Vec<CatalogHit>> {
        let targets: Vec<Arc<dyn ModCatalog>> = match only {
            Some(source) => vec![self.get(source)?],
            None => self.catalogs.values().cloned().collect(),
        };

        let results = join_all(targets.iter().map(|c| c.search(query))).await;

        let mut hits = Vec::new();
        let mut first_error = None;
        let mut any_ok = false;
        for (catalog, result) in targets.iter().zip(results) {
            match result {
                Ok(found) => {
                    any_ok = true;
                    hits.extend(found);
                }
                Err(e) => {
                    warn!("{} search failed: {}", catalog.source(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let (false, Some(e)) = (any_ok, first_error) {
            return Err(e);
        }

        hits.sort_by(|a, b| b.downloads.cmp(&a.downloads));
        info!("Mod search '{}': {} results", query.text, hits.len());
        Ok(hits)
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::Mutex;

    use super::*;

    /// In-memory catalog. `fetch` fails with a network error for ids in
    /// `failing`, which tests may change between calls.
    pub struct FakeCatalog {
        pub source: ModSource,
        pub hits: Vec<CatalogHit>,
        pub failing: Mutex<Vec<String>>,
        pub dependencies: HashMap<String, Vec<ModDependency>>,
        pub latest: HashMap<String, String>,
        pub fetches: Mutex<Vec<(String, String)>>,
    }

    impl FakeCatalog {
        pub fn new(source: ModSource) -> Self {
            Self {
                source,
                hits: Vec::new(),
                failing: Mutex::new(Vec::new()),
                dependencies: HashMap::new(),
                latest: HashMap::new(),
                fetches: Mutex::new(Vec::new()),
            }
        }

        pub fn fail_on(self, ids: &[&str]) -> Self {
            self.set_failing(ids);
            self
        }

        pub fn set_failing(&self, ids: &[&str]) {
            *self.failing.lock().unwrap() = ids.iter().map(|id| id.to_string()).collect();
        }

        fn is_failing(&self, id: &str) -> bool {
            self.failing.lock().unwrap().iter().any(|f| f == id)
        }

        pub fn fetch_count(&self) -> usize {
            self.fetches.lock().unwrap().len()
        }
    }

    pub fn hit(source: ModSource, id: &str, downloads: u64) -> CatalogHit {
        CatalogHit {
            catalog_id: id.into(),
            name: id.into(),
            source,
            slug: id.into(),
            description: String::new(),
            author: "someone".into(),
            downloads,
            icon_url: None,
            url: format!("https://example.com/{id}"),
        }
    }

    #[async_trait]
    impl ModCatalog for FakeCatalog {
        fn source(&self) -> ModSource {
            self.source
        }

        async fn search(&self, _query: &SearchQuery) -> LauncherResult<Vec<CatalogHit>> {
            if self.is_failing("*search*") {
                return Err(LauncherError::Network("search unavailable".into()));
            }
            Ok(self.hits.clone())
        }

        async fn versions(
            &self,
            catalog_id: &str,
            _game_version: Option<&str>,
            _loader: Option<&str>,
        ) -> LauncherResult<Vec<CatalogVersion>> {
            Ok(self
                .latest
                .get(catalog_id)
                .map(|v| CatalogVersion {
                    id: v.clone(),
                    name: v.clone(),
                    version_number: v.clone(),
                    game_versions: vec!["1.20.1".into()],
                    loaders: vec!["fabric".into()],
                    published: String::new(),
                })
                .into_iter()
                .collect())
        }

        async fn fetch(&self, catalog_id: &str, version_pin: &str) -> LauncherResult<FetchedMod> {
            self.fetches
                .lock()
                .unwrap()
                .push((catalog_id.to_string(), version_pin.to_string()));

            if self.is_failing(catalog_id) {
                return Err(LauncherError::Network(format!("{catalog_id}: connection reset")));
            }
            Ok(FetchedMod {
                payload: ModPayload::Bytes(format!("{catalog_id}@{version_pin}").into_bytes()),
                dependencies: self.dependencies.get(catalog_id).cloned().unwrap_or_default(),
            })
        }
    }
}
