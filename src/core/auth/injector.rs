// ─── authlib-injector ───
// Java agent that redirects the game's Yggdrasil calls to a third-party
// authserver. Cached under the config dir and refreshed weekly.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::ensure_success;

pub const INJECTOR_RELEASE_API: &str =
    "https://api.github.com/repos/yushijinhun/authlib-injector/releases/latest";
pub const INJECTOR_FALLBACK_URL: &str =
    "https://github.com/yushijinhun/authlib-injector/releases/download/v1.2.6/authlib-injector-1.2.6.jar";

const MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Deserialize)]
struct Release {
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Deserialize)]
struct ReleaseAsset {
    name: String,
    browser_download_url: String,
}

pub struct AuthlibInjector {
    downloader: Downloader,
    jar_path: PathBuf,
    release_api: String,
    fallback_url: String,
}

impl AuthlibInjector {
    pub fn new(downloader: Downloader, jar_path: impl Into<PathBuf>) -> Self {
        Self {
            downloader,
            jar_path: jar_path.into(),
            release_api: INJECTOR_RELEASE_API.to_string(),
            fallback_url: INJECTOR_FALLBACK_URL.to_string(),
        }
    }

    pub fn with_sources(
        mut self,
        release_api: impl Into<String>,
        fallback_url: impl Into<String>,
    ) -> Self {
        self.release_api = release_api.into();
        self.fallback_url = fallback_url.into();
        self
    }

    pub fn jar_path(&self) -> &Path {
        &self.jar_path
    }

    /// Path to a usable injector jar, downloading it when missing or older
    /// than a week. A stale copy is kept when the refresh fails.
    pub async fn ensure(&self, cancel: &CancellationToken) -> LauncherResult<PathBuf> {
        let age = jar_age(&self.jar_path).await;
        if matches!(age, Some(age) if age < MAX_AGE) {
            debug!("authlib-injector cache is fresh: {:?}", self.jar_path);
            return Ok(self.jar_path.clone());
        }

        match self.download(cancel).await {
            Ok(()) => Ok(self.jar_path.clone()),
            Err(LauncherError::Cancelled) => Err(LauncherError::Cancelled),
            Err(e) if age.is_some() => {
                warn!("Could not refresh authlib-injector, using cached copy: {}", e);
                Ok(self.jar_path.clone())
            }
            Err(e) => Err(e),
        }
    }

    async fn download(&self, cancel: &CancellationToken) -> LauncherResult<()> {
        let url = match self.latest_release_url().await {
            Ok(url) => url,
            Err(e) => {
                warn!(
                    "authlib-injector release lookup failed, using {}: {}",
                    self.fallback_url, e
                );
                self.fallback_url.clone()
            }
        };
        info!("Downloading authlib-injector from {}", url);
        self.downloader
            .download_file_cancellable(&url, &self.jar_path, None, cancel)
            .await
    }

    async fn latest_release_url(&self) -> LauncherResult<String> {
        let response = self.downloader.client().get(&self.release_api).send().await?;
        let release: Release = ensure_success(response)?.json().await?;
        first_jar(&release).ok_or_else(|| {
            LauncherError::Other("latest authlib-injector release has no jar asset".into())
        })
    }
}

/// JVM flags that load the agent against `auth_server`. They go ahead of
/// every other JVM argument.
pub fn injector_jvm_args(jar: &Path, auth_server: &str) -> Vec<String> {
    vec![
        format!("-javaagent:{}={}", jar.display(), auth_server),
        "-Dauthlibinjector.side=client".to_string(),
    ]
}

fn first_jar(release: &Release) -> Option<String> {
    release
        .assets
        .iter()
        .find(|a| a.name.ends_with(".jar"))
        .map(|a| a.browser_download_url.clone())
}

async fn jar_age(path: &Path) -> Option<Duration> {
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    )
}
