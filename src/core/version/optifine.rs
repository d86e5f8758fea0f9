// ─── OptiFine ───
// optifine.net has no API: editions are scraped from the downloads page and
// jars come through the adloadx mirror page.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use reqwest::header::USER_AGENT;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::ensure_success;

pub const OPTIFINE_BASE: &str = "https://optifine.net";

/// optifine.net serves an empty page to unknown clients.
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

pub struct OptiFineSource {
    downloader: Arc<Downloader>,
    base_url: String,
}

impl OptiFineSource {
    pub fn new(downloader: Arc<Downloader>) -> Self {
        Self::with_base_url(downloader, OPTIFINE_BASE)
    }

    pub fn with_base_url(downloader: Arc<Downloader>, base_url: impl Into<String>) -> Self {
        Self {
            downloader,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_page(&self, url: &str) -> LauncherResult<String> {
        let response = self
            .downloader
            .client()
            .get(url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await?;
        let response =
            ensure_success(response).map_err(|e| LauncherError::LoaderApi(e.to_string()))?;
        Ok(response.text().await?)
    }

    /// Editions published for `minecraft_version`, e.g. `HD_U_I6`, in page
    /// order (newest first).
    pub async fn list_editions(&self, minecraft_version: &str) -> LauncherResult<Vec<String>> {
        let html = self.get_page(&format!("{}/downloads", self.base_url)).await?;
        editions_in_page(&html, minecraft_version)
    }

    /// Downloads `OptiFine_<mc>_<edition>.jar` to `dest`.
    pub async fn download(
        &self,
        minecraft_version: &str,
        edition: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        let file_name = jar_file_name(minecraft_version, edition);
        let page = self
            .get_page(&format!("{}/adloadx?f={}", self.base_url, file_name))
            .await?;
        let link = download_link(&page).ok_or_else(|| {
            LauncherError::Loader(format!("no download link for {file_name} on optifine.net"))
        })?;
        let url = if link.starts_with("http") {
            link
        } else {
            format!("{}/{}", self.base_url, link)
        };

        info!("Downloading OptiFine from {}", url);
        let request = self
            .downloader
            .client()
            .get(&url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(LauncherError::Cancelled),
            response = request => response?,
        };
        let bytes = ensure_success(response)?.bytes().await?;
        self.downloader.write_bytes(dest, &bytes, cancel).await
    }

    /// Drops the OptiFine jar into a Forge profile's `mods/` folder.
    pub async fn install_as_mod(
        &self,
        minecraft_version: &str,
        edition: &str,
        mods_dir: &Path,
        cancel: &CancellationToken,
    ) -> LauncherResult<PathBuf> {
        let dest = mods_dir.join(jar_file_name(minecraft_version, edition));
        if !dest.is_file() {
            self.download(minecraft_version, edition, &dest, cancel).await?;
        }
        info!("OptiFine {} installed as mod: {:?}", edition, dest);
        Ok(dest)
    }
}

pub fn jar_file_name(minecraft_version: &str, edition: &str) -> String {
    format!("OptiFine_{minecraft_version}_{edition}.jar")
}

fn editions_in_page(html: &str, minecraft_version: &str) -> LauncherResult<Vec<String>> {
    let pattern = format!(
        r"OptiFine_{}_([A-Za-z0-9_]+)\.jar",
        regex::escape(minecraft_version)
    );
    let re = Regex::new(&pattern).map_err(|e| LauncherError::Other(e.to_string()))?;

    let mut editions: Vec<String> = Vec::new();
    for caps in re.captures_iter(html) {
        let edition = caps[1].to_string();
        if !editions.contains(&edition) {
            editions.push(edition);
        }
    }
    Ok(editions)
}

fn download_link(page: &str) -> Option<String> {
    let relative = Regex::new(r"href='(downloadx\?f=[^']+)'").ok()?;
    if let Some(caps) = relative.captures(page) {
        return Some(caps[1].to_string());
    }
    let absolute = Regex::new(r#"(?i)href="(https://[^"]*optifine[^"]*\.jar)""#).ok()?;
    absolute.captures(page).map(|caps| caps[1].to_string())
}
