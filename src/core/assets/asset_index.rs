use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::downloader::{DownloadEntry, Downloader};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::AssetIndexInfo;

const RESOURCES_URL: &str = "https://resources.download.minecraft.net";

#[derive(Debug, Deserialize)]
pub struct AssetIndex {
    pub objects: HashMap<String, AssetObject>,
}

#[derive(Debug, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

impl AssetIndex {
    /// Objects not yet present under `<assets>/objects/<hh>/<hash>`.
    pub fn missing_objects(&self, assets_dir: &Path) -> Vec<DownloadEntry> {
        let objects_dir = assets_dir.join("objects");
        let mut entries: Vec<DownloadEntry> = self
            .objects
            .values()
            .filter(|obj| obj.hash.len() > 2)
            .filter_map(|obj| {
                let prefix = &obj.hash[..2];
                let dest = objects_dir.join(prefix).join(&obj.hash);
                if dest.exists() {
                    return None;
                }
                Some(DownloadEntry {
                    url: format!("{}/{}/{}", RESOURCES_URL, prefix, obj.hash),
                    dest,
                    sha1: Some(obj.hash.clone()),
                    size: Some(obj.size),
                })
            })
            .collect();
        // Several names can share one object.
        entries.sort_by(|a, b| a.dest.cmp(&b.dest));
        entries.dedup_by(|a, b| a.dest == b.dest);
        entries
    }
}

/// Fetches the asset index and every object it lists that is not cached.
///
/// Permanent failures of single objects are logged; transient ones fail
/// the call so the caller can retry.
pub async fn install_assets(
    info: &AssetIndexInfo,
    assets_dir: &Path,
    downloader: &Downloader,
    cancel: &CancellationToken,
) -> LauncherResult<()> {
    let index_path = assets_dir.join("indexes").join(format!("{}.json", info.id));
    let cached = match &info.sha1 {
        Some(sha1) => Downloader::validate_sha1(&index_path, sha1).await.unwrap_or(false),
        None => index_path.exists(),
    };
    if !cached {
        downloader
            .download_file_cancellable(&info.url, &index_path, info.sha1.as_deref(), cancel)
            .await?;
    }

    let raw = tokio::fs::read(&index_path)
        .await
        .map_err(|source| LauncherError::Io {
            path: index_path.clone(),
            source,
        })?;
    let index: AssetIndex = serde_json::from_slice(&raw)?;

    let entries = index.missing_objects(assets_dir);
    info!(
        "Asset index {}: {} objects, {} to download",
        info.id,
        index.objects.len(),
        entries.len()
    );
    if entries.is_empty() {
        return Ok(());
    }

    let failures = downloader.download_batch(entries, cancel).await;
    if failures.is_empty() {
        return Ok(());
    }

    warn!("{} asset downloads failed", failures.len());
    if cancel.is_cancelled() {
        return Err(LauncherError::Cancelled);
    }
    match failures.into_iter().find(|(_, e)| e.is_retryable()) {
        Some((_, e)) => Err(e),
        None => Ok(()),
    }
}
