// ─── Version Manifest ───
// Mojang's piston-meta version manifest v2.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::ensure_success;

pub const VERSION_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

#[derive(Debug, Clone, Deserialize)]
pub struct VersionManifest {
    pub latest: Option<LatestVersions>,
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatestVersions {
    pub release: String,
    pub snapshot: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: String,
    #[serde(rename = "releaseTime")]
    pub release_time: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl VersionEntry {
    pub fn is_release(&self) -> bool {
        self.version_type == "release"
    }

    pub fn is_snapshot(&self) -> bool {
        self.version_type == "snapshot"
    }

    /// `old_alpha` / `old_beta`.
    pub fn is_old(&self) -> bool {
        self.version_type.starts_with("old_")
    }
}

impl VersionManifest {
    pub async fn fetch(client: &reqwest::Client) -> LauncherResult<Self> {
        info!("Fetching Minecraft version manifest...");

        let response = ensure_success(client.get(VERSION_MANIFEST_URL).send().await?)?;
        let manifest: VersionManifest = response.json().await?;

        info!("Loaded {} versions from manifest", manifest.versions.len());
        Ok(manifest)
    }

    pub fn find_version(&self, id: &str) -> LauncherResult<&VersionEntry> {
        self.versions
            .iter()
            .find(|v| v.id == id)
            .ok_or_else(|| LauncherError::VersionNotFound(id.to_string()))
    }

    /// Entries a version picker shows, newest first as Mojang orders them.
    /// Releases always; snapshots and alpha/beta builds on request.
    pub fn visible(&self, show_snapshots: bool, show_old_versions: bool) -> Vec<&VersionEntry> {
        self.versions
            .iter()
            .filter(|v| {
                v.is_release()
                    || (show_snapshots && v.is_snapshot())
                    || (show_old_versions && v.is_old())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> VersionManifest {
        serde_json::from_value(serde_json::json!({
            "latest": {"release": "1.20.4", "snapshot": "24w03a"},
            "versions": [
                {"id": "24w03a", "type": "snapshot", "releaseTime": "2024-01-17T12:00:00+00:00", "url": "https://example.com/24w03a.json"},
                {"id": "1.20.4", "type": "release", "releaseTime": "2023-12-07T08:00:00+00:00", "url": "https://example.com/1.20.4.json", "sha1": "abc123"},
                {"id": "b1.7.3", "type": "old_beta", "releaseTime": "2011-07-08T00:00:00+00:00", "url": "https://example.com/b1.7.3.json"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn deserialize_manifest_entry() {
        let m = manifest();
        let entry = m.find_version("1.20.4").unwrap();
        assert_eq!(entry.version_type, "release");
        assert_eq!(entry.release_time, "2023-12-07T08:00:00+00:00");
        assert_eq!(entry.sha1.as_deref(), Some("abc123"));
    }

    #[test]
    fn unknown_version_is_version_not_found() {
        assert!(matches!(
            manifest().find_version("1.99"),
            Err(LauncherError::VersionNotFound(_))
        ));
    }

    #[test]
    fn visibility_follows_settings() {
        let m = manifest();
        let ids = |v: Vec<&VersionEntry>| v.into_iter().map(|e| e.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(m.visible(false, false)), ["1.20.4"]);
        assert_eq!(ids(m.visible(true, false)), ["24w03a", "1.20.4"]);
        assert_eq!(ids(m.visible(true, true)), ["24w03a", "1.20.4", "b1.7.3"]);
    }
}
