// ─── Atomic persistence ───
// JSON records are written to `<file>.new`, synced, then renamed over the
// target. A failed write leaves the previous file intact.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::core::error::{LauncherError, LauncherResult};

pub async fn write_safe(path: &Path, content: &[u8]) -> LauncherResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| LauncherError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    let temp = temp_path(path);
    let io_err = |source| LauncherError::Io {
        path: temp.clone(),
        source,
    };

    {
        let mut temp_file = tokio::fs::File::create(&temp).await.map_err(io_err)?;
        temp_file.write_all(content).await.map_err(io_err)?;
        temp_file.flush().await.map_err(io_err)?;
        temp_file.sync_all().await.map_err(io_err)?;
    }

    if let Err(source) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(LauncherError::Io {
            path: path.to_path_buf(),
            source,
        });
    }

    Ok(())
}

pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> LauncherResult<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_safe(path, &json).await
}

/// Reads a JSON record. A missing file yields `Ok(None)`.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> LauncherResult<Option<T>> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(LauncherError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    Ok(Some(serde_json::from_slice(&raw)?))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("record"));
    name.push(".new");
    path.with_file_name(name)
}
