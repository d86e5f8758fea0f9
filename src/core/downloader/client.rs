use std::ffi::OsString;
use std::path::{Path, PathBuf};

use futures_util::stream::{self, Stream, StreamExt};
use reqwest::Client;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};

/// Progress notification for a finished file.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DownloadProgress {
    pub url: String,
    pub bytes_downloaded: u64,
    pub total_bytes: Option<u64>,
    pub file_name: String,
}

/// A single file to download with optional SHA-1 for validation.
#[derive(Debug, Clone)]
pub struct DownloadEntry {
    pub url: String,
    pub dest: PathBuf,
    pub sha1: Option<String>,
    pub size: Option<u64>,
}

/// Concurrent, SHA-1 validated, cancellable downloader.
///
/// Bytes are streamed into `<dest>.part` and renamed into place once
/// complete and verified. Failed or cancelled transfers remove the partial
/// file.
pub struct Downloader {
    client: Client,
    /// Maximum number of parallel downloads.
    concurrency: usize,
    progress: Option<UnboundedSender<DownloadProgress>>,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            concurrency: 8,
            progress: None,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_progress(mut self, tx: UnboundedSender<DownloadProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    // ── Single file download ────────────────────────────

    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        sha1_expected: Option<&str>,
    ) -> LauncherResult<()> {
        self.download_file_cancellable(url, dest, sha1_expected, &CancellationToken::new())
            .await
    }

    /// Download `url` to `dest`, optionally validating SHA-1.
    ///
    /// Creates parent directories as needed.
    pub async fn download_file_cancellable(
        &self,
        url: &str,
        dest: &Path,
        sha1_expected: Option<&str>,
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        ensure_parent(dest).await?;

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(LauncherError::Cancelled),
            response = self.client.get(url).send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total_bytes = response.content_length();
        let written =
            stream_to_file(response.bytes_stream(), dest, sha1_expected, cancel).await?;

        self.report(url, dest, written, total_bytes);
        debug!("Downloaded: {} -> {:?}", url, dest);
        Ok(())
    }

    /// Write an in-memory payload with the same `.part` + rename discipline.
    pub async fn write_bytes(
        &self,
        dest: &Path,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        ensure_parent(dest).await?;
        let chunks = stream::iter(bytes.chunks(64 * 1024).map(Ok::<_, LauncherError>));
        stream_to_file(chunks, dest, None, cancel).await?;
        Ok(())
    }

    fn report(&self, url: &str, dest: &Path, written: u64, total_bytes: Option<u64>) {
        if let Some(tx) = &self.progress {
            let file_name = dest
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let _ = tx.send(DownloadProgress {
                url: url.to_string(),
                bytes_downloaded: written,
                total_bytes,
                file_name,
            });
        }
    }

    // ── Batch concurrent downloads ──────────────────────

    /// Download many files concurrently using `buffer_unordered`.
    ///
    /// Returns the list of files that failed (if any).
    pub async fn download_batch(
        &self,
        entries: Vec<DownloadEntry>,
        cancel: &CancellationToken,
    ) -> Vec<(DownloadEntry, LauncherError)> {
        info!(
            "Starting batch download: {} files, concurrency={}",
            entries.len(),
            self.concurrency
        );

        let results: Vec<_> = stream::iter(entries)
            .map(|entry| async move {
                let result = self
                    .download_file_cancellable(&entry.url, &entry.dest, entry.sha1.as_deref(), cancel)
                    .await;
                (entry, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        results
            .into_iter()
            .filter_map(|(entry, result)| match result {
                Ok(()) => None,
                Err(e) => Some((entry, e)),
            })
            .collect()
    }

    /// Validate an existing file's SHA-1.
    pub async fn validate_sha1(path: &Path, expected: &str) -> LauncherResult<bool> {
        let bytes = tokio::fs::read(path).await.map_err(|e| LauncherError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut hasher = Sha1::new();
        hasher.update(&bytes);
        let actual = hex::encode(hasher.finalize());
        Ok(actual.eq_ignore_ascii_case(expected))
    }
}

pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("download"));
    name.push(".part");
    dest.with_file_name(name)
}

async fn ensure_parent(dest: &Path) -> LauncherResult<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LauncherError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }
    Ok(())
}

/// Streams chunks into `<dest>.part`, verifies the hash, renames into place.
/// Any failure, cancellation included, deletes the partial file.
pub(crate) async fn stream_to_file<S, B, E>(
    stream: S,
    dest: &Path,
    sha1_expected: Option<&str>,
    cancel: &CancellationToken,
) -> LauncherResult<u64>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<LauncherError>,
{
    let part = part_path(dest);

    let result: LauncherResult<u64> = async {
        let (written, actual) = write_part(stream, &part, cancel).await?;

        if let Some(expected) = sha1_expected {
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(LauncherError::Sha1Mismatch {
                    path: dest.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        tokio::fs::rename(&part, dest)
            .await
            .map_err(|source| LauncherError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
        Ok(written)
    }
    .await;

    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(&part).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove partial file {:?}: {}", part, e);
            }
        }
    }
    result
}

async fn write_part<S, B, E>(
    stream: S,
    part: &Path,
    cancel: &CancellationToken,
) -> LauncherResult<(u64, String)>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<LauncherError>,
{
    let io_err = |source| LauncherError::Io {
        path: part.to_path_buf(),
        source,
    };

    futures_util::pin_mut!(stream);
    let mut hasher = Sha1::new();
    let mut written = 0u64;

    // The handle is dropped before the caller renames; required on Windows.
    {
        let mut file = tokio::fs::File::create(part).await.map_err(io_err)?;
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LauncherError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Err(e.into()),
            };
            let bytes = chunk.as_ref();
            hasher.update(bytes);
            file.write_all(bytes).await.map_err(io_err)?;
            written += bytes.len() as u64;
        }
        file.flush().await.map_err(io_err)?;
    }

    Ok((written, hex::encode(hasher.finalize())))
}
