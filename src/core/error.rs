use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the entire launcher core.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha1Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── Parsing ─────────────────────────────────────────
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── User input ──────────────────────────────────────
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Mod not found in profile: {0}")]
    ModNotFound(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("A profile named '{0}' already exists")]
    DuplicateName(String),

    // ── Versions / manifests ────────────────────────────
    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("Malformed manifest code: {0}")]
    MalformedManifest(String),

    // ── Auth ────────────────────────────────────────────
    #[error("Authentication failed: {0}")]
    Auth(String),

    // ── Launch ──────────────────────────────────────────
    #[error("Profile {0} is busy launching or changing its mods")]
    AlreadyRunning(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Java not found for major version {0}")]
    JavaNotFound(u32),

    #[error("Java execution failed: {0}")]
    JavaExecution(String),

    // ── Loader / catalogs ───────────────────────────────
    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Loader API unreachable: {0}")]
    LoaderApi(String),

    #[error("Mod catalog error: {0}")]
    Catalog(String),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

/// Coarse classification surfaced to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    DuplicateName,
    Network,
    VersionNotFound,
    MalformedManifest,
    Auth,
    AlreadyRunning,
    Cancelled,
    Io,
    Internal,
}

impl LauncherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LauncherError::Io { .. } => ErrorKind::Io,
            LauncherError::Http(_)
            | LauncherError::DownloadFailed { .. }
            | LauncherError::Network(_)
            | LauncherError::LoaderApi(_)
            | LauncherError::Catalog(_) => ErrorKind::Network,
            LauncherError::Validation(_) => ErrorKind::Validation,
            LauncherError::ProfileNotFound(_)
            | LauncherError::ModNotFound(_)
            | LauncherError::AccountNotFound(_) => ErrorKind::NotFound,
            LauncherError::DuplicateName(_) => ErrorKind::DuplicateName,
            LauncherError::VersionNotFound(_) => ErrorKind::VersionNotFound,
            LauncherError::MalformedManifest(_) => ErrorKind::MalformedManifest,
            LauncherError::Auth(_) => ErrorKind::Auth,
            LauncherError::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
            LauncherError::Cancelled => ErrorKind::Cancelled,
            LauncherError::Sha1Mismatch { .. }
            | LauncherError::Xml(_)
            | LauncherError::Json(_)
            | LauncherError::Zip(_)
            | LauncherError::JavaNotFound(_)
            | LauncherError::JavaExecution(_)
            | LauncherError::Loader(_)
            | LauncherError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Transient failures worth another attempt after a backoff.
    ///
    /// 4xx responses other than 408/429 are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            LauncherError::Http(e) => match e.status() {
                Some(status) => status.is_server_error() || status.as_u16() == 429,
                None => true,
            },
            LauncherError::DownloadFailed { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            LauncherError::Network(_) => true,
            LauncherError::Sha1Mismatch { .. } => true,
            _ => false,
        }
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// ── Serialization for the UI layer ──────────────────────
// Errors cross the command boundary as `{ kind, message }`.
impl serde::Serialize for LauncherError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("LauncherError", 2)?;
        state.serialize_field("kind", &self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
