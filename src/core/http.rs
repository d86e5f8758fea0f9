use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::{Client, Response};

use crate::core::error::{LauncherError, LauncherResult};

pub const APP_USER_AGENT: &str = concat!("CraftLauncher/", env!("CARGO_PKG_VERSION"));

pub fn build_http_client() -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .connect_timeout(Duration::from_secs(15))
        .build()
}

/// Turns non-2xx responses into `DownloadFailed` so callers can tell
/// retryable statuses apart from permanent ones.
pub fn ensure_success(response: Response) -> LauncherResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(LauncherError::DownloadFailed {
        url: response.url().to_string(),
        status: status.as_u16(),
    })
}
