// ─── Ely.by ───
// Yggdrasil-compatible authserver at authserver.ely.by.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::account::{Account, AccountKind, Authenticator, Credentials};
use crate::core::error::{LauncherError, LauncherResult};

pub const ELYBY_AUTHSERVER: &str = "https://authserver.ely.by";

pub struct ElyByAuthenticator {
    client: reqwest::Client,
    base_url: String,
    client_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticateRequest<'a> {
    username: &'a str,
    password: &'a str,
    client_token: &'a str,
    request_user: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    access_token: &'a str,
    client_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    access_token: String,
    #[serde(default)]
    client_token: Option<String>,
    #[serde(default)]
    selected_profile: Option<SelectedProfile>,
}

#[derive(Deserialize)]
struct SelectedProfile {
    id: String,
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    #[serde(default)]
    error_message: Option<String>,
}

impl ElyByAuthenticator {
    pub fn new(client: reqwest::Client, client_token: impl Into<String>) -> Self {
        Self::with_base_url(client, client_token, ELYBY_AUTHSERVER)
    }

    pub fn with_base_url(
        client: reqwest::Client,
        client_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            client_token: client_token.into(),
        }
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> LauncherResult<AuthResponse> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }
        if status.is_server_error() {
            return Err(LauncherError::DownloadFailed {
                url,
                status: status.as_u16(),
            });
        }

        let message = response
            .json::<ErrorResponse>()
            .await
            .ok()
            .and_then(|e| e.error_message)
            .unwrap_or_else(|| format!("Ely.by returned HTTP {status}"));
        Err(LauncherError::Auth(auth_message(&message)))
    }
}

fn auth_message(raw: &str) -> String {
    if raw.contains("Invalid credentials") {
        "Invalid username or password".to_string()
    } else {
        raw.to_string()
    }
}

#[async_trait]
impl Authenticator for ElyByAuthenticator {
    fn kind(&self) -> AccountKind {
        AccountKind::ElyBy
    }

    async fn authenticate(&self, credentials: Credentials) -> LauncherResult<Account> {
        let Credentials::Password { username, password } = credentials else {
            return Err(LauncherError::Auth("Ely.by needs a username and password".into()));
        };

        info!("Attempting Ely.by login for {}", username);
        let data = self
            .post(
                "/auth/authenticate",
                &AuthenticateRequest {
                    username: &username,
                    password: &password,
                    client_token: &self.client_token,
                    request_user: true,
                },
            )
            .await?;

        let Some(profile) = data.selected_profile else {
            return Err(LauncherError::Auth(format!(
                "Ely.by account {username} has no game profile"
            )));
        };

        info!("Ely.by login successful: {}", profile.name);
        Ok(Account::ElyBy {
            username: profile.name,
            uuid: profile.id,
            access_token: data.access_token,
            client_token: data.client_token.unwrap_or_else(|| self.client_token.clone()),
            expires_at: None,
        })
    }

    async fn refresh(&self, account: &Account) -> LauncherResult<Account> {
        let Account::ElyBy {
            username,
            uuid,
            access_token,
            client_token,
            ..
        } = account
        else {
            return Err(LauncherError::Auth(format!(
                "{} account passed to Ely.by",
                account.kind()
            )));
        };

        let data = self
            .post(
                "/auth/refresh",
                &RefreshRequest {
                    access_token,
                    client_token,
                },
            )
            .await
            .inspect_err(|e| warn!("Ely.by refresh failed: {}", e))?;

        info!("Ely.by token refreshed");
        Ok(Account::ElyBy {
            username: username.clone(),
            uuid: uuid.clone(),
            access_token: data.access_token,
            client_token: client_token.clone(),
            expires_at: None,
        })
    }
}
