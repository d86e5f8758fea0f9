// ─── Microsoft sign-in ───
// Live OAuth code -> Xbox Live -> XSTS -> Minecraft services token -> profile.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::account::{Account, AccountKind, Authenticator, Credentials};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::ensure_success;

pub const MS_CLIENT_ID: &str = "00000000402b5328";
const MS_AUTH_URL: &str = "https://login.live.com/oauth20_authorize.srf";
const MS_TOKEN_URL: &str = "https://login.live.com/oauth20_token.srf";
const MS_REDIRECT_URI: &str = "https://login.live.com/oauth20_desktop.srf";
const MS_SCOPE: &str = "service::user.auth.xboxlive.com::MBI_SSL";
const XBL_URL: &str = "https://user.auth.xboxlive.com/user/authenticate";
const XSTS_URL: &str = "https://xsts.auth.xboxlive.com/xsts/authorize";
const MC_LOGIN_URL: &str = "https://api.minecraftservices.com/authentication/login_with_xbox";
const MC_PROFILE_URL: &str = "https://api.minecraftservices.com/minecraft/profile";

/// Minecraft services tokens live for a day.
const TOKEN_LIFETIME_SECS: i64 = 86_400;

pub struct MicrosoftAuthenticator {
    client: reqwest::Client,
    client_id: String,
}

#[derive(Deserialize)]
struct LiveToken {
    access_token: String,
    refresh_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XboxToken {
    token: String,
    display_claims: DisplayClaims,
}

#[derive(Deserialize)]
struct DisplayClaims {
    xui: Vec<UserHash>,
}

#[derive(Deserialize)]
struct UserHash {
    uhs: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XstsError {
    #[serde(default)]
    x_err: Option<u64>,
}

#[derive(Deserialize)]
struct MinecraftToken {
    access_token: String,
}

#[derive(Deserialize)]
struct MinecraftProfile {
    id: String,
    name: String,
}

impl MicrosoftAuthenticator {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            client_id: MS_CLIENT_ID.to_string(),
        }
    }

    /// Page the user signs in on. The code it redirects with goes into
    /// `Credentials::AuthCode`.
    pub fn login_url(&self) -> String {
        reqwest::Url::parse_with_params(
            MS_AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", MS_REDIRECT_URI),
                ("scope", MS_SCOPE),
                ("prompt", "select_account"),
            ],
        )
        .map(|url| url.to_string())
        .unwrap_or_else(|_| MS_AUTH_URL.to_string())
    }

    async fn live_token(&self, grant: &[(&str, &str)]) -> LauncherResult<LiveToken> {
        let mut form = vec![
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", MS_REDIRECT_URI),
            ("scope", MS_SCOPE),
        ];
        form.extend_from_slice(grant);

        let response = self.client.post(MS_TOKEN_URL).form(&form).send().await?;
        if response.status().is_client_error() {
            return Err(LauncherError::Auth(format!(
                "Microsoft rejected the sign-in (HTTP {})",
                response.status()
            )));
        }
        Ok(ensure_success(response)?.json().await?)
    }

    async fn xbox_live(&self, live_access_token: &str) -> LauncherResult<XboxToken> {
        let body = json!({
            "Properties": {
                "AuthMethod": "RPS",
                "SiteName": "user.auth.xboxlive.com",
                "RpsTicket": live_access_token,
            },
            "RelyingParty": "http://auth.xboxlive.com",
            "TokenType": "JWT"
        });
        let response = self
            .client
            .post(XBL_URL)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;
        Ok(ensure_success(response)?.json().await?)
    }

    async fn xsts(&self, xbl_token: &str) -> LauncherResult<XboxToken> {
        let body = json!({
            "Properties": {
                "SandboxId": "RETAIL",
                "UserTokens": [xbl_token]
            },
            "RelyingParty": "rp://api.minecraftservices.com/",
            "TokenType": "JWT"
        });
        let response = self
            .client
            .post(XSTS_URL)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let code = response.json::<XstsError>().await.ok().and_then(|e| e.x_err);
            return Err(LauncherError::Auth(xsts_message(code)));
        }
        Ok(ensure_success(response)?.json().await?)
    }

    async fn minecraft_token(&self, uhs: &str, xsts_token: &str) -> LauncherResult<String> {
        let body = json!({ "identityToken": format!("XBL3.0 x={uhs};{xsts_token}") });
        let response = self
            .client
            .post(MC_LOGIN_URL)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;
        let token: MinecraftToken = ensure_success(response)?.json().await?;
        Ok(token.access_token)
    }

    async fn profile(&self, mc_token: &str) -> LauncherResult<MinecraftProfile> {
        let response = self
            .client
            .get(MC_PROFILE_URL)
            .header(AUTHORIZATION, format!("Bearer {mc_token}"))
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(LauncherError::Auth(
                "this Microsoft account does not own Minecraft".into(),
            ));
        }
        Ok(ensure_success(response)?.json().await?)
    }

    /// Everything after the Live token.
    async fn complete(&self, live: LiveToken) -> LauncherResult<Account> {
        let xbl = self.xbox_live(&live.access_token).await?;
        let uhs = xbl
            .display_claims
            .xui
            .first()
            .map(|x| x.uhs.clone())
            .ok_or_else(|| LauncherError::Auth("Xbox Live returned no user hash".into()))?;
        debug!("Xbox Live token acquired");

        let xsts = self.xsts(&xbl.token).await?;
        let mc_token = self.minecraft_token(&uhs, &xsts.token).await?;
        let profile = self.profile(&mc_token).await?;

        info!("Microsoft login successful: {}", profile.name);
        Ok(Account::Microsoft {
            username: profile.name,
            uuid: hyphenate(&profile.id),
            access_token: mc_token,
            refresh_token: live.refresh_token,
            expires_at: Utc::now() + Duration::seconds(TOKEN_LIFETIME_SECS),
        })
    }
}

/// XSTS rejections that have a known cause.
fn xsts_message(code: Option<u64>) -> String {
    match code {
        Some(2148916233) => "This Microsoft account has no Xbox profile; sign up at xbox.com first".into(),
        Some(2148916235) => "Xbox Live is not available in your country".into(),
        Some(2148916236) | Some(2148916237) => "This account needs adult verification on xbox.com".into(),
        Some(2148916238) => "Child accounts must be added to a Family by an adult".into(),
        Some(other) => format!("Xbox Live refused the sign-in (XErr {other})"),
        None => "Xbox Live refused the sign-in".into(),
    }
}

/// Profile ids come without dashes.
fn hyphenate(id: &str) -> String {
    if id.len() != 32 || id.contains('-') {
        return id.to_string();
    }
    format!(
        "{}-{}-{}-{}-{}",
        &id[..8],
        &id[8..12],
        &id[12..16],
        &id[16..20],
        &id[20..]
    )
}

#[async_trait]
impl Authenticator for MicrosoftAuthenticator {
    fn kind(&self) -> AccountKind {
        AccountKind::Microsoft
    }

    async fn authenticate(&self, credentials: Credentials) -> LauncherResult<Account> {
        let Credentials::AuthCode { code } = credentials else {
            return Err(LauncherError::Auth(
                "Microsoft sign-in needs the code from the login page".into(),
            ));
        };
        info!("Exchanging Microsoft auth code...");
        let live = self
            .live_token(&[("grant_type", "authorization_code"), ("code", code.trim())])
            .await?;
        self.complete(live).await
    }

    async fn refresh(&self, account: &Account) -> LauncherResult<Account> {
        let Account::Microsoft { refresh_token, .. } = account else {
            return Err(LauncherError::Auth(format!(
                "{} account passed to Microsoft",
                account.kind()
            )));
        };
        if refresh_token.is_empty() {
            return Err(LauncherError::Auth("sign in with Microsoft again".into()));
        }

        let live = self
            .live_token(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token.as_str())])
            .await?;
        let refreshed = self.complete(live).await?;
        info!("Microsoft token refreshed");
        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_url_carries_client_and_redirect() {
        let url = MicrosoftAuthenticator::new(reqwest::Client::new()).login_url();
        assert!(url.starts_with(MS_AUTH_URL));
        assert!(url.contains("client_id=00000000402b5328"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Flogin.live.com%2Foauth20_desktop.srf"));
    }

    #[test]
    fn parses_xbox_token() {
        let token: XboxToken = serde_json::from_value(serde_json::json!({
            "IssueInstant": "2024-01-01T00:00:00Z",
            "Token": "xbl",
            "DisplayClaims": {"xui": [{"uhs": "1234"}]}
        }))
        .unwrap();
        assert_eq!(token.token, "xbl");
        assert_eq!(token.display_claims.xui[0].uhs, "1234");
    }

    #[test]
    fn known_xsts_errors_are_explained() {
        assert!(xsts_message(Some(2148916238)).contains("Family"));
        assert!(xsts_message(Some(1)).contains("XErr 1"));
    }

    #[test]
    fn profile_ids_are_hyphenated() {
        assert_eq!(
            hyphenate("069a79f444e94726a5befca90e38aaf5"),
            "069a79f4-44e9-4726-a5be-fca90e38aaf5"
        );
        assert_eq!(hyphenate("short"), "short");
    }
}
