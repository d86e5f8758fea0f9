use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::elyby::ELYBY_AUTHSERVER;
use crate::core::error::{LauncherError, LauncherResult};

/// Tokens are treated as expired this long before they actually are.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    #[serde(alias = "offline")]
    Local,
    Microsoft,
    #[serde(rename = "elyby")]
    ElyBy,
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountKind::Local => write!(f, "local"),
            AccountKind::Microsoft => write!(f, "microsoft"),
            AccountKind::ElyBy => write!(f, "elyby"),
        }
    }
}

/// A signed-in identity. Each variant carries what it needs to hand out a
/// session; refreshing is the authenticator's job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Account {
    #[serde(alias = "offline")]
    Local { username: String, uuid: String },
    Microsoft {
        username: String,
        uuid: String,
        access_token: String,
        refresh_token: String,
        expires_at: DateTime<Utc>,
    },
    #[serde(rename = "elyby")]
    ElyBy {
        username: String,
        uuid: String,
        access_token: String,
        client_token: String,
        /// Unknown for Ely.by; such tokens are refreshed before every launch.
        #[serde(default)]
        expires_at: Option<DateTime<Utc>>,
    },
}

/// What the game receives on its command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionToken {
    pub username: String,
    /// Without dashes.
    pub uuid: String,
    pub access_token: String,
    /// `msa`, `mojang` or `legacy`.
    pub user_type: String,
    /// Yggdrasil server the game must be pointed at through authlib-injector.
    pub auth_server: Option<String>,
}

impl Account {
    pub fn kind(&self) -> AccountKind {
        match self {
            Account::Local { .. } => AccountKind::Local,
            Account::Microsoft { .. } => AccountKind::Microsoft,
            Account::ElyBy { .. } => AccountKind::ElyBy,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Account::Local { username, .. }
            | Account::Microsoft { username, .. }
            | Account::ElyBy { username, .. } => username,
        }
    }

    pub fn uuid(&self) -> &str {
        match self {
            Account::Local { uuid, .. }
            | Account::Microsoft { uuid, .. }
            | Account::ElyBy { uuid, .. } => uuid,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let margin = Duration::seconds(EXPIRY_MARGIN_SECS);
        match self {
            Account::Local { .. } => false,
            Account::Microsoft { expires_at, .. } => now >= *expires_at - margin,
            Account::ElyBy { expires_at, .. } => expires_at.map_or(true, |at| now >= at - margin),
        }
    }

    /// The session for a launch. Fails when the stored token has expired.
    pub fn obtain_session(&self) -> LauncherResult<SessionToken> {
        let (access_token, user_type, auth_server) = match self {
            Account::Local { .. } => ("0".to_string(), "legacy", None),
            Account::Microsoft {
                access_token,
                expires_at,
                ..
            } => {
                if Utc::now() >= *expires_at {
                    return Err(LauncherError::Auth(format!(
                        "Microsoft session for {} has expired",
                        self.username()
                    )));
                }
                (access_token.clone(), "msa", None)
            }
            Account::ElyBy { access_token, .. } => (
                access_token.clone(),
                "mojang",
                Some(ELYBY_AUTHSERVER.to_string()),
            ),
        };

        Ok(SessionToken {
            username: self.username().to_string(),
            uuid: self.uuid().replace('-', ""),
            access_token,
            user_type: user_type.to_string(),
            auth_server,
        })
    }
}

/// Input to an authenticator.
#[derive(Debug, Clone)]
pub enum Credentials {
    Offline { username: String },
    Password { username: String, password: String },
    /// Authorization code from the Microsoft sign-in page.
    AuthCode { code: String },
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    fn kind(&self) -> AccountKind;

    /// Fails with `Auth` on rejected credentials.
    async fn authenticate(&self, credentials: Credentials) -> LauncherResult<Account>;

    /// A copy of `account` with fresh tokens.
    async fn refresh(&self, account: &Account) -> LauncherResult<Account>;
}

/// The configured authenticators, addressed by account kind.
#[derive(Clone, Default)]
pub struct AuthenticatorSet {
    by_kind: HashMap<AccountKind, Arc<dyn Authenticator>>,
}

impl AuthenticatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.by_kind.insert(authenticator.kind(), authenticator);
        self
    }

    pub fn get(&self, kind: AccountKind) -> LauncherResult<Arc<dyn Authenticator>> {
        self.by_kind
            .get(&kind)
            .cloned()
            .ok_or_else(|| LauncherError::Auth(format!("{kind} sign-in is not available")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn microsoft(expires_at: DateTime<Utc>) -> Account {
        Account::Microsoft {
            username: "Steve".into(),
            uuid: "069a79f4-44e9-4726-a5be-fca90e38aaf5".into(),
            access_token: "mc-token".into(),
            refresh_token: "refresh".into(),
            expires_at,
        }
    }

    #[test]
    fn sessions_carry_user_type_and_bare_uuid() {
        let session = microsoft(Utc::now() + Duration::hours(1)).obtain_session().unwrap();
        assert_eq!(session.user_type, "msa");
        assert_eq!(session.uuid, "069a79f444e94726a5befca90e38aaf5");
        assert_eq!(session.access_token, "mc-token");

        let local = Account::Local {
            username: "Player".into(),
            uuid: "a-b".into(),
        };
        assert_eq!(local.obtain_session().unwrap().user_type, "legacy");
    }

    #[test]
    fn only_elyby_sessions_name_an_auth_server() {
        let elyby = Account::ElyBy {
            username: "Erick".into(),
            uuid: "ffc8fdc9-5824-509e-8a57-c99b940fb996".into(),
            access_token: "jwt".into(),
            client_token: "ct".into(),
            expires_at: None,
        };
        let session = elyby.obtain_session().unwrap();
        assert_eq!(session.user_type, "mojang");
        assert_eq!(session.auth_server.as_deref(), Some(ELYBY_AUTHSERVER));

        let ms = microsoft(Utc::now() + Duration::hours(1)).obtain_session().unwrap();
        assert_eq!(ms.auth_server, None);
    }

    #[test]
    fn expiry_uses_a_safety_margin() {
        let now = Utc::now();
        assert!(microsoft(now + Duration::seconds(30)).is_expired(now));
        assert!(!microsoft(now + Duration::hours(1)).is_expired(now));
        assert!(microsoft(now - Duration::seconds(1)).obtain_session().is_err());
    }

    #[test]
    fn accounts_round_trip_with_a_type_tag() {
        let json = serde_json::to_value(microsoft(Utc::now())).unwrap();
        assert_eq!(json["type"], "microsoft");

        let legacy: Account =
            serde_json::from_str(r#"{"type":"offline","username":"Alex","uuid":"x"}"#).unwrap();
        assert_eq!(legacy.kind(), AccountKind::Local);
    }
}
