use async_trait::async_trait;
use md5::{Digest, Md5};

use super::account::{Account, AccountKind, Authenticator, Credentials};
use crate::core::error::{LauncherError, LauncherResult};

/// Local accounts: no server, the UUID is derived from the name.
pub struct OfflineAuthenticator;

/// MD5 of `OfflinePlayer:<name>` laid out as a UUID with version nibble 3.
pub fn offline_uuid(username: &str) -> String {
    let digest = hex::encode(Md5::digest(format!("OfflinePlayer:{username}").as_bytes()));
    format!(
        "{}-{}-3{}-{}-{}",
        &digest[..8],
        &digest[8..12],
        &digest[13..16],
        &digest[16..20],
        &digest[20..32]
    )
}

pub fn validate_username(username: &str) -> LauncherResult<&str> {
    let username = username.trim();
    if username.is_empty() || username.chars().count() > 16 {
        return Err(LauncherError::Validation(
            "username must be 1 to 16 characters".into(),
        ));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(LauncherError::Validation(format!(
            "username '{username}' may only contain letters, digits and '_'"
        )));
    }
    Ok(username)
}

#[async_trait]
impl Authenticator for OfflineAuthenticator {
    fn kind(&self) -> AccountKind {
        AccountKind::Local
    }

    async fn authenticate(&self, credentials: Credentials) -> LauncherResult<Account> {
        let Credentials::Offline { username } = credentials else {
            return Err(LauncherError::Auth("local accounts only need a name".into()));
        };
        let username = validate_username(&username)?;
        Ok(Account::Local {
            username: username.to_string(),
            uuid: offline_uuid(username),
        })
    }

    async fn refresh(&self, account: &Account) -> LauncherResult<Account> {
        Ok(account.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_uuid_is_stable_and_versioned() {
        let uuid = offline_uuid("Player");
        assert_eq!(uuid, offline_uuid("Player"));
        assert_ne!(uuid, offline_uuid("player"));
        assert_eq!(uuid.len(), 36);
        assert_eq!(uuid.as_bytes()[14], b'3');

        let digest = hex::encode(Md5::digest(b"OfflinePlayer:Player"));
        assert!(uuid.starts_with(&digest[..8]));
        assert!(uuid.ends_with(&digest[20..32]));
    }

    #[tokio::test]
    async fn rejects_bad_names() {
        let auth = OfflineAuthenticator;
        for bad in ["", "   ", "has space", "waytoolongforminecraft"] {
            let err = auth
                .authenticate(Credentials::Offline {
                    username: bad.into(),
                })
                .await
                .unwrap_err();
            assert!(matches!(err, LauncherError::Validation(_)), "{bad}");
        }

        let account = auth
            .authenticate(Credentials::Offline {
                username: " Steve ".into(),
            })
            .await
            .unwrap();
        assert_eq!(account.username(), "Steve");
    }
}
