// ─── Account store ───
// `accounts.json` holds every signed-in account plus the active one.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::account::{Account, AccountKind, AuthenticatorSet, SessionToken};
use super::offline::offline_uuid;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::persist::{read_json, write_json, write_safe};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<Account>,
    /// UUID of the active account.
    #[serde(default)]
    active: Option<String>,
}

pub struct AccountStore {
    path: PathBuf,
    client_token: String,
    state: RwLock<AccountsFile>,
}

impl AccountStore {
    /// Loads `accounts.json` and the launcher's client token, creating the
    /// token on first run. A corrupt accounts file starts empty.
    pub async fn load(path: impl Into<PathBuf>, client_token_path: &Path) -> LauncherResult<Self> {
        let path = path.into();
        let state = match read_json::<AccountsFile>(&path).await {
            Ok(Some(state)) => {
                info!("Loaded {} accounts", state.accounts.len());
                state
            }
            Ok(None) => AccountsFile::default(),
            Err(e) => {
                warn!("Failed to load accounts from {:?}: {}", path, e);
                AccountsFile::default()
            }
        };

        Ok(Self {
            path,
            client_token: load_client_token(client_token_path).await?,
            state: RwLock::new(state),
        })
    }

    pub fn client_token(&self) -> &str {
        &self.client_token
    }

    pub async fn list(&self) -> Vec<Account> {
        self.state.read().await.accounts.clone()
    }

    pub async fn active(&self) -> Option<Account> {
        let state = self.state.read().await;
        let active = state.active.as_deref()?;
        state.accounts.iter().find(|a| a.uuid() == active).cloned()
    }

    /// Stores `account` and makes it active. An account of the same kind and
    /// UUID is replaced.
    pub async fn add(&self, account: Account) -> LauncherResult<Account> {
        self.commit(|state| {
            state
                .accounts
                .retain(|a| !(a.kind() == account.kind() && a.uuid() == account.uuid()));
            state.active = Some(account.uuid().to_string());
            state.accounts.push(account.clone());
            Ok(())
        })
        .await?;
        info!("Added {} account: {}", account.kind(), account.username());
        Ok(account)
    }

    pub async fn set_active(&self, uuid: &str) -> LauncherResult<()> {
        self.commit(|state| {
            if !state.accounts.iter().any(|a| a.uuid() == uuid) {
                return Err(LauncherError::AccountNotFound(uuid.to_string()));
            }
            state.active = Some(uuid.to_string());
            Ok(())
        })
        .await
    }

    /// Removes the account. If it was active, the first remaining one takes
    /// its place.
    pub async fn remove(&self, uuid: &str) -> LauncherResult<()> {
        self.commit(|state| {
            let before = state.accounts.len();
            state.accounts.retain(|a| a.uuid() != uuid);
            if state.accounts.len() == before {
                return Err(LauncherError::AccountNotFound(uuid.to_string()));
            }
            if state.active.as_deref() == Some(uuid) {
                state.active = state.accounts.first().map(|a| a.uuid().to_string());
            }
            Ok(())
        })
        .await?;
        info!("Removed account {}", uuid);
        Ok(())
    }

    /// Clears the active account but keeps it listed.
    pub async fn logout(&self) -> LauncherResult<()> {
        self.commit(|state| {
            state.active = None;
            Ok(())
        })
        .await
    }

    /// Session for the active account, refreshing expired tokens first.
    /// Without an active account the game runs offline as `fallback_username`.
    pub async fn session(
        &self,
        authenticators: &AuthenticatorSet,
        fallback_username: &str,
    ) -> LauncherResult<SessionToken> {
        let Some(account) = self.active().await else {
            return Account::Local {
                username: fallback_username.to_string(),
                uuid: offline_uuid(fallback_username),
            }
            .obtain_session();
        };

        if !account.is_expired(Utc::now()) {
            return account.obtain_session();
        }

        let refreshed = match authenticators.get(account.kind()) {
            Ok(auth) => auth.refresh(&account).await,
            Err(e) => Err(e),
        };
        match refreshed {
            Ok(fresh) => {
                self.replace(&account, fresh.clone()).await?;
                fresh.obtain_session()
            }
            // Ely.by tokens carry no expiry; the stored one usually still works.
            Err(e) if account.kind() == AccountKind::ElyBy => {
                warn!("Using stored Ely.by token after failed refresh: {}", e);
                account.obtain_session()
            }
            Err(e) => Err(e),
        }
    }

    async fn replace(&self, old: &Account, fresh: Account) -> LauncherResult<()> {
        self.commit(|state| {
            if let Some(slot) = state
                .accounts
                .iter_mut()
                .find(|a| a.kind() == old.kind() && a.uuid() == old.uuid())
            {
                *slot = fresh;
            }
            Ok(())
        })
        .await
    }

    /// Applies `change` to a copy, persists it, then swaps it in.
    async fn commit<F>(&self, change: F) -> LauncherResult<()>
    where
        F: FnOnce(&mut AccountsFile) -> LauncherResult<()>,
    {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        change(&mut next)?;
        write_json(&self.path, &next).await?;
        *state = next;
        Ok(())
    }
}

async fn load_client_token(path: &Path) -> LauncherResult<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(token) if !token.trim().is_empty() => return Ok(token.trim().to_string()),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(LauncherError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    let token = uuid::Uuid::new_v4().to_string();
    write_safe(path, token.as_bytes()).await?;
    Ok(token)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Duration;

    use super::*;
    use crate::core::auth::account::{Authenticator, Credentials};

    struct RefreshingMicrosoft;

    #[async_trait]
    impl Authenticator for RefreshingMicrosoft {
        fn kind(&self) -> AccountKind {
            AccountKind::Microsoft
        }

        async fn authenticate(&self, _credentials: Credentials) -> LauncherResult<Account> {
            Err(LauncherError::Auth("not used".into()))
        }

        async fn refresh(&self, account: &Account) -> LauncherResult<Account> {
            let mut fresh = account.clone();
            if let Account::Microsoft {
                access_token,
                expires_at,
                ..
            } = &mut fresh
            {
                *access_token = "fresh".into();
                *expires_at = Utc::now() + Duration::hours(24);
            }
            Ok(fresh)
        }
    }

    fn local(name: &str) -> Account {
        Account::Local {
            username: name.into(),
            uuid: offline_uuid(name),
        }
    }

    async fn store(dir: &Path) -> AccountStore {
        AccountStore::load(dir.join("accounts.json"), &dir.join("client_token"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn accounts_and_active_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path()).await;
        s.add(local("Alex")).await.unwrap();
        s.add(local("Steve")).await.unwrap();
        let token = s.client_token().to_string();

        let reloaded = store(dir.path()).await;
        assert_eq!(reloaded.list().await.len(), 2);
        assert_eq!(reloaded.active().await.unwrap().username(), "Steve");
        assert_eq!(reloaded.client_token(), token);
    }

    #[tokio::test]
    async fn removing_active_falls_back_to_first() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path()).await;
        s.add(local("Alex")).await.unwrap();
        let steve = s.add(local("Steve")).await.unwrap();

        s.remove(steve.uuid()).await.unwrap();
        assert_eq!(s.active().await.unwrap().username(), "Alex");
        assert!(matches!(
            s.remove("missing").await,
            Err(LauncherError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn no_active_account_plays_offline() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path()).await;
        let session = s.session(&AuthenticatorSet::new(), "Player").await.unwrap();
        assert_eq!(session.username, "Player");
        assert_eq!(session.user_type, "legacy");
        assert_eq!(session.uuid, offline_uuid("Player").replace('-', ""));
    }

    #[tokio::test]
    async fn expired_microsoft_token_is_refreshed_and_stored() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path()).await;
        s.add(Account::Microsoft {
            username: "Steve".into(),
            uuid: "069a79f4-44e9-4726-a5be-fca90e38aaf5".into(),
            access_token: "stale".into(),
            refresh_token: "r".into(),
            expires_at: Utc::now() - Duration::minutes(5),
        })
        .await
        .unwrap();

        let auths = AuthenticatorSet::new().with(Arc::new(RefreshingMicrosoft));
        let session = s.session(&auths, "Player").await.unwrap();
        assert_eq!(session.access_token, "fresh");

        let reloaded = store(dir.path()).await;
        assert!(!reloaded.active().await.unwrap().is_expired(Utc::now()));
    }

    #[tokio::test]
    async fn expired_microsoft_without_authenticator_fails() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path()).await;
        s.add(Account::Microsoft {
            username: "Steve".into(),
            uuid: "u".into(),
            access_token: "stale".into(),
            refresh_token: "r".into(),
            expires_at: Utc::now() - Duration::minutes(5),
        })
        .await
        .unwrap();

        let err = s.session(&AuthenticatorSet::new(), "Player").await.unwrap_err();
        assert!(matches!(err, LauncherError::Auth(_)));
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("accounts.json"), "{ nope").unwrap();
        assert!(store(dir.path()).await.list().await.is_empty());
    }
}
