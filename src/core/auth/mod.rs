// ─── Accounts ───
//   account   Account union, SessionToken, Authenticator trait
//   offline   local accounts with name-derived UUIDs
//   elyby     Ely.by authserver
//   injector  authlib-injector agent for Ely.by launches
//   microsoft Microsoft / Xbox Live sign-in chain
//   store     accounts.json persistence and session hand-out

pub mod account;
pub mod elyby;
pub mod injector;
pub mod microsoft;
pub mod offline;
pub mod store;

pub use account::{Account, AccountKind, Authenticator, AuthenticatorSet, Credentials, SessionToken};
pub use elyby::ElyByAuthenticator;
pub use injector::AuthlibInjector;
pub use microsoft::MicrosoftAuthenticator;
pub use offline::{offline_uuid, OfflineAuthenticator};
pub use store::AccountStore;
