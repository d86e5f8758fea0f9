pub mod settings;
pub mod store;

pub use settings::{Language, LauncherSettings, Theme};
pub use store::ConfigStore;
