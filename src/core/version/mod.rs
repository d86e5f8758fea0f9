pub mod install;
pub mod loaders;
pub mod manifest;
pub mod optifine;
pub mod resolver;
pub mod version_file;

pub use install::{GameDirInstaller, LoaderInstaller, LoaderTarget};
pub use loaders::list_loader_versions;
pub use manifest::{VersionEntry, VersionManifest};
pub use optifine::OptiFineSource;
pub use resolver::{MojangResolver, ResolvedVersion, VersionResolver};
pub use version_file::{AssetIndexInfo, LibraryEntry, VersionJson};
