// ─── Mods ───
//   model      ModEntry, ModSource, reconcile report
//   catalog    ModCatalog trait + multi-source dispatch
//   modrinth   Modrinth v2 REST catalog
//   curseforge CurseForge v1 REST catalog
//   reconcile  per-profile mod set reconciliation

pub mod catalog;
pub mod curseforge;
pub mod model;
pub mod modrinth;
pub mod reconcile;

pub use catalog::{
    CatalogHit, CatalogSet, CatalogVersion, FetchedMod, ModCatalog, ModDependency, ModPayload,
    SearchQuery,
};
pub use curseforge::CurseForgeCatalog;
pub use model::{InstalledMod, ModEntry, ModFailure, ModSource, ReconcileReport};
pub use modrinth::ModrinthCatalog;
pub use reconcile::{ModSetManager, ReconcileOutcome};
