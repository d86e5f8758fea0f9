// ─── CraftLauncher Core ───
// Headless launcher backend: profiles, mods, accounts, launch.
//
// Architecture:
//   core/
//     config/     Launcher settings + atomic persistence
//     profile/    Profile model + registry with isolated directories
//     manifest/   Shareable profile codes
//     mods/       Catalogs (Modrinth, CurseForge) + mod set reconciliation
//     auth/       Offline, Microsoft and Ely.by accounts
//     version/    Mojang manifest, version JSON, resolution, loader lists
//     downloader/ Concurrent downloads with SHA-1 validation
//     assets/     Asset index + object downloads
//     java/       Multi-platform Java detection
//     launch/     Launch descriptor, process start, orchestrator
//     state/      Process-wide application state

pub mod assets;
pub mod auth;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod java;
pub mod launch;
pub mod manifest;
pub mod mods;
pub mod paths;
pub mod persist;
pub mod profile;
pub mod state;
pub mod version;
