use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use craftlauncher_lib::commands::{self, AddModPayload, CreateProfilePayload, LoginPayload, SearchModsPayload};
use craftlauncher_lib::core::error::LauncherError;
use craftlauncher_lib::core::paths::LauncherPaths;
use craftlauncher_lib::core::profile::ProfileUpdate;
use craftlauncher_lib::core::state::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Launcher configuration directory (config.json, profiles.json, logs)
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Game root holding versions, libraries, assets and profiles
    #[arg(long, value_name = "DIR")]
    game_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List Minecraft versions (honours the snapshot / old version settings)
    Versions,
    /// List loader versions for a game version
    LoaderVersions { loader: String, game_version: String },
    /// List detected Java installations
    Java,
    #[command(subcommand)]
    Profile(ProfileCommand),
    #[command(subcommand)]
    Mod(ModCommand),
    #[command(subcommand)]
    Account(AccountCommand),
    /// Show settings, or change one with `--set key=value`
    Settings {
        #[arg(long, value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
    /// Launch a profile with the active account
    Launch { profile_id: String },
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    List,
    Show { id: String },
    Create {
        name: String,
        game_version: String,
        #[arg(long, default_value = "none")]
        loader: String,
        #[arg(long)]
        loader_version: Option<String>,
        /// OptiFine edition (e.g. HD_U_I6) installed as a mod for forge+optifine
        #[arg(long)]
        optifine: Option<String>,
    },
    Rename { id: String, name: String },
    Delete { id: String },
    /// Print the shareable manifest code
    Export { id: String },
    /// Create a profile from a manifest code
    Import {
        code: String,
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ModCommand {
    Search {
        query: String,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        profile: Option<String>,
    },
    Versions {
        profile_id: String,
        source: String,
        catalog_id: String,
    },
    Add {
        profile_id: String,
        source: String,
        catalog_id: String,
        #[arg(long)]
        pin: Option<String>,
    },
    Enable { profile_id: String, catalog_id: String },
    Disable { profile_id: String, catalog_id: String },
    Remove { profile_id: String, catalog_id: String },
    /// Install, remove and rename files until the folder matches the mod set
    Sync { profile_id: String },
    /// List jars in the profile's mods folder
    Installed { profile_id: String },
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    List,
    /// Add a local account
    Offline { username: String },
    /// Print the Microsoft sign-in page URL
    MicrosoftUrl,
    /// Finish Microsoft sign-in with the code from the redirect
    Microsoft { code: String },
    Elyby { username: String, password: String },
    Use { uuid: String },
    Remove { uuid: String },
    Logout,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut paths = LauncherPaths::platform_default();
    if let Some(dir) = &cli.config_dir {
        paths = LauncherPaths::new(dir, paths.game_dir());
    }
    if let Some(dir) = &cli.game_dir {
        paths = paths.with_game_dir(dir);
    }
    let _log_guard = craftlauncher_lib::init_tracing(&paths.logs_dir());
    info!("CraftLauncher {} starting", env!("CARGO_PKG_VERSION"));

    // The command line wins over a configured game directory.
    let state = match cli.game_dir {
        Some(_) => AppState::init_pinned(paths).await,
        None => AppState::init(paths).await,
    };
    let state = match state {
        Ok(state) => state,
        Err(e) => return fail(e),
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, cancelling");
                cancel.cancel();
            }
        });
    }

    let result = run(&state, cli.command, &cancel).await;
    if let Err(e) = state.shutdown().await {
        error!("Failed to flush state: {}", e);
    }
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}

async fn run(state: &AppState, command: Command, cancel: &CancellationToken) -> Result<(), LauncherError> {
    match command {
        Command::Versions => print(&commands::get_minecraft_versions(state).await?),
        Command::LoaderVersions {
            loader,
            game_version,
        } => print(&commands::get_loader_versions(state, loader.parse()?, &game_version).await?),
        Command::Java => print(&commands::get_java_installations().await?),
        Command::Profile(cmd) => run_profile(state, cmd).await,
        Command::Mod(cmd) => run_mod(state, cmd, cancel).await,
        Command::Account(cmd) => run_account(state, cmd).await,
        Command::Settings { set } => {
            if set.is_empty() {
                return print(&commands::get_settings(state).await?);
            }
            let mut record = serde_json::to_value(commands::get_settings(state).await?)?;
            for pair in set {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    LauncherError::Validation(format!("expected KEY=VALUE, got '{pair}'"))
                })?;
                // Bare words are strings; numbers, booleans and null parse as JSON.
                let value = serde_json::from_str(value)
                    .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
                record[key] = value;
            }
            print(&commands::update_settings(state, serde_json::from_value(record)?).await?)
        }
        Command::Launch { profile_id } => {
            let outcome = commands::launch_profile(state, &profile_id, cancel).await?;
            print(&outcome)?;
            if !state.config.get().await.close_on_launch {
                info!("Game running; press Ctrl+C to detach");
                cancel.cancelled().await;
            }
            Ok(())
        }
    }
}

async fn run_profile(state: &AppState, cmd: ProfileCommand) -> Result<(), LauncherError> {
    match cmd {
        ProfileCommand::List => print(&commands::list_profiles(state).await?),
        ProfileCommand::Show { id } => print(&commands::get_profile(state, &id).await?),
        ProfileCommand::Create {
            name,
            game_version,
            loader,
            loader_version,
            optifine,
        } => {
            let payload = CreateProfilePayload {
                name,
                game_version,
                loader: loader.parse()?,
                loader_version,
                icon: None,
                optifine_version: optifine,
            };
            print(&commands::create_profile(state, payload).await?)
        }
        ProfileCommand::Rename { id, name } => {
            let changes = ProfileUpdate {
                name: Some(name),
                ..Default::default()
            };
            print(&commands::update_profile(state, &id, changes).await?)
        }
        ProfileCommand::Delete { id } => commands::delete_profile(state, &id).await,
        ProfileCommand::Export { id } => {
            println!("{}", commands::export_profile(state, &id).await?);
            Ok(())
        }
        ProfileCommand::Import { code, name } => {
            print(&commands::import_profile(state, &code, name.as_deref()).await?)
        }
    }
}

async fn run_mod(state: &AppState, cmd: ModCommand, cancel: &CancellationToken) -> Result<(), LauncherError> {
    match cmd {
        ModCommand::Search {
            query,
            source,
            profile,
        } => {
            let payload = SearchModsPayload {
                query,
                source: source.map(|s| s.parse()).transpose()?,
                profile_id: profile,
                limit: None,
                offset: None,
            };
            print(&commands::search_mods(state, payload).await?)
        }
        ModCommand::Versions {
            profile_id,
            source,
            catalog_id,
        } => print(&commands::get_mod_versions(state, &profile_id, source.parse()?, &catalog_id).await?),
        ModCommand::Add {
            profile_id,
            source,
            catalog_id,
            pin,
        } => {
            let payload = AddModPayload {
                profile_id,
                catalog_id,
                source: source.parse()?,
                version_pin: pin,
            };
            print(&commands::add_mod(state, payload, cancel).await?)
        }
        ModCommand::Enable {
            profile_id,
            catalog_id,
        } => print(&commands::toggle_mod(state, &profile_id, &catalog_id, true).await?),
        ModCommand::Disable {
            profile_id,
            catalog_id,
        } => print(&commands::toggle_mod(state, &profile_id, &catalog_id, false).await?),
        ModCommand::Remove {
            profile_id,
            catalog_id,
        } => print(&commands::remove_mod(state, &profile_id, &catalog_id, cancel).await?),
        ModCommand::Sync { profile_id } => {
            print(&commands::reconcile_mods(state, &profile_id, cancel).await?)
        }
        ModCommand::Installed { profile_id } => {
            print(&commands::list_installed_mods(state, &profile_id).await?)
        }
    }
}

async fn run_account(state: &AppState, cmd: AccountCommand) -> Result<(), LauncherError> {
    match cmd {
        AccountCommand::List => print(&commands::list_accounts(state).await?),
        AccountCommand::Offline { username } => {
            print(&commands::login(state, LoginPayload::Local { username }).await?)
        }
        AccountCommand::MicrosoftUrl => {
            println!("{}", commands::microsoft_login_url(state));
            Ok(())
        }
        AccountCommand::Microsoft { code } => {
            print(&commands::login(state, LoginPayload::Microsoft { code }).await?)
        }
        AccountCommand::Elyby { username, password } => {
            print(&commands::login(state, LoginPayload::ElyBy { username, password }).await?)
        }
        AccountCommand::Use { uuid } => commands::set_active_account(state, &uuid).await,
        AccountCommand::Remove { uuid } => commands::remove_account(state, &uuid).await,
        AccountCommand::Logout => commands::logout(state).await,
    }
}

fn print<T: Serialize>(value: &T) -> Result<(), LauncherError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn fail(e: LauncherError) -> ExitCode {
    error!("{}", e);
    match serde_json::to_string(&e) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!("{e}"),
    }
    ExitCode::FAILURE
}
