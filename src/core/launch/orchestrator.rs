// ─── Launch Orchestrator ───
// Resolving -> Reconciling -> Ready -> Launched, or Failed at any step.
// One launch per profile at a time; transitions go out on a broadcast channel.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::descriptor::{build_descriptor, LaunchDescriptor};
use super::process::{ProcessHandle, ProcessStarter};
use crate::core::auth::injector::injector_jvm_args;
use crate::core::auth::{AuthlibInjector, SessionToken};
use crate::core::config::ConfigStore;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::java::find_java;
use crate::core::mods::{ModSetManager, ReconcileReport};
use crate::core::profile::{Profile, ProfileRegistry};
use crate::core::version::{ResolvedVersion, VersionResolver};

const EVENT_CAPACITY: usize = 64;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LaunchState {
    Resolving,
    Reconciling,
    Ready,
    Launched,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaunchEvent {
    pub profile_id: String,
    pub state: LaunchState,
    pub message: Option<String>,
}

/// Result of one launch attempt. `error` is set exactly when `state` is
/// `Failed`.
#[derive(Debug, Serialize)]
pub struct LaunchOutcome {
    pub profile_id: String,
    pub state: LaunchState,
    pub version: Option<ResolvedVersion>,
    pub report: Option<ReconcileReport>,
    pub descriptor: Option<LaunchDescriptor>,
    pub process: Option<ProcessHandle>,
    pub warnings: Vec<String>,
    pub error: Option<LauncherError>,
}

impl LaunchOutcome {
    fn new(profile_id: &str) -> Self {
        Self {
            profile_id: profile_id.to_string(),
            state: LaunchState::Resolving,
            version: None,
            report: None,
            descriptor: None,
            process: None,
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn is_launched(&self) -> bool {
        self.state == LaunchState::Launched
    }

    /// `Ok` with the outcome when the game started, the captured error otherwise.
    pub fn into_result(mut self) -> LauncherResult<Self> {
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

pub struct Orchestrator {
    registry: Arc<ProfileRegistry>,
    config: Arc<ConfigStore>,
    mods: Arc<ModSetManager>,
    resolver: Arc<dyn VersionResolver>,
    starter: Arc<dyn ProcessStarter>,
    injector: Option<Arc<AuthlibInjector>>,
    in_flight: Mutex<HashSet<String>>,
    events: broadcast::Sender<LaunchEvent>,
    retry_base: Duration,
}

/// Keeps a profile busy until dropped. Launches and mod set changes of the
/// same profile exclude each other through it.
pub struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    profile_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.profile_id);
        }
    }
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ProfileRegistry>,
        config: Arc<ConfigStore>,
        mods: Arc<ModSetManager>,
        resolver: Arc<dyn VersionResolver>,
        starter: Arc<dyn ProcessStarter>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry,
            config,
            mods,
            resolver,
            starter,
            injector: None,
            in_flight: Mutex::new(HashSet::new()),
            events,
            retry_base: RETRY_BASE_DELAY,
        }
    }

    /// First delay of the resolve backoff; doubles on every retry.
    pub fn with_retry_base(mut self, delay: Duration) -> Self {
        self.retry_base = delay;
        self
    }

    /// Source of the agent jar for sessions that name an auth server.
    pub fn with_injector(mut self, injector: Arc<AuthlibInjector>) -> Self {
        self.injector = Some(injector);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LaunchEvent> {
        self.events.subscribe()
    }

    /// True while a launch or a mod set change holds the profile.
    pub fn is_launching(&self, profile_id: &str) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(profile_id))
            .unwrap_or(false)
    }

    /// Runs a full launch for `profile_id` as `session`.
    ///
    /// A second request for a profile that is still launching fails with
    /// `AlreadyRunning` without touching the first one.
    pub async fn launch(
        &self,
        profile_id: &str,
        session: &SessionToken,
        cancel: &CancellationToken,
    ) -> LaunchOutcome {
        let mut outcome = LaunchOutcome::new(profile_id);

        let _guard = match self.reserve(profile_id) {
            Ok(guard) => guard,
            Err(e) => {
                warn!("Launch of {} rejected: {}", profile_id, e);
                outcome.state = LaunchState::Failed;
                outcome.error = Some(e);
                return outcome;
            }
        };

        if let Err(e) = self.run(&mut outcome, session, cancel).await {
            warn!("Launch of {} failed: {}", profile_id, e);
            outcome.state = LaunchState::Failed;
            self.publish(profile_id, LaunchState::Failed, Some(e.to_string()));
            outcome.error = Some(e);
        }
        outcome
    }

    /// Marks `profile_id` busy; `AlreadyRunning` if something else holds it.
    pub fn reserve(&self, profile_id: &str) -> LauncherResult<InFlight<'_>> {
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| LauncherError::Other("launch registry poisoned".into()))?;
        if !set.insert(profile_id.to_string()) {
            return Err(LauncherError::AlreadyRunning(profile_id.to_string()));
        }
        Ok(InFlight {
            set: &self.in_flight,
            profile_id: profile_id.to_string(),
        })
    }

    async fn run(
        &self,
        outcome: &mut LaunchOutcome,
        session: &SessionToken,
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        let profile_id = outcome.profile_id.clone();
        let profile = self.registry.get(&profile_id).await?;
        let settings = self.config.get().await;

        // ── Resolving ──
        self.enter(outcome, LaunchState::Resolving, None);
        let version_id = profile.version_id();
        let version = self
            .resolve_with_retry(&version_id, settings.network_retries, cancel)
            .await?;

        // ── Reconciling ──
        self.enter(outcome, LaunchState::Reconciling, None);
        let profile = self.reconcile(outcome, profile, cancel).await?;
        ensure_not_cancelled(cancel)?;

        // ── Ready ──
        if !version.client_jar.is_file() {
            return Err(LauncherError::Io {
                path: version.client_jar.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "client jar is missing"),
            });
        }
        let java = find_java(settings.java_path.as_deref(), version.java_major).await?;
        let mut descriptor = build_descriptor(&java, &settings, &profile, &version, session)?;
        if let Some(server) = &session.auth_server {
            match self.agent_args(server, cancel).await {
                Ok(flags) => descriptor.prepend_jvm_args(flags),
                Err(LauncherError::Cancelled) => return Err(LauncherError::Cancelled),
                Err(e) => {
                    warn!("Launching without authlib-injector: {}", e);
                    outcome
                        .warnings
                        .push(format!("authlib-injector unavailable, skins may not load: {e}"));
                }
            }
        }
        info!("Launch command: {}", descriptor.command_line());
        self.enter(outcome, LaunchState::Ready, None);

        // ── Launched ──
        ensure_not_cancelled(cancel)?;
        let handle = self
            .starter
            .start(
                &descriptor.executable,
                &descriptor.args,
                &descriptor.working_dir,
                settings.show_game_console,
            )
            .await?;
        if let Err(e) = self.registry.mark_played(&profile_id).await {
            outcome.warnings.push(format!("could not record play time: {e}"));
        }
        if let Err(e) = self
            .config
            .update(|s| s.last_profile = Some(profile_id.clone()))
            .await
        {
            warn!("Could not remember last profile: {}", e);
        }

        outcome.version = Some(version);
        outcome.descriptor = Some(descriptor);
        outcome.process = Some(handle);
        self.enter(outcome, LaunchState::Launched, None);
        info!("Launched {} ({})", profile.name, version_id);
        Ok(())
    }

    /// Resolves `version_id`, retrying retryable failures with exponential
    /// backoff up to `retries` extra attempts.
    async fn resolve_with_retry(
        &self,
        version_id: &str,
        retries: u32,
        cancel: &CancellationToken,
    ) -> LauncherResult<ResolvedVersion> {
        let mut attempt = 0u32;
        loop {
            match self.resolver.resolve(version_id, cancel).await {
                Ok(version) => return Ok(version),
                Err(e) if e.is_retryable() && attempt < retries => {
                    let delay = self.retry_base * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(
                        "Resolving {} failed ({}), retry {}/{} in {:?}",
                        version_id, e, attempt, retries, delay
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(LauncherError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Installs the recorded mod set and stores what ended up on disk.
    /// Per-mod failures become warnings.
    async fn reconcile(
        &self,
        outcome: &mut LaunchOutcome,
        profile: Profile,
        cancel: &CancellationToken,
    ) -> LauncherResult<Profile> {
        let result = self.mods.reconcile(&profile, &profile.mod_set, cancel).await?;
        for failure in &result.report.failed {
            outcome.warnings.push(format!(
                "{} ({}): {}",
                failure.catalog_id, failure.source, failure.reason
            ));
        }
        if !result.report.failed.is_empty() {
            let message = format!("{} mods failed to install", result.report.failed.len());
            self.publish(&profile.id, LaunchState::Reconciling, Some(message));
        }
        outcome.report = Some(result.report);

        if result.mod_set == profile.mod_set {
            return Ok(profile);
        }
        self.registry.set_mod_set(&profile.id, result.mod_set).await
    }

    async fn agent_args(
        &self,
        server: &str,
        cancel: &CancellationToken,
    ) -> LauncherResult<Vec<String>> {
        let Some(injector) = &self.injector else {
            return Err(LauncherError::Other("no authlib-injector source configured".into()));
        };
        let jar = injector.ensure(cancel).await?;
        Ok(injector_jvm_args(&jar, server))
    }

    fn enter(&self, outcome: &mut LaunchOutcome, state: LaunchState, message: Option<String>) {
        outcome.state = state;
        self.publish(&outcome.profile_id, state, message);
    }

    fn publish(&self, profile_id: &str, state: LaunchState, message: Option<String>) {
        // No subscribers is fine.
        let _ = self.events.send(LaunchEvent {
            profile_id: profile_id.to_string(),
            state,
            message,
        });
    }
}

/// Reconcile reports cancellation per mod; the launch itself has to stop too.
fn ensure_not_cancelled(cancel: &CancellationToken) -> LauncherResult<()> {
    if cancel.is_cancelled() {
        return Err(LauncherError::Cancelled);
    }
    Ok(())
}
