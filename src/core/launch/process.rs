// ─── Process Start ───
// Spawns the JVM and forwards its output into the launcher log, and onto the
// launcher's stdout when the game console is switched on.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

use crate::core::error::{LauncherError, LauncherResult};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: Option<u32>,
}

#[async_trait]
pub trait ProcessStarter: Send + Sync {
    /// `console` mirrors the `show_game_console` setting: the game's output is
    /// shown to the user instead of only being logged.
    async fn start(
        &self,
        executable: &Path,
        args: &[String],
        cwd: &Path,
        console: bool,
    ) -> LauncherResult<ProcessHandle>;
}

/// Starts real processes. The child is detached from the launch: a task
/// drains its output and logs the exit status.
pub struct SystemProcessStarter {
    /// Extra library search path, e.g. extracted natives.
    native_path: Option<PathBuf>,
}

impl SystemProcessStarter {
    pub fn new() -> Self {
        Self { native_path: None }
    }

    pub fn with_native_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.native_path = Some(dir.into());
        self
    }
}

impl Default for SystemProcessStarter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessStarter for SystemProcessStarter {
    async fn start(
        &self,
        executable: &Path,
        args: &[String],
        cwd: &Path,
        console: bool,
    ) -> LauncherResult<ProcessHandle> {
        let mut cmd = Command::new(executable);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.native_path {
            let var = native_path_var();
            cmd.env(var, append_env_path(var, &dir.to_string_lossy()));
        }
        configure_platform_spawn(&mut cmd, console);

        let mut child = cmd
            .spawn()
            .map_err(|e| LauncherError::JavaExecution(format!("{}: {}", executable.display(), e)))?;
        let pid = child.id();
        info!("Game process started (pid {:?})", pid);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, "stdout", console.then(tokio::io::stdout)));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, "stderr", console.then(tokio::io::stderr)));
        }
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => info!("Game exited normally"),
                Ok(status) => warn!("Game exited with {}", status),
                Err(e) => warn!("Lost track of the game process: {}", e),
            }
        });

        Ok(ProcessHandle { pid })
    }
}

/// Logs every line of `stream`; with an `echo` writer the lines are copied
/// there too. Returns the writer once the stream ends.
async fn forward_lines<R, W>(stream: R, name: &'static str, mut echo: Option<W>) -> Option<W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                info!(target: "game", stream = name, "{}", line);
                if let Some(out) = echo.as_mut() {
                    let written = out.write_all(format!("{line}\n").as_bytes()).await;
                    if let Err(e) = written.and(out.flush().await) {
                        warn!("Game console {} closed: {}", name, e);
                        echo = None;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Game {} closed: {}", name, e);
                break;
            }
        }
    }
    echo
}

fn native_path_var() -> &'static str {
    if cfg!(target_os = "windows") {
        "PATH"
    } else if cfg!(target_os = "macos") {
        "DYLD_LIBRARY_PATH"
    } else {
        "LD_LIBRARY_PATH"
    }
}

fn append_env_path(var_name: &str, value: &str) -> String {
    let separator = if cfg!(target_os = "windows") { ";" } else { ":" };
    match std::env::var(var_name) {
        Ok(existing) if !existing.trim().is_empty() => format!("{value}{separator}{existing}"),
        _ => value.to_string(),
    }
}

/// On Windows the game gets its own console window only when asked for;
/// otherwise it runs windowless.
fn configure_platform_spawn(cmd: &mut Command, console: bool) {
    #[cfg(target_os = "windows")]
    {
        const CREATE_NEW_CONSOLE: u32 = 0x00000010;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        if console {
            cmd.creation_flags(CREATE_NEW_CONSOLE);
            cmd.env_remove("WT_SESSION");
            cmd.env_remove("TERM");
        } else {
            cmd.creation_flags(CREATE_NO_WINDOW);
        }
    }
    #[cfg(not(target_os = "windows"))]
    let _ = (cmd, console);
}
