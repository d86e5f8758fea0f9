use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JavaInstallation {
    pub path: PathBuf,
    pub version: String,
    pub major: u32,
    pub is_64bit: bool,
    pub vendor: String,
}

/// Picks the Java binary for a launch.
///
/// A configured path is used as is. Otherwise the newest detected install on
/// the required track wins, then any newer one for modern game versions.
pub async fn find_java(configured: Option<&Path>, required_major: u32) -> LauncherResult<PathBuf> {
    if let Some(path) = configured {
        match inspect_java(path).await {
            Some(java) if java.major < required_major => warn!(
                "Configured Java {:?} is {}, this version wants {}",
                path, java.major, required_major
            ),
            Some(_) => {}
            None => warn!("Configured Java {:?} did not answer -version", path),
        }
        return Ok(path.to_path_buf());
    }

    let installations = detect_java_installations().await;
    pick(&installations, required_major)
        .map(|java| {
            info!("Using Java {} at {:?}", java.version, java.path);
            java.path.clone()
        })
        .ok_or(LauncherError::JavaNotFound(required_major))
}

fn pick<'a>(installations: &'a [JavaInstallation], required_major: u32) -> Option<&'a JavaInstallation> {
    let newest = |candidates: Vec<&'a JavaInstallation>| candidates.into_iter().max_by_key(|j| j.major);

    newest(
        installations
            .iter()
            .filter(|j| is_java_compatible_major(j.major, required_major))
            .collect(),
    )
    .or_else(|| {
        if required_major < 17 {
            return None;
        }
        newest(installations.iter().filter(|j| j.major >= required_major).collect())
    })
}

/// Every Java found through `JAVA_HOME`, `PATH` and the usual install
/// folders, newest first.
pub async fn detect_java_installations() -> Vec<JavaInstallation> {
    let mut detected: Vec<JavaInstallation> = Vec::new();

    for candidate in candidate_binaries() {
        if let Some(java) = inspect_java(&candidate).await {
            if !detected.iter().any(|d| d.path == java.path) {
                detected.push(java);
            }
        }
    }

    detected.sort_by(|a, b| b.major.cmp(&a.major).then_with(|| a.path.cmp(&b.path)));
    debug!("Detected {} Java installations", detected.len());
    detected
}

fn candidate_binaries() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(home) = std::env::var_os("JAVA_HOME") {
        candidates.push(PathBuf::from(home).join("bin").join(java_exe()));
    }

    if let Some(path) = std::env::var_os("PATH") {
        candidates.extend(std::env::split_paths(&path).map(|dir| dir.join(java_exe())));
    }

    for root in install_roots() {
        let Ok(entries) = std::fs::read_dir(&root) else {
            continue;
        };
        for entry in entries.filter_map(Result::ok) {
            let home = entry.path();
            candidates.push(home.join("bin").join(java_exe()));
            candidates.push(home.join("Contents/Home/bin").join(java_exe()));
        }
    }

    candidates.retain(|p| p.is_file());
    candidates
}

fn install_roots() -> Vec<PathBuf> {
    if cfg!(target_os = "windows") {
        ["C:\\Program Files\\Java", "C:\\Program Files\\Eclipse Adoptium", "C:\\Program Files\\Zulu"]
            .into_iter()
            .map(PathBuf::from)
            .collect()
    } else if cfg!(target_os = "macos") {
        vec![PathBuf::from("/Library/Java/JavaVirtualMachines")]
    } else {
        vec![PathBuf::from("/usr/lib/jvm"), PathBuf::from("/opt/java")]
    }
}

pub async fn inspect_java(path: &Path) -> Option<JavaInstallation> {
    let output = Command::new(path)
        .args(["-XshowSettings:properties", "-version"])
        .output()
        .await
        .ok()?;

    let text = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&output.stdout)
    );
    debug!("Probing {:?}: {}", path, text.lines().next().unwrap_or(""));
    let canonical = tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf());
    parse_version_output(canonical, &text)
}

fn parse_version_output(path: PathBuf, output: &str) -> Option<JavaInstallation> {
    let version = parse_version_string(output)?;
    let lower = output.to_ascii_lowercase();
    let is_64bit = lower.contains("sun.arch.data.model = 64")
        || lower.contains("os.arch = amd64")
        || lower.contains("os.arch = x86_64")
        || lower.contains("os.arch = aarch64");

    Some(JavaInstallation {
        path,
        major: parse_major_version(&version),
        version,
        is_64bit,
        vendor: parse_vendor(output),
    })
}

/// First quoted string of `java -version`, e.g. `17.0.8` or `1.8.0_392`.
fn parse_version_string(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let start = line.find('"')?;
        let end = line[start + 1..].find('"')?;
        Some(line[start + 1..start + 1 + end].to_string())
    })
}

fn parse_vendor(output: &str) -> String {
    ["Temurin", "Adoptium", "Zulu", "GraalVM", "Microsoft", "OpenJDK"]
        .into_iter()
        .find(|vendor| output.contains(vendor))
        .unwrap_or("unknown")
        .to_string()
}

fn parse_major_version(version: &str) -> u32 {
    let mut parts = version.split(|c: char| c == '.' || c == '_' || c == '-' || c == '+');
    let first: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    if first == 1 {
        parts.next().and_then(|p| p.parse().ok()).unwrap_or(first)
    } else {
        first
    }
}

fn runtime_track(major: u32) -> u32 {
    if major <= 8 {
        8
    } else if major >= 21 {
        21
    } else {
        17
    }
}

pub fn is_java_compatible_major(installed_major: u32, required_major: u32) -> bool {
    installed_major >= required_major && runtime_track(installed_major) == runtime_track(required_major)
}

/// Java major a game version needs when its version JSON does not say.
pub fn required_java_for_minecraft_version(minecraft_version: &str) -> u32 {
    let lower = minecraft_version.to_ascii_lowercase();
    // Snapshots look like `24w03a`.
    if let Some(week_pos) = lower.find('w') {
        if let Ok(year) = lower[..week_pos].parse::<u32>() {
            return if year >= 24 { 21 } else { 17 };
        }
    }

    let mut parts = minecraft_version.split('.').map(|p| p.parse::<u32>().ok());
    let major = parts.next().flatten().unwrap_or(1);
    let minor = parts.next().flatten().unwrap_or(20);
    let patch = parts.next().flatten().unwrap_or(0);

    if major > 1 || minor >= 21 || (minor == 20 && patch >= 5) {
        21
    } else if minor >= 17 {
        17
    } else {
        8
    }
}

fn java_exe() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}
