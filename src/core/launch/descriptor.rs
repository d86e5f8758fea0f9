// ─── Launch Descriptor ───
// Builds the JVM command line for a resolved version, a profile and a session.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::core::auth::SessionToken;
use crate::core::config::LauncherSettings;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::profile::Profile;
use crate::core::version::ResolvedVersion;

pub const LAUNCHER_NAME: &str = "CraftLauncher";
pub const LAUNCHER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// G1 tuning applied to every launch.
const G1_FLAGS: &[&str] = &[
    "-XX:+UnlockExperimentalVMOptions",
    "-XX:+UseG1GC",
    "-XX:+ParallelRefProcEnabled",
    "-XX:MaxGCPauseMillis=200",
    "-XX:G1NewSizePercent=20",
    "-XX:G1ReservePercent=20",
    "-XX:G1HeapRegionSize=32M",
];

/// Everything needed to start the game process.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LaunchDescriptor {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl LaunchDescriptor {
    /// Shell-like rendering for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(shell_escape(&path_str(&self.executable)))
            .chain(self.args.iter().map(|a| shell_escape(a)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Puts `flags` ahead of every other JVM argument. Java agents must load
    /// before the memory flags and the version's own arguments.
    pub fn prepend_jvm_args(&mut self, flags: Vec<String>) {
        self.args.splice(0..0, flags);
    }
}

pub fn classpath_separator() -> &'static str {
    if cfg!(target_os = "windows") {
        ";"
    } else {
        ":"
    }
}

/// Values substituted into `${...}` placeholders of version arguments.
struct Placeholders<'a> {
    profile: &'a Profile,
    version: &'a ResolvedVersion,
    session: &'a SessionToken,
    classpath: String,
}

impl Placeholders<'_> {
    fn resolve(&self, raw: &str) -> String {
        let natives = self
            .version
            .natives_dir
            .as_deref()
            .map(path_str)
            .unwrap_or_default();

        raw.replace("${natives_directory}", &natives)
            .replace("${library_directory}", &path_str(&self.version.libraries_dir))
            .replace("${classpath_separator}", classpath_separator())
            .replace("${classpath}", &self.classpath)
            .replace("${game_directory}", &path_str(&self.profile.directory))
            .replace("${version_name}", &self.version.version_id)
            .replace("${version_type}", &self.version.version_type)
            .replace("${assets_root}", &path_str(&self.version.assets_dir))
            .replace("${game_assets}", &path_str(&self.version.assets_dir))
            .replace("${assets_index_name}", &self.version.asset_index)
            .replace("${auth_player_name}", &self.session.username)
            .replace("${auth_uuid}", &self.session.uuid)
            .replace("${auth_access_token}", &self.session.access_token)
            .replace("${auth_session}", &self.session.access_token)
            .replace("${user_type}", &self.session.user_type)
            .replace("${user_properties}", "{}")
            .replace("${launcher_name}", LAUNCHER_NAME)
            .replace("${launcher_version}", LAUNCHER_VERSION)
    }
}

/// Assembles the command line: memory and GC flags, version JVM arguments,
/// classpath, main class, then game arguments.
pub fn build_descriptor(
    java: &Path,
    settings: &LauncherSettings,
    profile: &Profile,
    version: &ResolvedVersion,
    session: &SessionToken,
) -> LauncherResult<LaunchDescriptor> {
    if version.classpath.is_empty() {
        return Err(LauncherError::Validation(format!(
            "version {} has an empty classpath",
            version.version_id
        )));
    }
    if version.main_class.trim().is_empty() {
        return Err(LauncherError::Validation(format!(
            "version {} has no main class",
            version.version_id
        )));
    }

    let classpath = version
        .classpath
        .iter()
        .map(|p| path_str(p))
        .collect::<Vec<_>>()
        .join(classpath_separator());
    let placeholders = Placeholders {
        profile,
        version,
        session,
        classpath,
    };

    let mut args = vec![
        format!("-Xms{}G", settings.ram_min),
        format!("-Xmx{}G", settings.ram_max),
    ];
    args.extend(G1_FLAGS.iter().map(|f| f.to_string()));
    args.extend(jvm_args(&placeholders));

    if let Some(natives) = &version.natives_dir {
        let flag = "-Djava.library.path=";
        if !args.iter().any(|a| a.starts_with(flag)) {
            args.push(format!("{flag}{}", path_str(natives)));
        }
    }

    args.push("-cp".into());
    args.push(placeholders.classpath.clone());
    args.push(version.main_class.clone());
    args.extend(game_args(&placeholders));

    debug!("Built {} launch arguments for {}", args.len(), profile.name);
    Ok(LaunchDescriptor {
        executable: java.to_path_buf(),
        args,
        working_dir: profile.directory.clone(),
    })
}

/// Version JVM arguments with placeholders resolved. The classpath is always
/// injected separately, so any `-cp <value>` pair from the version is dropped.
fn jvm_args(placeholders: &Placeholders<'_>) -> Vec<String> {
    let raw = &placeholders.version.jvm_args;
    let mut out = Vec::new();
    let mut i = 0;
    while i < raw.len() {
        let arg = &raw[i];
        if arg == "-cp" || arg == "-classpath" || arg == "--class-path" {
            i += 2;
            continue;
        }
        // Natives live nowhere when the version ships none.
        if placeholders.version.natives_dir.is_none() && arg.contains("${natives_directory}") {
            i += 1;
            continue;
        }
        push_resolved(&mut out, placeholders.resolve(arg));
        i += 1;
    }
    out
}

/// Version game arguments with placeholders resolved, followed by any of the
/// required flags the version did not provide.
fn game_args(placeholders: &Placeholders<'_>) -> Vec<String> {
    let mut out = Vec::new();
    for arg in &placeholders.version.game_args {
        push_resolved(&mut out, placeholders.resolve(arg));
    }

    let version = placeholders.version;
    let session = placeholders.session;
    let required = [
        ("--username", session.username.clone()),
        ("--version", version.version_id.clone()),
        ("--gameDir", path_str(&placeholders.profile.directory)),
        ("--assetsDir", path_str(&version.assets_dir)),
        ("--assetIndex", version.asset_index.clone()),
        ("--uuid", session.uuid.clone()),
        ("--accessToken", session.access_token.clone()),
        ("--userType", session.user_type.clone()),
    ];
    for (flag, value) in required {
        if !out.iter().any(|a| a == flag) {
            out.push(flag.to_string());
            out.push(value);
        }
    }
    out
}

/// Pushes `resolved` unless it still holds a placeholder we cannot fill, in
/// which case the option it belongs to goes too.
fn push_resolved(out: &mut Vec<String>, resolved: String) {
    if resolved.contains("${") {
        debug!("Dropping unresolved argument {}", resolved);
        if !resolved.starts_with('-') {
            drop_dangling_option(out);
        }
        return;
    }
    out.push(resolved);
}

fn drop_dangling_option(args: &mut Vec<String>) {
    if args.last().is_some_and(|last| last.starts_with('-')) {
        let _ = args.pop();
    }
}

fn path_str(path: &Path) -> String {
    let text = path.to_string_lossy().to_string();
    // Java rejects Windows extended-length paths on the classpath.
    match text.strip_prefix(r"\\?\") {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }
    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }
    format!("\"{}\"", raw.replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::profile::LoaderType;
    use crate::core::version::resolver::fakes::resolved;

    fn profile(dir: &Path) -> Profile {
        Profile {
            id: "p1".into(),
            name: "Survival".into(),
            game_version: "1.20.1".into(),
            loader: LoaderType::Vanilla,
            loader_version: None,
            directory: dir.join("profiles/Survival"),
            mod_set: Vec::new(),
            created_at: chrono::Utc::now(),
            last_played: None,
            icon: String::new(),
        }
    }

    fn session() -> SessionToken {
        SessionToken {
            username: "Steve".into(),
            uuid: "069a79f444e94726a5befca90e38aaf5".into(),
            access_token: "token".into(),
            user_type: "msa".into(),
            auth_server: None,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        let at = args.iter().position(|a| a == flag)?;
        args.get(at + 1).map(String::as_str)
    }

    #[test]
    fn memory_flags_come_from_settings() {
        let root = Path::new("/games");
        let settings = LauncherSettings {
            ram_min: 2,
            ram_max: 6,
            ..Default::default()
        };
        let d = build_descriptor(
            Path::new("/usr/bin/java"),
            &settings,
            &profile(root),
            &resolved("1.20.1", root),
            &session(),
        )
        .unwrap();

        assert_eq!(d.args[0], "-Xms2G");
        assert_eq!(d.args[1], "-Xmx6G");
        assert!(d.args.iter().any(|a| a == "-XX:+UseG1GC"));
        assert_eq!(d.working_dir, root.join("profiles/Survival"));
        assert_eq!(d.executable, Path::new("/usr/bin/java"));
    }

    #[test]
    fn prepended_flags_precede_memory_flags() {
        let root = Path::new("/games");
        let mut d = build_descriptor(
            Path::new("java"),
            &LauncherSettings::default(),
            &profile(root),
            &resolved("1.20.1", root),
            &session(),
        )
        .unwrap();
        let before = d.args.len();

        d.prepend_jvm_args(vec!["-javaagent:a.jar=x".into(), "-Dside=client".into()]);

        assert_eq!(d.args.len(), before + 2);
        assert_eq!(d.args[0], "-javaagent:a.jar=x");
        assert_eq!(d.args[1], "-Dside=client");
        assert!(d.args[2].starts_with("-Xms"));
    }

    #[test]
    fn classpath_precedes_main_class_and_game_args() {
        let root = Path::new("/games");
        let version = resolved("1.20.1", root);
        let d = build_descriptor(
            Path::new("java"),
            &LauncherSettings::default(),
            &profile(root),
            &version,
            &session(),
        )
        .unwrap();

        let cp = d.args.iter().position(|a| a == "-cp").unwrap();
        assert_eq!(d.args[cp + 2], "net.minecraft.client.main.Main");
        assert!(d.args[cp + 1].ends_with("1.20.1.jar"));
        assert_eq!(
            d.args[cp + 1].split(classpath_separator()).count(),
            version.classpath.len()
        );
    }

    #[test]
    fn required_game_args_are_present() {
        let root = Path::new("/games");
        let d = build_descriptor(
            Path::new("java"),
            &LauncherSettings::default(),
            &profile(root),
            &resolved("1.20.1", root),
            &session(),
        )
        .unwrap();

        assert_eq!(value_after(&d.args, "--username"), Some("Steve"));
        assert_eq!(value_after(&d.args, "--version"), Some("1.20.1"));
        assert_eq!(value_after(&d.args, "--assetIndex"), Some("5"));
        assert_eq!(value_after(&d.args, "--accessToken"), Some("token"));
        assert_eq!(value_after(&d.args, "--userType"), Some("msa"));
        assert_eq!(value_after(&d.args, "--versionType"), Some("release"));
        assert_eq!(
            value_after(&d.args, "--uuid"),
            Some("069a79f444e94726a5befca90e38aaf5")
        );
        assert!(value_after(&d.args, "--gameDir").unwrap().ends_with("Survival"));
    }

    #[test]
    fn version_args_are_not_duplicated() {
        let root = Path::new("/games");
        let mut version = resolved("1.20.1", root);
        version.game_args = vec![
            "--username".into(),
            "${auth_player_name}".into(),
            "--version".into(),
            "${version_name}".into(),
        ];
        let d = build_descriptor(
            Path::new("java"),
            &LauncherSettings::default(),
            &profile(root),
            &version,
            &session(),
        )
        .unwrap();
        assert_eq!(d.args.iter().filter(|a| *a == "--username").count(), 1);
        assert_eq!(d.args.iter().filter(|a| *a == "--version").count(), 1);
    }

    #[test]
    fn unresolved_placeholders_drop_their_option() {
        let root = Path::new("/games");
        let mut version = resolved("1.20.1", root);
        version.game_args = vec!["--clientId".into(), "${clientid}".into(), "--demo".into()];
        version.jvm_args = vec![
            "-cp".into(),
            "${classpath}".into(),
            "-Dlog4j.configurationFile=${path}".into(),
        ];
        let d = build_descriptor(
            Path::new("java"),
            &LauncherSettings::default(),
            &profile(root),
            &version,
            &session(),
        )
        .unwrap();

        assert!(!d.args.iter().any(|a| a.contains("${")));
        assert!(!d.args.iter().any(|a| a == "--clientId"));
        assert!(d.args.iter().any(|a| a == "--demo"));
        assert_eq!(d.args.iter().filter(|a| *a == "-cp").count(), 1);
    }

    #[test]
    fn natives_flag_only_when_natives_exist() {
        let root = Path::new("/games");
        let mut version = resolved("1.12.2", root);
        let d = build_descriptor(
            Path::new("java"),
            &LauncherSettings::default(),
            &profile(root),
            &version,
            &session(),
        )
        .unwrap();
        assert!(!d.args.iter().any(|a| a.starts_with("-Djava.library.path")));

        version.natives_dir = Some(root.join("versions/1.12.2/natives"));
        let d = build_descriptor(
            Path::new("java"),
            &LauncherSettings::default(),
            &profile(root),
            &version,
            &session(),
        )
        .unwrap();
        let flags: Vec<_> = d
            .args
            .iter()
            .filter(|a| a.starts_with("-Djava.library.path="))
            .collect();
        assert_eq!(flags.len(), 1);
        assert!(flags[0].ends_with("natives"));
    }

    #[test]
    fn empty_classpath_is_rejected() {
        let root = Path::new("/games");
        let mut version = resolved("1.20.1", root);
        version.classpath.clear();
        let err = build_descriptor(
            Path::new("java"),
            &LauncherSettings::default(),
            &profile(root),
            &version,
            &session(),
        )
        .unwrap_err();
        assert!(matches!(err, LauncherError::Validation(_)));
    }

    #[test]
    fn command_line_quotes_spaces() {
        let d = LaunchDescriptor {
            executable: PathBuf::from("/opt/java/bin/java"),
            args: vec!["-Xmx4G".into(), "--gameDir".into(), "/home/me/My Games".into()],
            working_dir: PathBuf::from("/tmp"),
        };
        assert_eq!(
            d.command_line(),
            "/opt/java/bin/java -Xmx4G --gameDir \"/home/me/My Games\""
        );
    }
}
