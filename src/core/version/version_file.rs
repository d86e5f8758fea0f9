// ─── Version File ───
// Parses a Mojang-format version JSON (vanilla or loader profile) and
// evaluates its OS rules.

use serde::Deserialize;
use serde_json::Value;

/// A parsed version JSON. Loader profiles (Fabric, Quilt, installed Forge)
/// use the same shape and point at their base game through `inherits_from`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionJson {
    pub id: String,
    pub main_class: String,
    #[serde(default)]
    pub inherits_from: Option<String>,
    /// Game jar to use when it differs from `id`.
    #[serde(default)]
    pub jar: Option<String>,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    #[serde(default)]
    pub downloads: Option<VersionDownloads>,
    #[serde(default)]
    pub asset_index: Option<AssetIndexInfo>,
    /// Asset index id on versions that predate `assetIndex`.
    #[serde(default)]
    pub assets: Option<String>,
    #[serde(default)]
    pub arguments: Option<Arguments>,
    /// Pre-1.13 space separated game arguments.
    #[serde(default)]
    pub minecraft_arguments: Option<String>,
    #[serde(default)]
    pub java_version: Option<JavaVersionInfo>,
    /// `release`, `snapshot`, `old_beta`...
    #[serde(default, rename = "type")]
    pub version_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersionInfo {
    pub major_version: u32,
}

#[derive(Debug, Deserialize)]
pub struct VersionDownloads {
    pub client: Option<DownloadArtifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadArtifact {
    pub sha1: String,
    pub size: u64,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetIndexInfo {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<Value>,
    #[serde(default)]
    pub jvm: Vec<Value>,
}

// ─── Libraries ───

#[derive(Debug, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    /// Maven repository base for libraries listed by coordinate only.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub rules: Option<Vec<LibraryRule>>,
    #[serde(default)]
    pub natives: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct LibraryDownloads {
    pub artifact: Option<LibDownloadArtifact>,
    #[serde(default)]
    pub classifiers: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibDownloadArtifact {
    pub path: String,
    pub sha1: String,
    pub url: String,
}

/// A library file to fetch into `libraries/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryFile {
    /// Relative to the libraries directory.
    pub path: String,
    pub url: String,
    pub sha1: Option<String>,
}

const MOJANG_LIBRARIES: &str = "https://libraries.minecraft.net/";

#[derive(Debug, Deserialize)]
pub struct LibraryRule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: Option<OsRule>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Deserialize)]
pub struct OsRule {
    #[serde(default)]
    pub name: Option<String>,
}

impl LibraryEntry {
    /// No rules means allowed. Otherwise start disallowed and let every rule
    /// whose OS matches decide, last one wins.
    pub fn is_allowed_for_current_os(&self) -> bool {
        let Some(rules) = &self.rules else {
            return true;
        };

        let current_os = current_os_name();
        rules.iter().fold(false, |allowed, rule| {
            let os_matches = rule
                .os
                .as_ref()
                .and_then(|os| os.name.as_deref())
                .map_or(true, |name| name == current_os);
            if os_matches {
                rule.action == RuleAction::Allow
            } else {
                allowed
            }
        })
    }

    /// The main jar, from explicit download info or from the coordinate.
    pub fn artifact(&self) -> Option<LibraryFile> {
        if let Some(artifact) = self.downloads.as_ref().and_then(|d| d.artifact.as_ref()) {
            return Some(LibraryFile {
                path: artifact.path.clone(),
                url: artifact.url.clone(),
                sha1: Some(artifact.sha1.clone()),
            });
        }
        // Native-only entries carry no main jar.
        if self.natives.is_some() && self.downloads.is_some() {
            return None;
        }

        let path = maven_path(&self.name)?;
        let repo = self.url.as_deref().unwrap_or(MOJANG_LIBRARIES);
        let url = format!("{}/{}", repo.trim_end_matches('/'), path);
        Some(LibraryFile {
            path,
            url,
            sha1: None,
        })
    }

    /// Legacy native classifier jar for this OS, extracted before launch.
    pub fn native(&self) -> Option<LibraryFile> {
        let classifier = self.native_classifier_for_current_os()?;
        let info = self
            .downloads
            .as_ref()?
            .classifiers
            .as_ref()?
            .get(&classifier)?;

        Some(LibraryFile {
            path: info.get("path")?.as_str()?.to_string(),
            url: info.get("url")?.as_str()?.to_string(),
            sha1: info.get("sha1").and_then(Value::as_str).map(str::to_string),
        })
    }

    fn native_classifier_for_current_os(&self) -> Option<String> {
        let classifier = self.natives.as_ref()?.get(current_os_name())?.as_str()?;
        let arch = if cfg!(target_pointer_width = "64") {
            "64"
        } else {
            "32"
        };
        Some(classifier.replace("${arch}", arch))
    }
}

/// `group:artifact:version[:classifier][@ext]` to its repository path.
pub fn maven_path(coordinate: &str) -> Option<String> {
    let (coordinate, ext) = match coordinate.split_once('@') {
        Some((c, ext)) => (c, ext),
        None => (coordinate, "jar"),
    };

    let parts: Vec<&str> = coordinate.split(':').collect();
    let (group, artifact, version, classifier) = match parts.as_slice() {
        [g, a, v] => (*g, *a, *v, None),
        [g, a, v, c] => (*g, *a, *v, Some(*c)),
        _ => return None,
    };

    let file = match classifier {
        Some(c) => format!("{artifact}-{version}-{c}.{ext}"),
        None => format!("{artifact}-{version}.{ext}"),
    };
    Some(format!(
        "{}/{}/{}/{}",
        group.replace('.', "/"),
        artifact,
        version,
        file
    ))
}

/// Mojang's name for the running OS.
pub fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

impl VersionJson {
    pub fn required_java_major(&self) -> Option<u32> {
        self.java_version.as_ref().map(|j| j.major_version)
    }

    /// Asset index id, falling back to the legacy `assets` field.
    pub fn asset_index_id(&self) -> Option<&str> {
        self.asset_index
            .as_ref()
            .map(|a| a.id.as_str())
            .or(self.assets.as_deref())
    }

    pub fn game_args(&self) -> Vec<String> {
        match (&self.arguments, &self.minecraft_arguments) {
            (Some(args), _) if !args.game.is_empty() => {
                args.game.iter().flat_map(extract_argument_values).collect()
            }
            (_, Some(legacy)) => legacy.split_whitespace().map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }

    pub fn jvm_args(&self) -> Vec<String> {
        self.arguments
            .as_ref()
            .map(|args| args.jvm.iter().flat_map(extract_argument_values).collect())
            .unwrap_or_default()
    }

    /// Overlays a child profile on its parent.
    ///
    /// Scalars in the child win. Libraries are child first so loader
    /// libraries shadow vanilla ones on the classpath. Arguments are parent
    /// first, then the child's additions.
    pub fn merge_with_parent(child: &Value, parent: &Value) -> Value {
        let mut merged = parent.clone();
        let (Some(child_obj), Some(merged_obj)) = (child.as_object(), merged.as_object_mut()) else {
            return child.clone();
        };

        for (key, value) in child_obj {
            match key.as_str() {
                "inheritsFrom" => {}
                "libraries" => {
                    let mut libraries = value.as_array().cloned().unwrap_or_default();
                    if let Some(parent_libs) = merged_obj.get("libraries").and_then(Value::as_array) {
                        let names: Vec<&str> = libraries
                            .iter()
                            .filter_map(|l| l.get("name").and_then(Value::as_str))
                            .map(unversioned)
                            .collect::<Vec<_>>();
                        let names: Vec<String> = names.into_iter().map(str::to_string).collect();
                        libraries.extend(
                            parent_libs
                                .iter()
                                .filter(|l| {
                                    l.get("name")
                                        .and_then(Value::as_str)
                                        .map_or(true, |n| !names.iter().any(|c| c == unversioned(n)))
                                })
                                .cloned(),
                        );
                    }
                    merged_obj.insert(key.clone(), Value::Array(libraries));
                }
                "arguments" => {
                    let mut arguments = merged_obj
                        .get("arguments")
                        .cloned()
                        .unwrap_or_else(|| Value::Object(Default::default()));
                    for side in ["game", "jvm"] {
                        let Some(extra) = value.get(side).and_then(Value::as_array) else {
                            continue;
                        };
                        let mut combined = arguments
                            .get(side)
                            .and_then(Value::as_array)
                            .cloned()
                            .unwrap_or_default();
                        combined.extend(extra.iter().cloned());
                        arguments[side] = Value::Array(combined);
                    }
                    merged_obj.insert(key.clone(), arguments);
                }
                _ => {
                    merged_obj.insert(key.clone(), value.clone());
                }
            }
        }

        merged
    }
}

/// `group:artifact` part of a coordinate, so a loader's newer library
/// replaces the vanilla one instead of sitting next to it.
fn unversioned(name: &str) -> &str {
    match name.match_indices(':').nth(1) {
        Some((idx, _)) => &name[..idx],
        None => name,
    }
}

fn extract_argument_values(value: &Value) -> Vec<String> {
    if let Some(arg) = value.as_str() {
        return vec![arg.to_string()];
    }

    let Some(obj) = value.as_object() else {
        return vec![];
    };

    if let Some(rules) = obj.get("rules").and_then(|r| r.as_array()) {
        if !rules_allow(rules) {
            return vec![];
        }
    }

    match obj.get("value") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(arr)) => arr
            .iter()
            .filter_map(|v| v.as_str().map(ToString::to_string))
            .collect(),
        _ => vec![],
    }
}

/// Argument rules. Feature-gated ones (demo mode, custom resolution,
/// quick play) are never enabled by this launcher.
fn rules_allow(rules: &[Value]) -> bool {
    let current_os = current_os_name();
    let mut allowed = false;

    for rule in rules {
        if rule.get("features").is_some() {
            return false;
        }

        let action = rule
            .get("action")
            .and_then(|v| v.as_str())
            .unwrap_or("disallow");

        let os_matches = match rule
            .get("os")
            .and_then(|os| os.get("name"))
            .and_then(|name| name.as_str())
        {
            None => true,
            Some(name) => name == current_os,
        };

        if os_matches {
            allowed = action == "allow";
        }
    }

    allowed
}
