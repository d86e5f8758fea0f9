// ─── Manifest Codec ───
// Portable profile sharing codes.
//
// Layout: `CL1-` + base64url(no pad) of
//   [tag: u8 = 1][sha256(body)[..4]][body = raw DEFLATE of JSON]
// The JSON carries {name, game_version, loader, loader_version, mods} in that
// order. Unknown JSON fields are ignored so newer encoders stay readable.

use std::collections::HashSet;
use std::fmt;
use std::io::{Read, Write};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::mods::ModEntry;
use crate::core::profile::{LoaderType, Profile};

const PREFIX: &str = "CL1-";
const FORMAT_TAG: u8 = 1;
const CHECKSUM_LEN: usize = 4;
const HEADER_LEN: usize = 1 + CHECKSUM_LEN;
const MAX_INFLATED: u64 = 1024 * 1024;

/// Shareable text code for a profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestCode(String);

impl ManifestCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ManifestCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The profile-shaped record a code carries. Directories are local and are
/// never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestProfile {
    pub name: String,
    pub game_version: String,
    #[serde(default)]
    pub loader: LoaderType,
    #[serde(default)]
    pub loader_version: Option<String>,
    #[serde(default)]
    pub mods: Vec<ModEntry>,
}

impl From<&Profile> for ManifestProfile {
    fn from(profile: &Profile) -> Self {
        Self {
            name: profile.name.clone(),
            game_version: profile.game_version.clone(),
            loader: profile.loader,
            loader_version: profile.loader_version.clone(),
            mods: profile.mod_set.clone(),
        }
    }
}

impl ManifestProfile {
    pub fn encode(&self) -> LauncherResult<ManifestCode> {
        let json = serde_json::to_vec(self)?;
        let body = deflate(&json)?;

        let mut framed = Vec::with_capacity(HEADER_LEN + body.len());
        framed.push(FORMAT_TAG);
        framed.extend_from_slice(&checksum(&body));
        framed.extend_from_slice(&body);

        Ok(ManifestCode(format!(
            "{PREFIX}{}",
            URL_SAFE_NO_PAD.encode(framed)
        )))
    }

    fn validate(&self) -> LauncherResult<()> {
        if self.name.trim().is_empty() {
            return Err(malformed("profile name is empty"));
        }
        if self.game_version.trim().is_empty() {
            return Err(malformed("game version is empty"));
        }

        let mut seen = HashSet::new();
        for entry in &self.mods {
            if entry.catalog_id.trim().is_empty() || entry.version_pin.trim().is_empty() {
                return Err(malformed("mod entry without id or version"));
            }
            if !seen.insert(entry.catalog_id.as_str()) {
                return Err(malformed(format!(
                    "mod '{}' listed twice",
                    entry.catalog_id
                )));
            }
        }
        Ok(())
    }
}

pub fn encode(profile: &Profile) -> LauncherResult<ManifestCode> {
    ManifestProfile::from(profile).encode()
}

/// Parses a code produced by [`encode`]. Anything else fails with
/// `MalformedManifest`; a partially-populated record is never returned.
pub fn decode(code: &str) -> LauncherResult<ManifestProfile> {
    let payload = code
        .trim()
        .strip_prefix(PREFIX)
        .ok_or_else(|| malformed("not a CraftLauncher profile code"))?;

    let framed = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| malformed(format!("invalid encoding: {e}")))?;

    if framed.len() <= HEADER_LEN {
        return Err(malformed("truncated payload"));
    }
    if framed[0] != FORMAT_TAG {
        return Err(malformed(format!("unsupported format tag {}", framed[0])));
    }

    let (expected, body) = framed[1..].split_at(CHECKSUM_LEN);
    if checksum(body).as_slice() != expected {
        return Err(malformed("checksum mismatch"));
    }

    let json = inflate(body)?;
    let record: ManifestProfile =
        serde_json::from_slice(&json).map_err(|e| malformed(format!("invalid contents: {e}")))?;
    record.validate()?;
    Ok(record)
}

fn checksum(body: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(body);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

fn deflate(raw: &[u8]) -> LauncherResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(raw)?;
    Ok(encoder.finish()?)
}

fn inflate(body: &[u8]) -> LauncherResult<Vec<u8>> {
    let mut out = Vec::new();
    DeflateDecoder::new(body)
        .take(MAX_INFLATED + 1)
        .read_to_end(&mut out)
        .map_err(|e| malformed(format!("corrupt payload: {e}")))?;

    if out.len() as u64 > MAX_INFLATED {
        return Err(malformed("payload too large"));
    }
    Ok(out)
}

fn malformed(reason: impl Into<String>) -> LauncherError {
    LauncherError::MalformedManifest(reason.into())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Utc;

    use super::*;
    use crate::core::mods::ModSource;

    fn survival() -> Profile {
        Profile {
            id: "a1b2c3d4".into(),
            name: "Survival".into(),
            game_version: "1.20.1".into(),
            loader: LoaderType::Fabric,
            loader_version: None,
            directory: PathBuf::from("/home/alex/.minecraft/profiles/Survival"),
            mod_set: Vec::new(),
            created_at: Utc::now(),
            last_played: None,
            icon: "🎮".into(),
        }
    }

    /// Frames arbitrary JSON the way `encode` does.
    fn frame(json: &[u8], tag: u8) -> String {
        let body = deflate(json).unwrap();
        let mut framed = vec![tag];
        framed.extend_from_slice(&checksum(&body));
        framed.extend_from_slice(&body);
        format!("{PREFIX}{}", URL_SAFE_NO_PAD.encode(framed))
    }

    #[test]
    fn survival_round_trips_with_empty_mod_set() {
        let code = encode(&survival()).unwrap();
        let decoded = decode(code.as_str()).unwrap();

        assert_eq!(decoded.name, "Survival");
        assert_eq!(decoded.game_version, "1.20.1");
        assert_eq!(decoded.loader, LoaderType::Fabric);
        assert!(decoded.mods.is_empty());
    }

    #[test]
    fn re_encoding_a_decoded_code_is_stable() {
        let mut profile = survival();
        profile.loader_version = Some("0.15.11".into());
        profile.mod_set = vec![
            ModEntry::new("sodium", ModSource::Modrinth, "0.5.0"),
            ModEntry {
                enabled: false,
                dependency_of: Some("sodium".into()),
                ..ModEntry::new("238222", ModSource::CurseForge, "4712866")
            },
        ];

        let code = encode(&profile).unwrap();
        let decoded = decode(code.as_str()).unwrap();
        assert_eq!(decoded.mods, profile.mod_set);
        assert_eq!(decoded.encode().unwrap(), code);
    }

    #[test]
    fn directory_is_never_encoded() {
        let code = encode(&survival()).unwrap();
        let framed = URL_SAFE_NO_PAD
            .decode(code.as_str().strip_prefix(PREFIX).unwrap())
            .unwrap();
        let json = inflate(&framed[HEADER_LEN..]).unwrap();
        let text = String::from_utf8(json).unwrap();
        assert!(!text.contains("profiles/Survival"));
        assert!(!text.contains("directory"));
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let code = encode(&survival()).unwrap();
        assert!(decode(&format!("  {code}\n")).is_ok());
    }

    #[test]
    fn rejects_structurally_invalid_codes() {
        let code = encode(&survival()).unwrap().into_string();
        let payload = code.strip_prefix(PREFIX).unwrap();

        let mut framed = URL_SAFE_NO_PAD.decode(payload).unwrap();
        let last = framed.len() - 1;
        framed[last] ^= 0xFF;
        let tampered = format!("{PREFIX}{}", URL_SAFE_NO_PAD.encode(&framed));

        let cases = [
            String::new(),
            "hello world".to_string(),
            payload.to_string(),
            format!("XX1-{payload}"),
            format!("{PREFIX}!!!not base64!!!"),
            format!("{PREFIX}{}", &payload[..4]),
            code[..code.len() / 2].to_string(),
            tampered,
            frame(br#"{"name":"Survival","game_version":"1.20.1"}"#, 2),
        ];

        for case in cases {
            assert!(
                matches!(decode(&case), Err(LauncherError::MalformedManifest(_))),
                "accepted {case:?}"
            );
        }
    }

    #[test]
    fn rejects_valid_frames_with_bad_contents() {
        let cases = [
            frame(b"not json", FORMAT_TAG),
            frame(br#"{"name":"","game_version":"1.20.1"}"#, FORMAT_TAG),
            frame(br#"{"name":"X"}"#, FORMAT_TAG),
            frame(br#"{"name":"X","game_version":"1.20.1","loader":"spigot"}"#, FORMAT_TAG),
            frame(
                br#"{"name":"X","game_version":"1.20.1","mods":[
                    {"catalog_id":"a","source":"modrinth","version_pin":"1"},
                    {"catalog_id":"a","source":"modrinth","version_pin":"2"}]}"#,
                FORMAT_TAG,
            ),
        ];

        for case in cases {
            assert!(matches!(
                decode(&case),
                Err(LauncherError::MalformedManifest(_))
            ));
        }
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let code = frame(
            br#"{"name":"Future","game_version":"1.21","loader":"neoforge",
                "shaders":["complementary"],
                "mods":[{"catalog_id":"jei","source":"curseforge","version_pin":"1","notes":"x"}]}"#,
            FORMAT_TAG,
        );
        let decoded = decode(&code).unwrap();
        assert_eq!(decoded.name, "Future");
        assert_eq!(decoded.loader, LoaderType::NeoForge);
        assert_eq!(decoded.mods.len(), 1);
    }
}
