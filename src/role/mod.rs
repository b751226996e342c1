//! Data model shared by every signed role document, plus the metadata file
//! naming rules.
//!
//! Role documents are JSON envelopes `{signed, signatures}`. The bytes that
//! signatures cover are the compact serialisation of the `signed` object
//! with keys in parsed order; signing and verification must go through the
//! same serialiser.

pub mod v06;
pub mod v1;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use crate::crypto;
use crate::error::TrustError;

/// A public key as declared in root metadata. `keyval` is the raw key in
/// hex form, 64 characters for Ed25519.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub keytype: String,
    pub scheme: String,
    pub keyval: String,
}

impl Key {
    /// Key synthesised from a bare Ed25519 public key in hex form, as used
    /// by the v0.6 dialect where the hex key doubles as its own key ID.
    pub fn from_ed25519(keyval: impl Into<String>) -> Self {
        Self {
            keytype: "ed25519".to_string(),
            scheme: "ed25519".to_string(),
            keyval: keyval.into(),
        }
    }
}

/// Key IDs and signature threshold of a role, v1 form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: Vec<String>,
    pub threshold: u64,
}

/// Public keys and signature threshold of a delegation, v0.6 form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePubKeys {
    pub pubkeys: Vec<String>,
    pub threshold: u64,
}

impl RolePubKeys {
    /// Lift to the v1 form: each pubkey doubles as its own key ID.
    pub fn to_role_keys(&self) -> RoleKeys {
        RoleKeys {
            keyids: self.pubkeys.clone(),
            threshold: self.threshold,
        }
    }
}

/// A single detached signature over the `signed` object. Signatures are
/// collected into sets keyed by `keyid`: a key ID appearing twice counts
/// once, and iteration is in lexicographic key ID order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleSignature {
    pub keyid: String,
    pub sig: String,
}

impl PartialEq for RoleSignature {
    fn eq(&self, other: &Self) -> bool {
        self.keyid == other.keyid
    }
}

impl Eq for RoleSignature {}

impl PartialOrd for RoleSignature {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RoleSignature {
    fn cmp(&self, other: &Self) -> Ordering {
        self.keyid.cmp(&other.keyid)
    }
}

/// A materialised keyring: the form consumed by signature verification.
#[derive(Debug, Clone)]
pub struct RoleFullKeys {
    pub keys: BTreeMap<String, Key>,
    pub threshold: u64,
}

/// Roles recognized in v1 metadata. Any other role name is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleType {
    Root,
    Snapshot,
    Targets,
    Timestamp,
    Mirrors,
}

impl FromStr for RoleType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "root" => Ok(Self::Root),
            "snapshot" => Ok(Self::Snapshot),
            "targets" => Ok(Self::Targets),
            "timestamp" => Ok(Self::Timestamp),
            "mirrors" => Ok(Self::Mirrors),
            _ => Err(()),
        }
    }
}

/// Major metadata specification dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecVersion {
    V06,
    V1,
}

/// Fields common to every signed role document.
#[derive(Debug, Clone)]
pub struct RoleBase {
    kind: &'static str,
    spec_version: String,
    version: u64,
    ext: &'static str,
}

impl RoleBase {
    pub(crate) fn new(kind: &'static str, spec_version: &str) -> Self {
        Self {
            kind,
            spec_version: spec_version.to_string(),
            version: 1,
            ext: "json",
        }
    }

    pub fn kind(&self) -> &str {
        self.kind
    }

    pub fn spec_version(&self) -> &str {
        &self.spec_version
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn file_ext(&self) -> &str {
        self.ext
    }

    pub(crate) fn set_spec_version(&mut self, spec_version: String) {
        self.spec_version = spec_version;
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn major(version: &str) -> Option<u64> {
        version.split('.').next()?.parse().ok()
    }

    /// True when `version` shares the major component of the current spec
    /// version.
    pub fn is_spec_version_compatible(&self, version: &str) -> bool {
        match (Self::major(&self.spec_version), Self::major(version)) {
            (Some(current), Some(new)) => new == current,
            _ => false,
        }
    }

    /// True when `version` is exactly one major ahead of the current spec
    /// version.
    pub fn is_spec_version_upgradable(&self, version: &str) -> bool {
        match (Self::major(&self.spec_version), Self::major(version)) {
            (Some(current), Some(new)) => new == current + 1,
            _ => false,
        }
    }

    /// The dialect of the current spec version.
    pub fn major_spec_version(&self) -> Result<SpecVersion, TrustError> {
        match Self::major(&self.spec_version) {
            Some(0) => Ok(SpecVersion::V06),
            Some(1) => Ok(SpecVersion::V1),
            _ => {
                error!("unsupported spec version: '{}'", self.spec_version);
                Err(TrustError::RoleMetadata(format!(
                    "unsupported spec version: '{}'",
                    self.spec_version
                )))
            }
        }
    }

    /// Read a role metadata file, enforcing the `VERSION.LABEL.TYPE.EXT`
    /// file name grammar. In update mode the leading version number must be
    /// exactly one above the current version; outside update mode the
    /// version comes from the signed body and only the shape is checked.
    pub(crate) fn read_file(&self, path: &Path, update: bool) -> Result<Value, TrustError> {
        if !path.is_file() {
            error!("file not found for '{}' update: {}", self.kind, path.display());
            return Err(TrustError::RoleFile(format!(
                "file not found: {}",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let Some((f_version, f_type, f_ext)) = parse_metadata_file_name(name) else {
            error!("invalid file name for '{}' metadata update: {name}", self.kind);
            return Err(TrustError::RoleFile(format!("invalid file name: '{name}'")));
        };

        if f_ext != self.file_ext() {
            error!(
                "'{}' metadata file should have '{}' extension, not: '{f_ext}'",
                self.kind, self.ext
            );
            return Err(TrustError::RoleFile(format!("wrong extension: '{f_ext}'")));
        }
        if f_type != self.kind() {
            error!(
                "'{}' metadata file should have '{}' type, not: '{f_type}'",
                self.kind, self.kind
            );
            return Err(TrustError::RoleFile(format!("wrong type: '{f_type}'")));
        }

        if update {
            let expected = self.version + 1;
            let candidate: u64 = f_version.parse().map_err(|_| {
                error!("invalid version in file name for '{}' metadata update: {f_version}", self.kind);
                TrustError::RoleFile(format!("invalid version in file name: '{f_version}'"))
            })?;
            if candidate != expected {
                error!(
                    "'{}' metadata file name should start with N+1 version ({expected}), but starts with: {candidate}",
                    self.kind
                );
                return Err(TrustError::RoleFile(format!(
                    "file name version should be {expected}, not {candidate}"
                )));
            }
        }

        let file = File::open(path)
            .map_err(|err| TrustError::RoleFile(format!("{}: {err}", path.display())))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|err| {
            error!("invalid JSON in '{}' metadata file: {err}", self.kind);
            TrustError::RoleMetadata(err.to_string())
        })
    }
}

/// Split a metadata file name of the form `VERSION.LABEL.TYPE.EXT`, where
/// `VERSION` is a decimal number with a non-zero leading digit and the
/// other components are word characters. Returns `(version, type, ext)`.
fn parse_metadata_file_name(name: &str) -> Option<(&str, &str, &str)> {
    let mut parts = name.split('.');
    let (version, label, kind, ext) = (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = version.as_bytes();
    let nonzero_number =
        matches!(bytes.first().copied(), Some(b'1'..=b'9')) && bytes.iter().all(|b| b.is_ascii_digit());
    if !nonzero_number || !is_word(label) || !is_word(kind) || !is_word(ext) {
        return None;
    }
    Some((version, kind, ext))
}

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Serialise the `signed` sub-object exactly as it is signed and verified.
pub(crate) fn signed_bytes(j: &Value) -> Result<String, TrustError> {
    let signed = j
        .get("signed")
        .ok_or_else(|| TrustError::RoleMetadata("missing 'signed' object".to_string()))?;
    serde_json::to_string(signed).map_err(|err| TrustError::RoleMetadata(err.to_string()))
}

/// Count valid signatures against a keyring, stopping as soon as the
/// threshold is reached. Signatures from key IDs unknown to the keyring,
/// and invalid signatures from known keys, are skipped with a warning; they
/// never fail the check on their own.
pub(crate) fn check_signatures(
    signed_data: &str,
    signatures: &BTreeSet<RoleSignature>,
    keyring: &RoleFullKeys,
) -> Result<(), TrustError> {
    let mut valid: u64 = 0;

    for signature in signatures {
        match keyring.keys.get(&signature.keyid) {
            Some(key) => {
                if crypto::verify_hex(signed_data.as_bytes(), &key.keyval, &signature.sig)? {
                    valid += 1;
                } else {
                    warn!(
                        "invalid signature of 'root' metadata for keyid: {}",
                        signature.keyid
                    );
                }
            }
            None => warn!("invalid keyid: {}", signature.keyid),
        }
        if valid >= keyring.threshold {
            break;
        }
    }

    if valid < keyring.threshold {
        error!(
            "threshold of valid signatures defined in 'root' metadata is not met ({valid}/{})",
            keyring.threshold
        );
        return Err(TrustError::ThresholdNotMet {
            valid,
            threshold: keyring.threshold,
        });
    }
    Ok(())
}
