//! Root metadata in the v1 dialect.
//!
//! The signed object carries a `keys` table and per-role `{keyids,
//! threshold}` entries; the envelope carries signatures as an array of
//! `{keyid, sig}` objects.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::TrustError;
use crate::role::{
    check_signatures, signed_bytes, Key, RoleBase, RoleFullKeys, RoleKeys, RoleSignature, RoleType,
};

pub(crate) const SPEC_VERSION: &str = "1.0.17";

const MANDATORY_ROLES: [&str; 4] = ["root", "snapshot", "targets", "timestamp"];

#[derive(Debug, Clone)]
pub struct RootRole {
    base: RoleBase,
    keys: BTreeMap<String, Key>,
    roles: BTreeMap<String, RoleKeys>,
}

#[derive(Deserialize)]
struct Signed {
    #[serde(rename = "_type")]
    kind: String,
    spec_version: String,
    version: u64,
    keys: BTreeMap<String, Key>,
    roles: BTreeMap<String, RoleKeys>,
}

impl RootRole {
    /// Parse root metadata and verify it against its own `root` keyring.
    pub fn load(j: &Value) -> Result<Self, TrustError> {
        let role = Self::parse(j)?;
        role.check_role_signatures(j)?;
        Ok(role)
    }

    /// Load a trusted root from disk.
    pub fn from_file(path: &Path) -> Result<Self, TrustError> {
        let base = RoleBase::new("root", SPEC_VERSION);
        let j = base.read_file(path, false)?;
        Self::load(&j)
    }

    fn parse(j: &Value) -> Result<Self, TrustError> {
        let signed = j
            .get("signed")
            .ok_or_else(|| TrustError::RoleMetadata("missing 'signed' object".to_string()))?;
        let signed: Signed = serde_json::from_value(signed.clone()).map_err(|err| {
            error!("invalid 'root' metadata: {err}");
            TrustError::RoleMetadata(err.to_string())
        })?;

        if signed.kind != "root" {
            error!(
                "wrong '_type' found in 'root' metadata, should be 'root': '{}'",
                signed.kind
            );
            return Err(TrustError::RoleMetadata(format!(
                "wrong '_type': '{}'",
                signed.kind
            )));
        }
        if !signed.spec_version.starts_with("1.") {
            error!(
                "incompatible 'spec_version' found in 'root' metadata, should be '1.x' but is: '{}'",
                signed.spec_version
            );
            return Err(TrustError::RoleMetadata(format!(
                "incompatible 'spec_version': '{}'",
                signed.spec_version
            )));
        }

        for name in signed.roles.keys() {
            if name.parse::<RoleType>().is_err() {
                error!("invalid role while loading 'root' metadata: '{name}'");
                return Err(TrustError::RoleMetadata(format!("invalid role: '{name}'")));
            }
        }

        let missing: Vec<&str> = MANDATORY_ROLES
            .iter()
            .filter(|name| !signed.roles.contains_key(**name))
            .copied()
            .collect();
        if !missing.is_empty() {
            error!(
                "missing roles while loading 'root' metadata: {}",
                missing.join(", ")
            );
            return Err(TrustError::RoleMetadata(format!(
                "missing roles: {}",
                missing.join(", ")
            )));
        }

        for (name, role_keys) in &signed.roles {
            if role_keys.keyids.is_empty() {
                error!("'root' metadata should declare at least one key ID in 'keyids' for role: '{name}'");
                return Err(TrustError::RoleMetadata(format!(
                    "empty 'keyids' for role: '{name}'"
                )));
            }
            if role_keys.threshold == 0 {
                error!("'root' metadata should declare at least a 'threshold' of 1 for role: '{name}'");
                return Err(TrustError::RoleMetadata(format!(
                    "'threshold' of 0 for role: '{name}'"
                )));
            }
            for keyid in &role_keys.keyids {
                if !signed.keys.contains_key(keyid) {
                    error!("a key ID is used in 'roles' but not declared in 'keys': '{keyid}'");
                    return Err(TrustError::RoleMetadata(format!(
                        "undeclared key ID: '{keyid}'"
                    )));
                }
            }
        }

        let mut base = RoleBase::new("root", SPEC_VERSION);
        base.set_spec_version(signed.spec_version);
        base.set_version(signed.version);
        Ok(Self {
            base,
            keys: signed.keys,
            roles: signed.roles,
        })
    }

    pub fn version(&self) -> u64 {
        self.base.version()
    }

    pub fn spec_version(&self) -> &str {
        self.base.spec_version()
    }

    pub(crate) fn base(&self) -> &RoleBase {
        &self.base
    }

    /// Names of the roles declared by this root.
    pub fn roles(&self) -> BTreeSet<String> {
        self.roles.keys().cloned().collect()
    }

    /// Materialise the full keyring of every declared role.
    pub fn keys(&self) -> BTreeMap<String, RoleFullKeys> {
        self.roles
            .iter()
            .map(|(name, role)| {
                let keys = role
                    .keyids
                    .iter()
                    .map(|keyid| (keyid.clone(), self.keys[keyid].clone()))
                    .collect();
                (
                    name.clone(),
                    RoleFullKeys {
                        keys,
                        threshold: role.threshold,
                    },
                )
            })
            .collect()
    }

    /// Signatures attached to the envelope, deduplicated by key ID.
    pub fn signatures(&self, j: &Value) -> Result<BTreeSet<RoleSignature>, TrustError> {
        let signatures = j
            .get("signatures")
            .ok_or_else(|| TrustError::RoleMetadata("missing 'signatures'".to_string()))?;
        let signatures: Vec<RoleSignature> = serde_json::from_value(signatures.clone())
            .map_err(|err| TrustError::RoleMetadata(err.to_string()))?;
        Ok(signatures.into_iter().collect())
    }

    /// Verify the envelope against this root's own `root` keyring.
    pub(crate) fn check_role_signatures(&self, j: &Value) -> Result<(), TrustError> {
        let signed_data = signed_bytes(j)?;
        let signatures = self.signatures(j)?;
        let keyring = self
            .keys()
            .remove("root")
            .expect("mandatory 'root' role is present");
        check_signatures(&signed_data, &signatures, &keyring)
    }

    /// Check whether the envelope declares a v1 spec version.
    pub fn is_spec_version_compatible(j: &Value) -> bool {
        match j.pointer("/signed/spec_version").and_then(Value::as_str) {
            Some(version) => version.starts_with("1."),
            None => {
                debug!("invalid 'root' metadata, impossible to check spec version compatibility");
                false
            }
        }
    }
}
