//! Root metadata in the v0.6 dialect.
//!
//! The signed object carries bare hex public keys in per-role
//! `delegations`; each pubkey doubles as its own key ID. The envelope
//! carries signatures as a map from key ID to a `{signature}` object. The
//! dialect knows how to synthesise its v1 equivalent so that a v1 candidate
//! can be verified against a v0.6 trusted root during a spec upgrade.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::crypto;
use crate::error::TrustError;
use crate::hex;
use crate::role::{
    check_signatures, signed_bytes, v1, Key, RoleBase, RoleFullKeys, RoleKeys, RolePubKeys,
    RoleSignature,
};

pub(crate) const SPEC_VERSION: &str = "0.6.0";

const MANDATORY_DELEGATIONS: [&str; 2] = ["root", "key_mgr"];

#[derive(Debug, Clone)]
pub struct RootRole {
    base: RoleBase,
    delegations: BTreeMap<String, RolePubKeys>,
}

#[derive(Deserialize)]
struct Signed {
    #[serde(rename = "type")]
    kind: String,
    metadata_spec_version: String,
    version: u64,
    delegations: BTreeMap<String, RolePubKeys>,
}

#[derive(Deserialize)]
struct SignatureEntry {
    signature: String,
}

impl RootRole {
    /// Parse root metadata and verify it against its own `root` delegation.
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
                "wrong 'type' found in 'root' metadata, should be 'root': '{}'",
                signed.kind
            );
            return Err(TrustError::RoleMetadata(format!(
                "wrong 'type': '{}'",
                signed.kind
            )));
        }
        if !signed.metadata_spec_version.starts_with("0.6.") {
            error!(
                "incompatible 'metadata_spec_version' found in 'root' metadata, should be '0.6.x' but is: '{}'",
                signed.metadata_spec_version
            );
            return Err(TrustError::RoleMetadata(format!(
                "incompatible 'metadata_spec_version': '{}'",
                signed.metadata_spec_version
            )));
        }

        for (name, delegation) in &signed.delegations {
            if delegation.pubkeys.is_empty() {
                error!("'root' metadata should declare at least one public key in 'pubkeys' for delegation: '{name}'");
                return Err(TrustError::RoleMetadata(format!(
                    "empty 'pubkeys' for delegation: '{name}'"
                )));
            }
            if delegation.threshold == 0 {
                error!("'root' metadata should declare at least a 'threshold' of 1 for role: '{name}'");
                return Err(TrustError::RoleMetadata(format!(
                    "'threshold' of 0 for delegation: '{name}'"
                )));
            }
        }

        let current: BTreeSet<&str> = signed.delegations.keys().map(String::as_str).collect();
        let mandatory: BTreeSet<&str> = MANDATORY_DELEGATIONS.into_iter().collect();
        if current != mandatory {
            error!("invalid delegations in 'root' metadata");
            return Err(TrustError::RoleMetadata(
                "delegations must be exactly 'root' and 'key_mgr'".to_string(),
            ));
        }

        let mut base = RoleBase::new("root", SPEC_VERSION);
        base.set_spec_version(signed.metadata_spec_version);
        base.set_version(signed.version);
        Ok(Self {
            base,
            delegations: signed.delegations,
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

    /// Names of the delegations declared by this root.
    pub fn roles(&self) -> BTreeSet<String> {
        self.delegations.keys().cloned().collect()
    }

    /// Materialise the full keyring of every delegation, with each hex
    /// pubkey acting as its own key ID.
    pub fn keys(&self) -> BTreeMap<String, RoleFullKeys> {
        self.delegations
            .iter()
            .map(|(name, delegation)| {
                let keys = delegation
                    .pubkeys
                    .iter()
                    .map(|pubkey| (pubkey.clone(), Key::from_ed25519(pubkey.clone())))
                    .collect();
                (
                    name.clone(),
                    RoleFullKeys {
                        keys,
                        threshold: delegation.threshold,
                    },
                )
            })
            .collect()
    }

    /// Signatures attached to the envelope, lifted from the map form into
    /// the key ID ordered set.
    pub fn signatures(&self, j: &Value) -> Result<BTreeSet<RoleSignature>, TrustError> {
        let signatures = j
            .get("signatures")
            .ok_or_else(|| TrustError::RoleMetadata("missing 'signatures'".to_string()))?;
        let signatures: BTreeMap<String, SignatureEntry> =
            serde_json::from_value(signatures.clone())
                .map_err(|err| TrustError::RoleMetadata(err.to_string()))?;
        Ok(signatures
            .into_iter()
            .map(|(keyid, entry)| RoleSignature {
                keyid,
                sig: entry.signature,
            })
            .collect())
    }

    /// Verify the envelope against this root's own `root` delegation.
    pub(crate) fn check_role_signatures(&self, j: &Value) -> Result<(), TrustError> {
        let signed_data = signed_bytes(j)?;
        let signatures = self.signatures(j)?;
        let keyring = self
            .keys()
            .remove("root")
            .expect("mandatory 'root' delegation is present");
        check_signatures(&signed_data, &signatures, &keyring)
    }

    /// Materialise the v1-equivalent signed object used to cross the
    /// dialect boundary: the `root` delegation keeps its place, `key_mgr`
    /// becomes `targets`, and `snapshot`/`timestamp` are empty placeholders
    /// to be filled by a subsequent v1 update.
    pub fn upgraded_signable(&self) -> Value {
        let all_keys = self.keys();
        let mut keys: BTreeMap<String, Key> = BTreeMap::new();
        for name in MANDATORY_DELEGATIONS {
            keys.extend(all_keys[name].keys.clone());
        }
        let placeholder = RoleKeys {
            keyids: Vec::new(),
            threshold: 1,
        };
        json!({
            "_type": "root",
            "keys": keys,
            "roles": {
                "root": self.delegations["root"].to_role_keys(),
                "snapshot": placeholder,
                "targets": self.delegations["key_mgr"].to_role_keys(),
                "timestamp": placeholder,
            },
            "spec_version": v1::SPEC_VERSION,
            "version": self.base.version(),
        })
    }

    /// Sign the compact serialisation of `j` with a secret key whose hex
    /// public key acts as the key ID, bridging a v0.6 root into the v1
    /// signature form.
    pub fn upgraded_signature(
        &self,
        j: &Value,
        pk: &str,
        sk: &[u8; crypto::ED25519_KEY_BYTES],
    ) -> Result<RoleSignature, TrustError> {
        let data =
            serde_json::to_string(j).map_err(|err| TrustError::RoleMetadata(err.to_string()))?;
        let sig = crypto::sign(data.as_bytes(), sk);
        Ok(RoleSignature {
            keyid: pk.to_string(),
            sig: hex::bin2hex(&sig)?,
        })
    }

    /// Check whether the envelope declares a v0.6 spec version.
    pub fn is_spec_version_compatible(j: &Value) -> bool {
        match j
            .pointer("/signed/metadata_spec_version")
            .and_then(Value::as_str)
        {
            Some(version) => version.starts_with("0.6."),
            None => {
                debug!("invalid 'root' metadata, impossible to check spec version compatibility");
                false
            }
        }
    }
}
