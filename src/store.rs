//! Trusted root storage and the rotation state machine.
//!
//! A candidate root is only accepted when its signatures meet the threshold
//! of *both* the currently trusted root and the candidate itself, and its
//! version is exactly one above the trusted version. The two checks defeat
//! arbitrary software attacks, the version rule defeats rollbacks.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde_json::Value;
use tracing::{debug, error};

use crate::error::TrustError;
use crate::role::{check_signatures, signed_bytes, v06, v1};
use crate::role::{RoleBase, RoleFullKeys, RoleSignature, SpecVersion};

/// Root metadata in either dialect. The dialect set is closed, so every
/// operation dispatches with a match.
#[derive(Debug, Clone)]
pub enum RootRole {
    V1(v1::RootRole),
    V06(v06::RootRole),
}

impl RootRole {
    /// Load a trusted root from disk in the requested dialect.
    pub fn from_file(path: &Path, spec_version: SpecVersion) -> Result<Self, TrustError> {
        match spec_version {
            SpecVersion::V06 => v06::RootRole::from_file(path).map(RootRole::V06),
            SpecVersion::V1 => v1::RootRole::from_file(path).map(RootRole::V1),
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            RootRole::V1(role) => role.version(),
            RootRole::V06(role) => role.version(),
        }
    }

    pub fn spec_version(&self) -> &str {
        match self {
            RootRole::V1(role) => role.spec_version(),
            RootRole::V06(role) => role.spec_version(),
        }
    }

    /// The dialect this root was parsed in.
    pub fn major_spec_version(&self) -> SpecVersion {
        match self {
            RootRole::V1(_) => SpecVersion::V1,
            RootRole::V06(_) => SpecVersion::V06,
        }
    }

    /// Names of the roles declared by this root.
    pub fn roles(&self) -> BTreeSet<String> {
        match self {
            RootRole::V1(role) => role.roles(),
            RootRole::V06(role) => role.roles(),
        }
    }

    /// Materialise the full keyring of every declared role.
    pub fn keys(&self) -> BTreeMap<String, RoleFullKeys> {
        match self {
            RootRole::V1(role) => role.keys(),
            RootRole::V06(role) => role.keys(),
        }
    }

    /// Signatures attached to `j`, read in this root's dialect.
    pub fn signatures(&self, j: &Value) -> Result<BTreeSet<RoleSignature>, TrustError> {
        match self {
            RootRole::V1(role) => role.signatures(j),
            RootRole::V06(role) => role.signatures(j),
        }
    }

    fn base(&self) -> &RoleBase {
        match self {
            RootRole::V1(role) => role.base(),
            RootRole::V06(role) => role.base(),
        }
    }

    /// Parse a candidate in the dialect it declares, restricted to this
    /// root's dialect or its immediate upgrade target. Parsing verifies the
    /// candidate against its own keyring.
    fn create_update(&self, j: &Value) -> Result<Self, TrustError> {
        match self {
            RootRole::V1(_) => {
                if v1::RootRole::is_spec_version_compatible(j) {
                    v1::RootRole::load(j).map(RootRole::V1)
                } else {
                    error!("invalid spec version for 'root' update");
                    Err(TrustError::SpecVersion)
                }
            }
            RootRole::V06(_) => {
                if v06::RootRole::is_spec_version_compatible(j) {
                    v06::RootRole::load(j).map(RootRole::V06)
                } else if v1::RootRole::is_spec_version_compatible(j) {
                    debug!("updating 'root' role spec version");
                    v1::RootRole::load(j).map(RootRole::V1)
                } else {
                    error!("invalid spec version for 'root' update");
                    Err(TrustError::SpecVersion)
                }
            }
        }
    }

    /// Validate a candidate and return it as the next trusted root.
    pub fn update(&self, j: &Value) -> Result<Self, TrustError> {
        // the candidate's own keyids and threshold are checked while parsing
        let candidate = self.create_update(j)?;

        // the currently trusted keyids and threshold must also sign off;
        // for a v0.6 root this keyring equals the `root` role of its
        // v1-equivalent synthesis, so a v1 candidate verifies against it
        let signed_data = signed_bytes(j)?;
        let signatures = candidate.signatures(j)?;
        let keyring = self
            .keys()
            .remove("root")
            .expect("mandatory 'root' role is present");
        check_signatures(&signed_data, &signatures, &keyring)?;

        // version number has to be exactly N+1
        if candidate.version() != self.version() + 1 {
            if candidate.version() > self.version() + 1 {
                error!("invalid 'root' metadata version, should be exactly N+1");
                return Err(TrustError::RoleMetadata(format!(
                    "'root' version should be exactly {}, not {}",
                    self.version() + 1,
                    candidate.version()
                )));
            }
            error!("possible rollback attack of 'root' metadata");
            return Err(TrustError::Rollback {
                candidate: candidate.version(),
                current: self.version(),
            });
        }

        Ok(candidate)
    }

    /// Validate a candidate read from a `N+1.LABEL.root.json` file.
    pub fn update_from_file(&self, path: &Path) -> Result<Self, TrustError> {
        let j = self.base().read_file(path, true)?;
        self.update(&j)
    }
}

/// The trust anchor of one repository: its base URL and the currently
/// trusted root metadata. The root is replaced atomically on a successful
/// update and never partially.
#[derive(Debug)]
pub struct TrustStore {
    base_url: String,
    current_root: RootRole,
}

impl TrustStore {
    /// Bootstrap trust from a local root file in the given dialect.
    pub fn new(
        base_url: impl Into<String>,
        local_trusted_root: &Path,
        spec_version: SpecVersion,
    ) -> Result<Self, TrustError> {
        Ok(Self {
            base_url: base_url.into(),
            current_root: RootRole::from_file(local_trusted_root, spec_version)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The currently trusted root.
    pub fn root(&self) -> &RootRole {
        &self.current_root
    }

    /// Advance the trusted root to a validated candidate.
    pub fn update(&mut self, j: &Value) -> Result<(), TrustError> {
        self.current_root = self.current_root.update(j)?;
        Ok(())
    }

    /// Advance the trusted root from a rotation file on disk.
    pub fn update_from_file(&mut self, path: &Path) -> Result<(), TrustError> {
        self.current_root = self.current_root.update_from_file(path)?;
        Ok(())
    }
}
