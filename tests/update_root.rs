use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use repo_trust::{crypto, hex, SpecVersion, TrustError, TrustStore};

const BASE_URL: &str = "https://repo.example.org";

struct TestKey {
    sk: [u8; crypto::ED25519_KEY_BYTES],
    pk_hex: String,
}

fn gen_key() -> TestKey {
    let (pk, sk) = crypto::generate_keypair();
    TestKey {
        sk,
        pk_hex: hex::bin2hex(&pk).unwrap(),
    }
}

fn sign_v1(signed: Value, signers: &[&TestKey]) -> Value {
    let data = serde_json::to_string(&signed).unwrap();
    let signatures: Vec<Value> = signers
        .iter()
        .map(|key| {
            let sig = hex::bin2hex(&crypto::sign(data.as_bytes(), &key.sk)).unwrap();
            json!({"keyid": key.pk_hex, "sig": sig})
        })
        .collect();
    json!({"signed": signed, "signatures": signatures})
}

/// A v1 root where all four mandatory roles share the same keyring.
fn v1_root(version: u64, root_keys: &[&TestKey], threshold: u64, signers: &[&TestKey]) -> Value {
    let mut keys = serde_json::Map::new();
    let mut keyids = Vec::new();
    for key in root_keys {
        keys.insert(
            key.pk_hex.clone(),
            json!({"keytype": "ed25519", "scheme": "ed25519", "keyval": key.pk_hex}),
        );
        keyids.push(key.pk_hex.clone());
    }
    let role = json!({"keyids": keyids, "threshold": threshold});
    let signed = json!({
        "_type": "root",
        "spec_version": "1.0.17",
        "version": version,
        "keys": keys,
        "roles": {"root": role, "snapshot": role, "targets": role, "timestamp": role},
    });
    sign_v1(signed, signers)
}

fn v06_root(
    version: u64,
    root_keys: &[&TestKey],
    key_mgr_keys: &[&TestKey],
    threshold: u64,
    signers: &[&TestKey],
) -> Value {
    let pubkeys = |keys: &[&TestKey]| -> Vec<String> {
        keys.iter().map(|key| key.pk_hex.clone()).collect()
    };
    let signed = json!({
        "type": "root",
        "metadata_spec_version": "0.6.0",
        "version": version,
        "delegations": {
            "root": {"pubkeys": pubkeys(root_keys), "threshold": threshold},
            "key_mgr": {"pubkeys": pubkeys(key_mgr_keys), "threshold": threshold},
        },
    });
    let data = serde_json::to_string(&signed).unwrap();
    let mut signatures = serde_json::Map::new();
    for key in signers {
        let sig = hex::bin2hex(&crypto::sign(data.as_bytes(), &key.sk)).unwrap();
        signatures.insert(key.pk_hex.clone(), json!({"signature": sig}));
    }
    json!({"signed": signed, "signatures": signatures})
}

fn write_root(dir: &Path, name: &str, j: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_vec(j).unwrap()).unwrap();
    path
}

#[test]
fn bootstraps_a_v1_root() {
    let dir = tempfile::tempdir().unwrap();
    let key = gen_key();
    let path = write_root(dir.path(), "1.sv1.root.json", &v1_root(1, &[&key], 1, &[&key]));

    let store = TrustStore::new(BASE_URL, &path, SpecVersion::V1).unwrap();
    assert_eq!(store.root().version(), 1);
    assert_eq!(store.root().major_spec_version(), SpecVersion::V1);
    assert_eq!(store.base_url(), BASE_URL);
}

#[test]
fn rotates_to_the_next_version() {
    let dir = tempfile::tempdir().unwrap();
    let key = gen_key();
    let path = write_root(dir.path(), "1.sv1.root.json", &v1_root(1, &[&key], 1, &[&key]));
    let mut store = TrustStore::new(BASE_URL, &path, SpecVersion::V1).unwrap();

    let path = write_root(dir.path(), "2.sv1.root.json", &v1_root(2, &[&key], 1, &[&key]));
    store.update_from_file(&path).unwrap();
    assert_eq!(store.root().version(), 2);
}

#[test]
fn rejects_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let key = gen_key();
    let path = write_root(dir.path(), "1.sv1.root.json", &v1_root(1, &[&key], 1, &[&key]));
    let mut store = TrustStore::new(BASE_URL, &path, SpecVersion::V1).unwrap();
    store.update(&v1_root(2, &[&key], 1, &[&key])).unwrap();

    let err = store.update(&v1_root(2, &[&key], 1, &[&key]));
    assert!(matches!(
        err,
        Err(TrustError::Rollback {
            candidate: 2,
            current: 2
        })
    ));
    assert_eq!(store.root().version(), 2);
}

#[test]
fn rejects_version_skip() {
    let dir = tempfile::tempdir().unwrap();
    let key = gen_key();
    let path = write_root(dir.path(), "1.sv1.root.json", &v1_root(1, &[&key], 1, &[&key]));
    let mut store = TrustStore::new(BASE_URL, &path, SpecVersion::V1).unwrap();
    store.update(&v1_root(2, &[&key], 1, &[&key])).unwrap();

    let err = store.update(&v1_root(4, &[&key], 1, &[&key]));
    assert!(matches!(err, Err(TrustError::RoleMetadata(_))));
    assert_eq!(store.root().version(), 2);
}

#[test]
fn rejects_candidate_below_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let key_a = gen_key();
    let key_b = gen_key();
    let path = write_root(
        dir.path(),
        "1.sv1.root.json",
        &v1_root(1, &[&key_a, &key_b], 2, &[&key_a, &key_b]),
    );
    let mut store = TrustStore::new(BASE_URL, &path, SpecVersion::V1).unwrap();

    let err = store.update(&v1_root(2, &[&key_a, &key_b], 2, &[&key_a]));
    assert!(matches!(err, Err(TrustError::ThresholdNotMet { .. })));
    assert_eq!(store.root().version(), 1);
}

#[test]
fn accepts_candidate_at_exact_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let key_a = gen_key();
    let key_b = gen_key();
    let path = write_root(
        dir.path(),
        "1.sv1.root.json",
        &v1_root(1, &[&key_a, &key_b], 2, &[&key_a, &key_b]),
    );
    let mut store = TrustStore::new(BASE_URL, &path, SpecVersion::V1).unwrap();

    store
        .update(&v1_root(2, &[&key_a, &key_b], 2, &[&key_a, &key_b]))
        .unwrap();
    assert_eq!(store.root().version(), 2);
}

#[test]
fn ignores_signatures_from_unknown_keyids() {
    let dir = tempfile::tempdir().unwrap();
    let key = gen_key();
    let deprecated = gen_key();
    let path = write_root(dir.path(), "1.sv1.root.json", &v1_root(1, &[&key], 1, &[&key]));
    let mut store = TrustStore::new(BASE_URL, &path, SpecVersion::V1).unwrap();

    // a stray signature from a key absent from every keyring is skipped
    store
        .update(&v1_root(2, &[&key], 1, &[&deprecated, &key]))
        .unwrap();
    assert_eq!(store.root().version(), 2);
}

#[test]
fn rejects_candidate_not_signed_by_current_root() {
    let dir = tempfile::tempdir().unwrap();
    let old_key = gen_key();
    let new_key = gen_key();
    let path = write_root(
        dir.path(),
        "1.sv1.root.json",
        &v1_root(1, &[&old_key], 1, &[&old_key]),
    );
    let mut store = TrustStore::new(BASE_URL, &path, SpecVersion::V1).unwrap();

    // signed only by its own new key, never by the trusted root
    let err = store.update(&v1_root(2, &[&new_key], 1, &[&new_key]));
    assert!(matches!(err, Err(TrustError::ThresholdNotMet { .. })));
    assert_eq!(store.root().version(), 1);
}

#[test]
fn bootstraps_and_rotates_a_v06_root() {
    let dir = tempfile::tempdir().unwrap();
    let root_key = gen_key();
    let key_mgr_key = gen_key();
    let path = write_root(
        dir.path(),
        "1.sv0_6.root.json",
        &v06_root(1, &[&root_key], &[&key_mgr_key], 1, &[&root_key]),
    );
    let mut store = TrustStore::new(BASE_URL, &path, SpecVersion::V06).unwrap();
    assert_eq!(store.root().major_spec_version(), SpecVersion::V06);

    store
        .update(&v06_root(2, &[&root_key], &[&key_mgr_key], 1, &[&root_key]))
        .unwrap();
    assert_eq!(store.root().version(), 2);
    assert_eq!(store.root().major_spec_version(), SpecVersion::V06);
}

#[test]
fn upgrades_v06_to_v1() {
    let dir = tempfile::tempdir().unwrap();
    let root_key = gen_key();
    let key_mgr_key = gen_key();
    let path = write_root(
        dir.path(),
        "1.sv0_6.root.json",
        &v06_root(1, &[&root_key], &[&key_mgr_key], 1, &[&root_key]),
    );
    let mut store = TrustStore::new(BASE_URL, &path, SpecVersion::V06).unwrap();

    // the v1 candidate keeps the old root key, so its signature verifies
    // against the v1-equivalent form of the v0.6 root and against itself
    store.update(&v1_root(2, &[&root_key], 1, &[&root_key])).unwrap();
    assert_eq!(store.root().major_spec_version(), SpecVersion::V1);
    assert_eq!(store.root().version(), 2);
}

#[test]
fn rejects_dialect_downgrade() {
    let dir = tempfile::tempdir().unwrap();
    let key = gen_key();
    let path = write_root(dir.path(), "1.sv1.root.json", &v1_root(1, &[&key], 1, &[&key]));
    let mut store = TrustStore::new(BASE_URL, &path, SpecVersion::V1).unwrap();

    let err = store.update(&v06_root(2, &[&key], &[&key], 1, &[&key]));
    assert!(matches!(err, Err(TrustError::SpecVersion)));
    assert_eq!(store.root().major_spec_version(), SpecVersion::V1);
}

#[test]
fn rejects_bad_bootstrap_file_names() {
    let dir = tempfile::tempdir().unwrap();
    let key = gen_key();
    let root = v1_root(1, &[&key], 1, &[&key]);

    for name in ["0.sv1.root.json", "01.sv1.root.json", "1.sv1.root.txt", "root.json"] {
        let path = write_root(dir.path(), name, &root);
        let err = TrustStore::new(BASE_URL, &path, SpecVersion::V1);
        assert!(matches!(err, Err(TrustError::RoleFile(_))), "{name}");
    }
}

#[test]
fn rejects_update_files_with_wrong_version_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let key = gen_key();
    let path = write_root(dir.path(), "1.sv1.root.json", &v1_root(1, &[&key], 1, &[&key]));
    let mut store = TrustStore::new(BASE_URL, &path, SpecVersion::V1).unwrap();

    // the file name version must be N+1 even if the body says otherwise
    let path = write_root(dir.path(), "3.sv1.root.json", &v1_root(2, &[&key], 1, &[&key]));
    assert!(matches!(
        store.update_from_file(&path),
        Err(TrustError::RoleFile(_))
    ));

    let err = store.update_from_file(&dir.path().join("2.sv1.root.json"));
    assert!(matches!(err, Err(TrustError::RoleFile(_))), "missing file");
    assert_eq!(store.root().version(), 1);
}

#[test]
fn rejects_update_files_with_wrong_type() {
    let dir = tempfile::tempdir().unwrap();
    let key = gen_key();
    let path = write_root(dir.path(), "1.sv1.root.json", &v1_root(1, &[&key], 1, &[&key]));
    let mut store = TrustStore::new(BASE_URL, &path, SpecVersion::V1).unwrap();

    let path = write_root(dir.path(), "2.sv1.targets.json", &v1_root(2, &[&key], 1, &[&key]));
    assert!(matches!(
        store.update_from_file(&path),
        Err(TrustError::RoleFile(_))
    ));
}

#[test]
fn rejects_malformed_json_body() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("1.sv1.root.json");
    fs::write(&path, b"{not json").unwrap();
    let err = TrustStore::new(BASE_URL, &path, SpecVersion::V1);
    assert!(matches!(err, Err(TrustError::RoleMetadata(_))));
}
