//! Streaming file hashing for repository payloads.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use md5::Md5;
use sha2::{Digest, Sha256};

use crate::error::TrustError;
use crate::hex;

const BUF_SIZE: usize = 32 * 1024;

fn hash_file<D: Digest>(path: &Path) -> Result<String, TrustError> {
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let count = file.read(&mut buf)?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }
    Ok(hex::bin2hex(hasher.finalize().as_slice())?)
}

/// SHA-256 digest of the file at `path`, as 64 lowercase hex characters.
pub fn sha256sum(path: impl AsRef<Path>) -> Result<String, TrustError> {
    hash_file::<Sha256>(path.as_ref())
}

/// MD5 digest of the file at `path`, as 32 lowercase hex characters.
pub fn md5sum(path: impl AsRef<Path>) -> Result<String, TrustError> {
    hash_file::<Md5>(path.as_ref())
}

/// Check a file against an expected SHA-256 hex digest.
pub fn sha256(path: impl AsRef<Path>, validation: &str) -> Result<bool, TrustError> {
    Ok(sha256sum(path)? == validation)
}

/// Check a file against an expected MD5 hex digest.
pub fn md5(path: impl AsRef<Path>, validation: &str) -> Result<bool, TrustError> {
    Ok(md5sum(path)? == validation)
}

/// Check a file against an expected size in bytes.
pub fn file_size(path: impl AsRef<Path>, validation: u64) -> bool {
    fs::metadata(path).map(|m| m.len() == validation).unwrap_or(false)
}
