//! Ed25519 signing primitives used to authenticate role metadata.
//!
//! Signatures are detached and use the pure scheme, no pre-hashing. The
//! functions here never canonicalise their input; callers are responsible
//! for passing the exact signed bytes.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;

use crate::error::TrustError;
use crate::hex;

/// Raw byte size of Ed25519 public and secret keys.
pub const ED25519_KEY_BYTES: usize = 32;
/// Hexadecimal length of Ed25519 public and secret keys.
pub const ED25519_KEY_HEX: usize = 2 * ED25519_KEY_BYTES;
/// Raw byte size of a detached Ed25519 signature.
pub const ED25519_SIG_BYTES: usize = 64;
/// Hexadecimal length of a detached Ed25519 signature.
pub const ED25519_SIG_HEX: usize = 2 * ED25519_SIG_BYTES;
/// Raw byte size of a SHA-256 digest.
pub const SHA256_BYTES: usize = 32;
/// Hexadecimal length of a SHA-256 digest.
pub const SHA256_HEX: usize = 2 * SHA256_BYTES;

/// Generate a fresh Ed25519 keypair, returned as `(public, secret)` raw
/// bytes. The engine does not retain the secret key.
pub fn generate_keypair() -> ([u8; ED25519_KEY_BYTES], [u8; ED25519_KEY_BYTES]) {
    let sk = SigningKey::generate(&mut OsRng);
    (sk.verifying_key().to_bytes(), sk.to_bytes())
}

/// Produce a detached signature over `data`.
pub fn sign(data: &[u8], sk: &[u8; ED25519_KEY_BYTES]) -> [u8; ED25519_SIG_BYTES] {
    SigningKey::from_bytes(sk).sign(data).to_bytes()
}

/// Verify a detached signature over `data`. A malformed public key fails
/// verification rather than erroring.
pub fn verify(data: &[u8], pk: &[u8; ED25519_KEY_BYTES], sig: &[u8; ED25519_SIG_BYTES]) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(pk) else {
        return false;
    };
    key.verify(data, &Signature::from_bytes(sig)).is_ok()
}

/// Verify a detached signature with hex-encoded key and signature material.
pub fn verify_hex(data: &[u8], pk: &str, signature: &str) -> Result<bool, TrustError> {
    let pk = decode_hex::<ED25519_KEY_BYTES>(pk)?;
    let signature = decode_hex::<ED25519_SIG_BYTES>(signature)?;
    Ok(verify(data, &pk, &signature))
}

/// Verify a signature over a pre-computed SHA-256 digest given in hex form.
/// This bridges GPG-signed hash messages into the Ed25519 verifier.
pub fn verify_gpg_hashed_msg(
    hex_digest: &str,
    pk: &[u8; ED25519_KEY_BYTES],
    sig: &[u8; ED25519_SIG_BYTES],
) -> Result<bool, TrustError> {
    let digest = decode_hex::<SHA256_BYTES>(hex_digest)?;
    Ok(verify(&digest, pk, sig))
}

/// [`verify_gpg_hashed_msg`] with hex-encoded key and signature material.
pub fn verify_gpg_hashed_msg_hex(
    hex_digest: &str,
    pk: &str,
    signature: &str,
) -> Result<bool, TrustError> {
    let pk = decode_hex::<ED25519_KEY_BYTES>(pk)?;
    let signature = decode_hex::<ED25519_SIG_BYTES>(signature)?;
    verify_gpg_hashed_msg(hex_digest, &pk, &signature)
}

fn decode_hex<const N: usize>(s: &str) -> Result<[u8; N], TrustError> {
    let mut out = [0u8; N];
    let written = hex::hex2bin(s, None, &mut out)?;
    if written != N {
        return Err(hex::HexError::InvalidInput.into());
    }
    Ok(out)
}
