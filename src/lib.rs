//! Client-side trust engine for signed package-repository metadata.
//!
//! The engine follows The Update Framework's rules for the `root` role: a
//! trusted root document lists the public keys and signature thresholds for
//! every role, and successive roots are only accepted when they are signed
//! by a threshold of keys from *both* the currently trusted root and the
//! candidate itself, with a version number exactly one higher than the
//! trusted one.
//!
//! Two incompatible metadata dialects are supported, v0.6 and v1, with a
//! one-way upgrade path from v0.6 to v1.
//!
//! ## Example
//!
//! ```ignore
//! use repo_trust::{SpecVersion, TrustStore};
//!
//! let mut store = TrustStore::new(
//!     "https://repo.example.org",
//!     "1.sv1.root.json".as_ref(),
//!     SpecVersion::V1,
//! )?;
//!
//! // Rotate to the next root published by the repository.
//! store.update_from_file("2.sv1.root.json".as_ref())?;
//! assert_eq!(store.root().version(), 2);
//! ```
//!
//! Fetching metadata from a remote is out of scope; callers hand the engine
//! files or already-downloaded JSON documents.

/// Ed25519 signing primitives.
pub mod crypto;
/// Error types.
pub mod error;
/// Streaming file hashing.
pub mod hash;
/// Binary to hexadecimal codec.
pub mod hex;
/// Role metadata model for both spec dialects.
pub mod role;
/// Trusted root storage and the rotation state machine.
pub mod store;

pub use error::TrustError;
pub use role::SpecVersion;
pub use store::{RootRole, TrustStore};
