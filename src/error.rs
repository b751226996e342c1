use thiserror::Error;

use crate::hex::HexError;

/// Errors surfaced by the trust engine. Every error aborts the operation
/// that raised it; the trusted root is never left in a partial state.
#[derive(Error, Debug)]
pub enum TrustError {
    #[error("signatures threshold not met ({valid}/{threshold}), aborting")]
    ThresholdNotMet { valid: u64, threshold: u64 },
    #[error("invalid role metadata: {0}")]
    RoleMetadata(String),
    #[error("possible rollback attack (candidate version {candidate}, trusted version {current})")]
    Rollback { candidate: u64, current: u64 },
    #[error("invalid role file: {0}")]
    RoleFile(String),
    #[error("unsupported metadata specification version, aborting")]
    SpecVersion,
    #[error("hex conversion failed: {0}")]
    HexConversion(#[from] HexError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
