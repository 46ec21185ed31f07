//! Hardware fingerprint acquisition.
//!
//! The protocol only ever sees an opaque, stable per-machine string; how it
//! is collected is deliberately kept behind the [`FingerprintProvider`]
//! trait so the activation flow can be tested with synthetic identifiers.

use sha2::{Digest, Sha256};

/// Fingerprint collection failures.
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("failed to read machine identity: {0}")]
    Io(#[from] std::io::Error),

    /// None of the known identity sources exist on this machine.
    #[error("no stable machine identifier available")]
    Unavailable,
}

/// Capability returning an opaque, stable per-machine identifier.
pub trait FingerprintProvider {
    fn fingerprint(&self) -> Result<String, FingerprintError>;
}

/// Default provider: hashes the host's machine id.
///
/// The raw identifier never leaves the machine - only its SHA-256 digest is
/// sent to the server, which keeps the fingerprint opaque while staying
/// stable across restarts.
pub struct MachineFingerprint;

/// Identity sources probed in order; the first non-empty one wins.
const MACHINE_ID_PATHS: &[&str] = &[
    "/etc/machine-id",
    "/var/lib/dbus/machine-id",
    "/sys/class/dmi/id/product_uuid",
];

impl FingerprintProvider for MachineFingerprint {
    fn fingerprint(&self) -> Result<String, FingerprintError> {
        let raw = read_machine_id()?;
        Ok(digest(&raw))
    }
}

fn read_machine_id() -> Result<String, FingerprintError> {
    for path in MACHINE_ID_PATHS {
        if let Ok(contents) = std::fs::read_to_string(path) {
            if !contents.trim().is_empty() {
                return Ok(contents);
            }
        }
    }

    Err(FingerprintError::Unavailable)
}

/// Digest a raw identity string into the wire form (64 lower-hex chars).
///
/// The OS name is mixed in so cloned identity files on a different platform
/// still produce a distinct fingerprint.
fn digest(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.trim().as_bytes());
    hasher.update(std::env::consts::OS.as_bytes());
    hex::encode(hasher.finalize())
}
