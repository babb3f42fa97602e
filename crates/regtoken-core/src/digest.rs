//! # Action Digests
//!
//! A pending multisig call is identified by the SHA-256 of its typed action
//! value, serialized with `serde_json`. Two calls with identical arguments
//! produce the same digest and therefore accumulate signatures on the same
//! pending entry; any argument difference starts a new entry.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RegtokenError;

/// SHA-256 digest of a serialized administrative action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionDigest([u8; 32]);

impl ActionDigest {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for ActionDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sha256:{}", self.to_hex())
    }
}

/// Digest an action. `scope` separates actions of different subsystems
/// (a registrar and an issuer never share pending entries).
pub fn action_digest<T: Serialize>(scope: &str, action: &T) -> Result<ActionDigest, RegtokenError> {
    let body = serde_json::to_vec(action)
        .map_err(|e| RegtokenError::invariant(format!("action serialization failed: {e}")))?;
    let mut hasher = Sha256::new();
    hasher.update(scope.as_bytes());
    hasher.update([0u8]);
    hasher.update(&body);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hasher.finalize());
    Ok(ActionDigest(bytes))
}
