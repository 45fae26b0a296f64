use std::fmt;

use sha2::{Digest, Sha256};

/// Hex characters kept when the identity is derived from the command text.
const DERIVED_LEN: usize = 16;

/// Stable string key naming one mutual-exclusion slot.
///
/// Either supplied by the user via `--id` or derived deterministically from
/// the command text. Must be filesystem-path-safe (no separators, no nul);
/// derived identities always are, explicit ones are the caller's contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunIdentity(String);

impl RunIdentity {
    /// Derive the identity from the exact command text: the first 16 hex
    /// characters of its SHA-256 digest.
    #[must_use]
    pub fn derive(command: &str) -> Self {
        let digest = Sha256::digest(command.as_bytes());
        let mut hex = String::with_capacity(DERIVED_LEN);
        for b in digest.iter().take(DERIVED_LEN / 2) {
            hex.push_str(&format!("{b:02x}"));
        }
        Self(hex)
    }

    /// Use a caller-supplied identity verbatim.
    #[must_use]
    pub fn explicit(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
