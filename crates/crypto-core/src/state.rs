//! Resumable key-rotation state.
//!
//! A call emits this blob when it stops; the next call between the same
//! peers feeds it back in at construction. It carries the schedule salt and
//! the reconnection generation, which together keep rekeyed transports out
//! of previously used counter and IV space. Only this crate interprets the
//! bytes; everyone else treats the blob as opaque.

use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, Result};
use crate::kdf::KDF_VERSION;
use crate::random::secure_random_array;

/// Serialized layout: version (1) || generation (4, big-endian) || salt (32).
const ENCODED_LEN: usize = 1 + 4 + 32;

/// Key-rotation material carried from one call to the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedState {
    generation: u32,
    salt: [u8; 32],
}

impl DerivedState {
    /// Fresh state for a first call between two peers.
    pub fn initial() -> Self {
        Self {
            generation: 0,
            salt: secure_random_array(),
        }
    }

    /// Deserialize state emitted by a previous call.
    ///
    /// Empty input means no previous call and yields fresh initial state.
    /// Anything else must be exactly the versioned fixed layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::initial());
        }
        if bytes.len() != ENCODED_LEN {
            return Err(CryptoError::MalformedDerivedState(format!(
                "expected {} bytes, got {}",
                ENCODED_LEN,
                bytes.len()
            )));
        }
        if bytes[0] != KDF_VERSION {
            return Err(CryptoError::UnsupportedStateVersion(bytes[0]));
        }

        let mut generation_bytes = [0u8; 4];
        generation_bytes.copy_from_slice(&bytes[1..5]);
        let mut salt = [0u8; 32];
        salt.copy_from_slice(&bytes[5..]);

        Ok(Self {
            generation: u32::from_be_bytes(generation_bytes),
            salt,
        })
    }

    /// Serialize for hand-off to the next call.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENCODED_LEN);
        out.push(KDF_VERSION);
        out.extend_from_slice(&self.generation.to_be_bytes());
        out.extend_from_slice(&self.salt);
        out
    }

    /// State for the next transport generation after a reconnection rekey.
    pub fn next_generation(&self) -> Self {
        Self {
            generation: self.generation.wrapping_add(1),
            salt: self.salt,
        }
    }

    /// Current reconnection generation.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Schedule salt.
    pub fn salt(&self) -> &[u8; 32] {
        &self.salt
    }

    #[cfg(test)]
    pub(crate) fn for_tests(salt: [u8; 32], generation: u32) -> Self {
        Self { generation, salt }
    }
}
