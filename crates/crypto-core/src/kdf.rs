//! Directional key schedule.
//!
//! Both peers hold the same shared secret after the outer key exchange.
//! The schedule derives complementary per-direction keys and IVs from it
//! without any further data crossing the wire: material is labeled by call
//! role (caller / callee) and each side maps the roles onto send / recv
//! according to `is_outgoing`. The reconnection generation from
//! [`DerivedState`] is mixed into the extraction step, so a rekey after a
//! transport migration never reuses counter or IV space.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{CryptoError, Result};
use crate::hash::sha256;
use crate::state::DerivedState;
use crate::{AesKey, IgeIv};

/// Version tag of the key schedule. Mixed into the extraction context so
/// that a future schedule change cannot collide with material derived here.
pub const KDF_VERSION: u8 = 1;

/// Extraction context, bound to [`KDF_VERSION`].
const KDF_CONTEXT: &[u8] = b"peercall-kdf-v1";

/// Expected shared secret length in bytes.
pub const SECRET_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// The shared secret produced by the outer key exchange, plus the side
/// marker that breaks the symmetry between the two peers.
#[derive(Clone)]
pub struct SharedSecret {
    key: [u8; SECRET_LEN],
    /// Whether this side initiated the call.
    pub is_outgoing: bool,
}

impl SharedSecret {
    /// Construct from raw key-exchange output. Fails on any length other
    /// than [`SECRET_LEN`].
    pub fn new(key: &[u8], is_outgoing: bool) -> Result<Self> {
        if key.len() != SECRET_LEN {
            return Err(CryptoError::InvalidKeyLength {
                len: key.len(),
                expected: SECRET_LEN,
            });
        }
        let mut bytes = [0u8; SECRET_LEN];
        bytes.copy_from_slice(key);
        Ok(Self {
            key: bytes,
            is_outgoing,
        })
    }

    /// SHA-256 digest of the secret, the input to fingerprint derivation.
    pub fn digest(&self) -> [u8; 32] {
        sha256(&self.key)
    }

    pub(crate) fn key_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.key
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material never appears in logs.
        f.debug_struct("SharedSecret")
            .field("is_outgoing", &self.is_outgoing)
            .finish_non_exhaustive()
    }
}

/// Per-direction sub-keys derived from a [`SharedSecret`].
#[derive(Clone)]
pub struct DirectionalKeys {
    /// Key for frames this side sends
    pub send_key: AesKey,
    /// IV for frames this side sends
    pub send_iv: IgeIv,
    /// Key for frames this side receives
    pub recv_key: AesKey,
    /// IV for frames this side receives
    pub recv_iv: IgeIv,
}

impl std::fmt::Debug for DirectionalKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectionalKeys").finish_non_exhaustive()
    }
}

fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(msg);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Derive the directional sub-keys for one transport generation.
///
/// Deterministic: identical `(secret, derived)` inputs always produce
/// identical output, and the caller material of one side equals the callee
/// material of the other, which is what lets both peers encrypt without
/// exchanging anything beyond the original secret.
pub fn derive_keys(secret: &SharedSecret, derived: &DerivedState) -> DirectionalKeys {
    let mut info = Vec::with_capacity(KDF_CONTEXT.len() + 32 + 4);
    info.extend_from_slice(KDF_CONTEXT);
    info.extend_from_slice(derived.salt());
    info.extend_from_slice(&derived.generation().to_be_bytes());
    let prk = hmac_sha256(secret.key_bytes(), &info);

    let caller_key = hmac_sha256(&prk, b"caller\x01");
    let caller_iv = hmac_sha256(&prk, b"caller\x02");
    let callee_key = hmac_sha256(&prk, b"callee\x01");
    let callee_iv = hmac_sha256(&prk, b"callee\x02");

    if secret.is_outgoing {
        DirectionalKeys {
            send_key: caller_key,
            send_iv: caller_iv,
            recv_key: callee_key,
            recv_iv: callee_iv,
        }
    } else {
        DirectionalKeys {
            send_key: callee_key,
            send_iv: callee_iv,
            recv_key: caller_key,
            recv_iv: caller_iv,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_secret(is_outgoing: bool) -> SharedSecret {
        let key: Vec<u8> = (0u8..32).collect();
        SharedSecret::new(&key, is_outgoing).unwrap()
    }

    fn test_state(generation: u32) -> DerivedState {
        DerivedState::for_tests([0x42; 32], generation)
    }

    #[test]
    fn rejects_short_secret() {
        let err = SharedSecret::new(&[0u8; 16], true).unwrap_err();
        assert_eq!(
            err,
            CryptoError::InvalidKeyLength {
                len: 16,
                expected: 32
            }
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_keys(&test_secret(true), &test_state(0));
        let b = derive_keys(&test_secret(true), &test_state(0));
        assert_eq!(a.send_key, b.send_key);
        assert_eq!(a.send_iv, b.send_iv);
        assert_eq!(a.recv_key, b.recv_key);
        assert_eq!(a.recv_iv, b.recv_iv);
    }

    #[test]
    fn golden_vector_v1() {
        // Pins schedule version 1: secret 00..1f, salt 42*32, generation 0.
        let keys = derive_keys(&test_secret(true), &test_state(0));
        assert_eq!(
            keys.send_key[..8],
            [0x8e, 0xd4, 0x66, 0x5f, 0xe1, 0x49, 0x50, 0xf2]
        );
        assert_eq!(
            keys.send_iv[..8],
            [0xf2, 0xfc, 0xa4, 0xcb, 0xca, 0xd8, 0x06, 0xac]
        );
        assert_eq!(
            keys.recv_key[..8],
            [0xd0, 0xd5, 0xa2, 0x55, 0x1a, 0xe2, 0x00, 0xbe]
        );
        assert_eq!(
            keys.recv_iv[..8],
            [0x5b, 0xb5, 0x22, 0x47, 0x09, 0x36, 0x0e, 0x57]
        );
    }

    #[test]
    fn directional_symmetry() {
        // The caller's send side is the callee's recv side and vice versa.
        let outgoing = derive_keys(&test_secret(true), &test_state(0));
        let incoming = derive_keys(&test_secret(false), &test_state(0));
        assert_eq!(outgoing.send_key, incoming.recv_key);
        assert_eq!(outgoing.send_iv, incoming.recv_iv);
        assert_eq!(outgoing.recv_key, incoming.send_key);
        assert_eq!(outgoing.recv_iv, incoming.send_iv);
    }

    #[test]
    fn generation_changes_all_material() {
        // A reconnection rekey must move the whole key space.
        let g0 = derive_keys(&test_secret(true), &test_state(0));
        let g1 = derive_keys(&test_secret(true), &test_state(1));
        assert_ne!(g0.send_key, g1.send_key);
        assert_ne!(g0.send_iv, g1.send_iv);
        assert_ne!(g0.recv_key, g1.recv_key);
        assert_eq!(
            g1.send_key[..8],
            [0x64, 0xdd, 0x8f, 0x59, 0x45, 0x05, 0x1b, 0x08]
        );
    }

    #[test]
    fn debug_output_hides_key_material() {
        let secret = test_secret(true);
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("00"));
        assert!(rendered.contains("is_outgoing"));
    }
}
