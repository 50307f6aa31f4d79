//! Cryptographically secure randomness.

use rand::rngs::OsRng;
use rand::RngCore;

/// Generate `n` cryptographically secure random bytes.
///
/// Used for handshake nonces and any session-local randomness.
pub fn secure_random(n: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; n];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generate a fixed-size array of cryptographically secure random bytes.
pub fn secure_random_array<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}
