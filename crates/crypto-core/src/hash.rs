//! Hash primitives used by key derivation and fingerprinting.

use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Calculate a SHA-1 hash
pub fn sha1(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    let result = hasher.finalize();

    let mut hash = [0u8; 20];
    hash.copy_from_slice(&result);
    hash
}

/// Calculate a SHA-256 hash
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_empty_input() {
        // FIPS 180-4 test vector for the empty message.
        let hash = sha256(b"");
        assert_eq!(
            hash[..4],
            [0xe3, 0xb0, 0xc4, 0x42],
            "unexpected SHA-256 of empty input"
        );
    }

    #[test]
    fn sha1_known_vector() {
        // FIPS 180-1 "abc" vector.
        let hash = sha1(b"abc");
        assert_eq!(hash[..4], [0xa9, 0x99, 0x3e, 0x36]);
    }
}
