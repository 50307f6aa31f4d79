//! AES-256 counter mode for media frames.
//!
//! Media frames are high-rate and arbitrary-length, so they use a stream
//! construction: the 16-byte counter block is the direction's 8-byte nonce
//! prefix, the caller-managed frame counter (big-endian), and a 32-bit
//! intra-frame block index. The frame counter must never repeat for a given
//! key; each frame owns 2^32 keystream blocks, so distinct counters can
//! never collide.

use aes::Aes256;
use cipher::{KeyIvInit, StreamCipher};
use ::ctr::Ctr32BE;

use crate::{AesKey, IgeIv, MediaNonce};

type MediaCipher = Ctr32BE<Aes256>;

/// The per-direction nonce prefix for media frames, taken from the high
/// bytes of the direction's derived IV.
pub fn media_nonce(iv: &IgeIv) -> MediaNonce {
    let mut nonce = [0u8; 8];
    nonce.copy_from_slice(&iv[..8]);
    nonce
}

fn apply_keystream(buffer: &mut [u8], key: &AesKey, nonce: &MediaNonce, counter: u32) {
    let mut block = [0u8; 16];
    block[..8].copy_from_slice(nonce);
    block[8..12].copy_from_slice(&counter.to_be_bytes());
    // Low four bytes are the intra-frame block index, starting at zero.

    let mut cipher = MediaCipher::new(key.into(), (&block).into());
    cipher.apply_keystream(buffer);
}

/// Encrypt a media frame in place.
///
/// `counter` is caller-managed and must never repeat for `key`; reuse is a
/// programmer error enforced by [`CounterLedger`], not a runtime condition
/// this function can detect.
pub fn encrypt_media_frame(buffer: &mut [u8], key: &AesKey, nonce: &MediaNonce, counter: u32) {
    apply_keystream(buffer, key, nonce, counter);
}

/// Decrypt a media frame in place. Counter mode is symmetric.
pub fn decrypt_media_frame(buffer: &mut [u8], key: &AesKey, nonce: &MediaNonce, counter: u32) {
    apply_keystream(buffer, key, nonce, counter);
}

/// Strictly monotonic frame counter ledger.
///
/// The session claims every outbound counter through this ledger. Claiming
/// a counter at or below one already claimed means keystream reuse, which
/// is a defect in the caller, so the ledger panics instead of returning an
/// error.
#[derive(Debug, Default, Clone)]
pub struct CounterLedger {
    last: Option<u32>,
}

impl CounterLedger {
    /// Create a ledger with no counters claimed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `counter` for a frame.
    ///
    /// # Panics
    ///
    /// Panics if `counter` does not strictly exceed every previously
    /// claimed value.
    pub fn claim(&mut self, counter: u32) {
        if let Some(last) = self.last {
            assert!(
                counter > last,
                "media frame counter reuse: {} already covered by {}",
                counter,
                last
            );
        }
        self.last = Some(counter);
    }

    /// Claim and return the next free counter.
    pub fn next(&mut self) -> u32 {
        let next = self.last.map_or(0, |last| {
            last.checked_add(1)
                .expect("media frame counter space exhausted")
        });
        self.last = Some(next);
        next
    }

    /// Highest claimed counter, if any.
    pub fn last(&self) -> Option<u32> {
        self.last
    }
}
