//! Cryptographic primitives for peercall sessions.
//!
//! Two symmetric modes are used on the media path: AES-256 in IGE
//! (infinite garble extension) mode for the small number of control frames,
//! and AES-256 in counter mode for high-throughput media frames. Both draw
//! their keys from a directional key schedule derived once per transport
//! from the shared secret agreed during signaling. The crate also derives
//! the emoji fingerprint both participants compare to detect a substituted
//! secret, and owns the resumable key-rotation state carried between calls.

// Error handling
pub mod error;

// Hash primitives
pub mod hash;

// Directional key schedule
pub mod kdf;

// Control frame cipher (AES-256-IGE)
pub mod ige;

// Media frame cipher (AES-256-CTR)
pub mod ctr;

// Emoji key fingerprint
pub mod fingerprint;

// Secure randomness
pub mod random;

// Resumable key-rotation state
pub mod state;

// Public exports
pub use crate::ctr::{decrypt_media_frame, encrypt_media_frame, media_nonce, CounterLedger};
pub use error::{CryptoError, Result};
pub use fingerprint::{fingerprint, fingerprint_emojis, EMOJI_TABLE};
pub use ige::{decrypt_control_frame, encrypt_control_frame};
pub use kdf::{derive_keys, DirectionalKeys, SharedSecret, KDF_VERSION};
pub use random::{secure_random, secure_random_array};
pub use state::DerivedState;

/// AES-256 key material
pub type AesKey = [u8; 32];

/// IGE initialization vector (two chained 16-byte halves)
pub type IgeIv = [u8; 32];

/// Per-direction nonce prefix for media counter mode
pub type MediaNonce = [u8; 8];

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;
