//! AES-256 IGE mode for control frames.
//!
//! IGE (infinite garble extension) chains both the previous ciphertext and
//! the previous plaintext block into each block operation, so corruption of
//! any ciphertext block garbles everything after it. Control frames are few
//! and block-aligned by construction; this module refuses anything else.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;

use crate::error::{CryptoError, Result};
use crate::{AesKey, IgeIv, BLOCK_SIZE};

fn xor_block(out: &mut [u8; BLOCK_SIZE], other: &[u8]) {
    for (b, o) in out.iter_mut().zip(other) {
        *b ^= o;
    }
}

fn check_aligned(len: usize) -> Result<()> {
    if len == 0 || len % BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidFrameLength {
            len,
            block: BLOCK_SIZE,
        });
    }
    Ok(())
}

/// Encrypt a block-aligned control frame with AES-256-IGE.
///
/// The 32-byte IV carries the two chaining seeds: the first half stands in
/// for the ciphertext block before the frame, the second half for the
/// plaintext block before it.
pub fn encrypt_control_frame(plaintext: &[u8], key: &AesKey, iv: &IgeIv) -> Result<Vec<u8>> {
    check_aligned(plaintext.len())?;
    let cipher = Aes256::new(key.into());

    let mut c_prev = [0u8; BLOCK_SIZE];
    c_prev.copy_from_slice(&iv[..BLOCK_SIZE]);
    let mut p_prev = [0u8; BLOCK_SIZE];
    p_prev.copy_from_slice(&iv[BLOCK_SIZE..]);

    let mut out = Vec::with_capacity(plaintext.len());
    for chunk in plaintext.chunks_exact(BLOCK_SIZE) {
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(chunk);
        xor_block(&mut block, &c_prev);
        cipher.encrypt_block((&mut block).into());
        xor_block(&mut block, &p_prev);

        out.extend_from_slice(&block);
        c_prev = block;
        p_prev.copy_from_slice(chunk);
    }
    Ok(out)
}

/// Decrypt a block-aligned control frame with AES-256-IGE.
pub fn decrypt_control_frame(ciphertext: &[u8], key: &AesKey, iv: &IgeIv) -> Result<Vec<u8>> {
    check_aligned(ciphertext.len())?;
    let cipher = Aes256::new(key.into());

    let mut c_prev = [0u8; BLOCK_SIZE];
    c_prev.copy_from_slice(&iv[..BLOCK_SIZE]);
    let mut p_prev = [0u8; BLOCK_SIZE];
    p_prev.copy_from_slice(&iv[BLOCK_SIZE..]);

    let mut out = Vec::with_capacity(ciphertext.len());
    for chunk in ciphertext.chunks_exact(BLOCK_SIZE) {
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(chunk);
        xor_block(&mut block, &p_prev);
        cipher.decrypt_block((&mut block).into());
        xor_block(&mut block, &c_prev);

        out.extend_from_slice(&block);
        c_prev.copy_from_slice(chunk);
        p_prev = block;
    }
    Ok(out)
}
