//! Emoji key fingerprint.
//!
//! Both participants derive a short glyph sequence from a hash of the
//! shared secret and compare it out of band. A man-in-the-middle who
//! substituted the secret during the outer exchange cannot produce the same
//! sequence. The mapping is order-sensitive and stable: the same hash and
//! glyph count always yield the same sequence.

use crate::error::{CryptoError, Result};

/// Bytes of digest consumed per glyph.
const BYTES_PER_GLYPH: usize = 8;

/// Fixed glyph table. The length is deliberately odd (9 * 11), so a change
/// to any single bit of a digest chunk moves that chunk's index.
pub const EMOJI_TABLE: [&str; 99] = [
    "😉", "😍", "😛", "😭", "😱", "😡", "😎", "😴", "😵", "😈", "😬",
    "😇", "😏", "👮", "👷", "💂", "👶", "👨", "👩", "👴", "👵", "😻",
    "😽", "🙀", "👺", "🙈", "🙉", "🙊", "💀", "👽", "💩", "🔥", "💥",
    "💤", "👂", "👀", "👃", "👅", "👄", "👍", "👎", "👌", "👊", "✌️",
    "✋", "👐", "👆", "🙏", "👏", "💪", "🚶", "🏃", "💃", "👫", "👪",
    "🐶", "🐱", "🐭", "🐹", "🐰", "🐺", "🐸", "🐯", "🐨", "🐻", "🐷",
    "🐮", "🐗", "🐴", "🐑", "🐘", "🐼", "🐧", "🐥", "🐔", "🐍", "🐢",
    "🐛", "🐝", "🐜", "🐞", "🐌", "🐙", "🐚", "🐟", "🐬", "🐋", "🐐",
    "🐊", "🐫", "🍀", "🌹", "🌻", "🍁", "🌾", "🍄", "🌵", "🌴", "🌲",
];

/// Map a secret-hash onto `glyph_count` indices into [`EMOJI_TABLE`].
///
/// Each glyph consumes eight digest bytes, interpreted big-endian and
/// reduced modulo the table size, so the digest must carry at least
/// `glyph_count * 8` bytes.
pub fn fingerprint(secret_hash: &[u8], glyph_count: usize) -> Result<Vec<usize>> {
    let needed = glyph_count * BYTES_PER_GLYPH;
    if secret_hash.len() < needed {
        return Err(CryptoError::InvalidDigestLength {
            len: secret_hash.len(),
            needed,
            glyphs: glyph_count,
        });
    }

    let indices = secret_hash
        .chunks_exact(BYTES_PER_GLYPH)
        .take(glyph_count)
        .map(|chunk| {
            let mut raw = [0u8; BYTES_PER_GLYPH];
            raw.copy_from_slice(chunk);
            (u64::from_be_bytes(raw) % EMOJI_TABLE.len() as u64) as usize
        })
        .collect();
    Ok(indices)
}

/// Convenience wrapper resolving indices to the glyphs themselves.
pub fn fingerprint_emojis(secret_hash: &[u8], glyph_count: usize) -> Result<Vec<&'static str>> {
    Ok(fingerprint(secret_hash, glyph_count)?
        .into_iter()
        .map(|i| EMOJI_TABLE[i])
        .collect())
}
