//! Packet sealing between the crypto layer and the transport.
//!
//! Every payload is sealed with a truncated SHA-1 trailer before
//! encryption, so the receive path can tell a correctly decrypted frame
//! from a tampered or desynchronized one. Control frames additionally
//! carry a length word and zero padding to reach the cipher's block
//! alignment.

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};

use peercall_crypto_core::hash::sha1;
use peercall_crypto_core::BLOCK_SIZE;

use crate::error::{Result, SessionError};

/// First byte of every datagram on an established transport.
pub const TAG_CONTROL: u8 = 0x01;
pub const TAG_MEDIA: u8 = 0x02;

/// Truncated integrity trailer length.
const TRAILER_LEN: usize = 8;

/// Seal a payload: `payload || sha1(payload)[..8]`.
pub fn seal(payload: &[u8]) -> Vec<u8> {
    let mut sealed = Vec::with_capacity(payload.len() + TRAILER_LEN);
    sealed.extend_from_slice(payload);
    sealed.extend_from_slice(&sha1(payload)[..TRAILER_LEN]);
    sealed
}

/// Verify and strip the integrity trailer.
pub fn open(sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < TRAILER_LEN {
        return Err(SessionError::malformed("sealed payload shorter than trailer"));
    }
    let (payload, trailer) = sealed.split_at(sealed.len() - TRAILER_LEN);
    if sha1(payload)[..TRAILER_LEN] != *trailer {
        return Err(SessionError::malformed("integrity trailer mismatch"));
    }
    Ok(payload.to_vec())
}

/// Seal a control payload and pad it to block alignment:
/// `len(u32) || payload || sha1-trailer || zero padding`.
pub fn seal_control(payload: &[u8]) -> Vec<u8> {
    let sealed_len = 4 + payload.len() + TRAILER_LEN;
    let padded_len = sealed_len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;

    let mut out = Vec::with_capacity(padded_len);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&sha1(payload)[..TRAILER_LEN]);
    out.resize(padded_len, 0);
    out
}

/// Verify and unwrap a decrypted control frame.
pub fn open_control(block: &[u8]) -> Result<Vec<u8>> {
    if block.len() < 4 + TRAILER_LEN {
        return Err(SessionError::malformed("control frame too short"));
    }
    let payload_len = BigEndian::read_u32(&block[..4]) as usize;
    let sealed_end = 4 + payload_len + TRAILER_LEN;
    if sealed_end > block.len() {
        return Err(SessionError::malformed("control frame length out of bounds"));
    }

    let payload = &block[4..4 + payload_len];
    let trailer = &block[4 + payload_len..sealed_end];
    if sha1(payload)[..TRAILER_LEN] != *trailer {
        return Err(SessionError::malformed("control integrity trailer mismatch"));
    }
    Ok(payload.to_vec())
}

/// A parsed datagram from the established transport.
///
/// Both kinds carry their frame counter in the clear; the receiver needs it
/// before it can decrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    /// IGE-encrypted control frame
    Control { counter: u32, ciphertext: Vec<u8> },
    /// CTR-encrypted media frame
    Media { counter: u32, ciphertext: Vec<u8> },
}

impl WireFrame {
    /// Encode for the wire
    pub fn encode(&self) -> Vec<u8> {
        let (tag, counter, ciphertext) = match self {
            Self::Control {
                counter,
                ciphertext,
            } => (TAG_CONTROL, counter, ciphertext),
            Self::Media {
                counter,
                ciphertext,
            } => (TAG_MEDIA, counter, ciphertext),
        };
        let mut buf = BytesMut::with_capacity(5 + ciphertext.len());
        buf.put_u8(tag);
        buf.put_u32(*counter);
        buf.put_slice(ciphertext);
        buf.to_vec()
    }

    /// Decode from the wire
    pub fn decode(data: &[u8]) -> Result<Self> {
        let tag = *data
            .first()
            .ok_or_else(|| SessionError::malformed("empty datagram"))?;
        if data.len() < 5 {
            return Err(SessionError::malformed("frame header truncated"));
        }
        let counter = BigEndian::read_u32(&data[1..5]);
        let ciphertext = data[5..].to_vec();
        match tag {
            TAG_CONTROL => Ok(Self::Control {
                counter,
                ciphertext,
            }),
            TAG_MEDIA => Ok(Self::Media {
                counter,
                ciphertext,
            }),
            tag => Err(SessionError::malformed(format!(
                "unknown frame tag {:#04x}",
                tag
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let payload = b"adaptation parameters";
        let sealed = seal(payload);
        assert_eq!(open(&sealed).unwrap(), payload);
    }

    #[test]
    fn open_rejects_tampering() {
        let mut sealed = seal(b"adaptation parameters");
        sealed[3] ^= 0x40;
        assert!(open(&sealed).is_err());
    }

    #[test]
    fn sealed_control_frames_are_block_aligned() {
        for len in [0usize, 1, 3, 4, 15, 16, 100] {
            let sealed = seal_control(&vec![0xcd; len]);
            assert_eq!(sealed.len() % BLOCK_SIZE, 0, "len {}", len);
            assert_eq!(open_control(&sealed).unwrap(), vec![0xcd; len]);
        }
    }

    #[test]
    fn open_control_rejects_bad_length_word() {
        let mut sealed = seal_control(b"hello");
        sealed[..4].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(open_control(&sealed).is_err());
    }

    #[test]
    fn wire_frame_round_trip() {
        let control = WireFrame::Control {
            counter: 3,
            ciphertext: vec![1, 2, 3],
        };
        assert_eq!(WireFrame::decode(&control.encode()).unwrap(), control);

        let media = WireFrame::Media {
            counter: 77,
            ciphertext: vec![9, 8, 7],
        };
        assert_eq!(WireFrame::decode(&media.encode()).unwrap(), media);
    }

    #[test]
    fn decode_rejects_noise() {
        assert!(WireFrame::decode(&[]).is_err());
        assert!(WireFrame::decode(&[0xff, 0x00, 0x00, 0x00, 0x00, 0x01]).is_err());
        assert!(WireFrame::decode(&[TAG_MEDIA, 0, 0]).is_err());
    }
}
