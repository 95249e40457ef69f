//! Per-chunk XChaCha20-Poly1305 seal/open
//!
//! Sealed chunk format (binary):
//! ```text
//! [N+1+16 bytes: ciphertext + Poly1305 tag] of (marker byte || plaintext)
//! nonce = nonce_base (16 bytes) || chunk_index (8 bytes, big-endian)
//! AAD   = caller additional data || chunk_index (8 bytes, big-endian)
//! ```
//!
//! The chunk index lives in both the nonce and the AAD, so a chunk can only
//! ever open at the position it was sealed for; the marker byte is inside
//! the sealed message, so a final chunk cannot be replayed as non-final or
//! vice versa.

use chacha20poly1305::{
    aead::{Aead, Payload},
    XChaCha20Poly1305, XNonce,
};

use crate::{NONCE_BASE_SIZE, NONCE_SIZE, TAG_SIZE};

/// Whether a chunk is the last one of its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkMarker {
    Message,
    Final,
}

impl ChunkMarker {
    fn to_byte(self) -> u8 {
        match self {
            ChunkMarker::Message => 0x00,
            ChunkMarker::Final => 0x01,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(ChunkMarker::Message),
            0x01 => Some(ChunkMarker::Final),
            _ => None,
        }
    }
}

/// Raised for any chunk that does not authenticate: bad tag, wrong position,
/// wrong additional data, or a mangled marker byte. Deliberately carries no
/// detail about which of those it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAuthError;

/// Seal one chunk at `chunk_index`.
///
/// Returns `ciphertext + tag` covering `marker || plaintext`.
pub fn seal_chunk(
    cipher: &XChaCha20Poly1305,
    nonce_base: &[u8; NONCE_BASE_SIZE],
    chunk_index: u64,
    additional_data: &[u8],
    marker: ChunkMarker,
    plaintext: &[u8],
) -> anyhow::Result<Vec<u8>> {
    let nonce_bytes = build_nonce(nonce_base, chunk_index);
    let nonce = XNonce::from_slice(&nonce_bytes);
    let aad = build_aad(additional_data, chunk_index);

    let mut message = Vec::with_capacity(1 + plaintext.len());
    message.push(marker.to_byte());
    message.extend_from_slice(plaintext);

    cipher
        .encrypt(
            nonce,
            Payload {
                msg: &message,
                aad: &aad,
            },
        )
        .map_err(|e| anyhow::anyhow!("chunk encryption failed: {e}"))
}

/// Open one sealed chunk at `chunk_index`.
///
/// Returns the marker and the recovered plaintext, or [`ChunkAuthError`] if
/// the chunk does not authenticate at this position with this AAD.
pub fn open_chunk(
    cipher: &XChaCha20Poly1305,
    nonce_base: &[u8; NONCE_BASE_SIZE],
    chunk_index: u64,
    additional_data: &[u8],
    sealed: &[u8],
) -> Result<(ChunkMarker, Vec<u8>), ChunkAuthError> {
    // Shortest legitimate chunk: empty final plaintext, marker + tag only.
    if sealed.len() < 1 + TAG_SIZE {
        return Err(ChunkAuthError);
    }

    let nonce_bytes = build_nonce(nonce_base, chunk_index);
    let nonce = XNonce::from_slice(&nonce_bytes);
    let aad = build_aad(additional_data, chunk_index);

    let mut message = cipher
        .decrypt(
            nonce,
            Payload {
                msg: sealed,
                aad: &aad,
            },
        )
        .map_err(|_| ChunkAuthError)?;

    let marker = ChunkMarker::from_byte(message[0]).ok_or(ChunkAuthError)?;
    message.copy_within(1.., 0);
    message.truncate(message.len() - 1);
    Ok((marker, message))
}

/// Nonce: nonce_base (16 bytes) || chunk_index (8 bytes BE)
fn build_nonce(nonce_base: &[u8; NONCE_BASE_SIZE], chunk_index: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..NONCE_BASE_SIZE].copy_from_slice(nonce_base);
    nonce[NONCE_BASE_SIZE..].copy_from_slice(&chunk_index.to_be_bytes());
    nonce
}

/// AAD: caller additional data || chunk_index (8 bytes BE)
fn build_aad(additional_data: &[u8], chunk_index: u64) -> Vec<u8> {
    let mut aad = Vec::with_capacity(additional_data.len() + 8);
    aad.extend_from_slice(additional_data);
    aad.extend_from_slice(&chunk_index.to_be_bytes());
    aad
}

#[cfg(test)]
mod tests {
    use super::*;
    use chacha20poly1305::KeyInit;

    fn test_cipher() -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new((&[7u8; 32]).into())
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let cipher = test_cipher();
        let base = [0xAB; NONCE_BASE_SIZE];

        let sealed =
            seal_chunk(&cipher, &base, 3, b"meta", ChunkMarker::Message, b"hello chunk").unwrap();
        let (marker, plaintext) = open_chunk(&cipher, &base, 3, b"meta", &sealed).unwrap();

        assert_eq!(marker, ChunkMarker::Message);
        assert_eq!(plaintext, b"hello chunk");
    }

    #[test]
    fn test_final_marker_survives() {
        let cipher = test_cipher();
        let base = [0u8; NONCE_BASE_SIZE];

        let sealed = seal_chunk(&cipher, &base, 0, b"", ChunkMarker::Final, b"").unwrap();
        // marker byte + tag, nothing else
        assert_eq!(sealed.len(), 1 + TAG_SIZE);

        let (marker, plaintext) = open_chunk(&cipher, &base, 0, b"", &sealed).unwrap();
        assert_eq!(marker, ChunkMarker::Final);
        assert!(plaintext.is_empty());
    }

    #[test]
    fn test_open_wrong_index_fails() {
        let cipher = test_cipher();
        let base = [0u8; NONCE_BASE_SIZE];

        let sealed = seal_chunk(&cipher, &base, 0, b"", ChunkMarker::Message, b"data").unwrap();
        assert!(
            open_chunk(&cipher, &base, 1, b"", &sealed).is_err(),
            "chunk must not open at a different position"
        );
    }

    #[test]
    fn test_open_wrong_aad_fails() {
        let cipher = test_cipher();
        let base = [0u8; NONCE_BASE_SIZE];

        let sealed = seal_chunk(&cipher, &base, 0, b"aad-a", ChunkMarker::Message, b"data").unwrap();
        assert!(open_chunk(&cipher, &base, 0, b"aad-b", &sealed).is_err());
    }

    #[test]
    fn test_open_tampered_fails() {
        let cipher = test_cipher();
        let base = [0u8; NONCE_BASE_SIZE];

        let mut sealed =
            seal_chunk(&cipher, &base, 0, b"", ChunkMarker::Message, b"data").unwrap();
        sealed[0] ^= 0xFF;
        assert!(open_chunk(&cipher, &base, 0, b"", &sealed).is_err());
    }

    #[test]
    fn test_open_too_short_fails() {
        let cipher = test_cipher();
        let base = [0u8; NONCE_BASE_SIZE];

        assert!(open_chunk(&cipher, &base, 0, b"", &[]).is_err());
        assert!(open_chunk(&cipher, &base, 0, b"", &[0u8; TAG_SIZE]).is_err());
    }
}
