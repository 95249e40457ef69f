//! Streaming encrypt/decrypt over abstract byte sources and sinks
//!
//! Plaintext is processed in [`PAGE_SIZE`] pages; peak memory stays a small
//! constant multiple of the page size no matter how large the payload is.
//! The page that observes end-of-input is sealed with the final marker, so
//! an input that is an exact multiple of the page size (including an empty
//! input) ends with its last page marked final and no empty trailer chunk.
//!
//! A decrypted stream is only `Success` once a final-marked chunk has been
//! authenticated and the source is exhausted. A source that ends earlier was
//! truncated, and truncation is reported exactly like tampering.

use std::io::{ErrorKind, Read, Write};

use chacha20poly1305::{KeyInit, XChaCha20Poly1305};
use rand::RngCore;
use secrecy::SecretString;
use tracing::debug;

use crate::chunk::{open_chunk, seal_chunk, ChunkMarker};
use crate::kdf::{derive_stream_key, KdfParams};
use crate::{NONCE_BASE_SIZE, PAGE_SIZE, SALT_SIZE, TAG_SIZE};

const STREAM_MAGIC: u8 = 0xC7;
const STREAM_VERSION: u8 = 0x01;
const STREAM_HEADER_LEN: usize = 2 + SALT_SIZE + NONCE_BASE_SIZE;

/// Sealed size of a full page: marker + plaintext + tag.
const CHUNK_MAX: usize = 1 + PAGE_SIZE + TAG_SIZE;

/// Everything needed to key and authenticate one stream.
///
/// Borrowed for the duration of a single encrypt or decrypt call and never
/// stored; the derived key is zeroized before the call returns.
#[derive(Debug)]
pub struct AuthenticationContext<'a> {
    /// User passphrase fed to the KDF
    pub passphrase: &'a SecretString,
    /// KDF salt; must be exactly [`SALT_SIZE`] bytes
    pub salt: Vec<u8>,
    /// Non-secret caller metadata bound into every chunk's authentication
    pub additional_data: Vec<u8>,
    /// KDF cost parameters
    pub kdf: KdfParams,
}

impl<'a> AuthenticationContext<'a> {
    pub fn new(passphrase: &'a SecretString, salt: Vec<u8>, additional_data: Vec<u8>) -> Self {
        Self {
            passphrase,
            salt,
            additional_data,
            kdf: KdfParams::default(),
        }
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }
}

/// Outcome of [`decrypt`]. Exactly one variant per call.
///
/// Every cryptographic mismatch collapses into [`AuthenticationFailure`]
/// with no further detail: a caller (or attacker) cannot tell a wrong
/// passphrase from a wrong salt, wrong additional data, tampering, or
/// truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptionResult {
    Success,
    AuthenticationFailure,
    /// Non-cryptographic fault: I/O error, unrecognized stream framing,
    /// or a KDF-level failure. Diagnostic only.
    Unknown(String),
}

/// Encrypt `source` into `sink` under the given context.
///
/// Writes the stream header (version, salt copy, nonce base) followed by the
/// sealed chunks in order. I/O failures are plain errors to the caller; they
/// are never encoded as a result variant. On error the sink may hold a
/// partial stream, but never one ending in a final-marked chunk.
pub fn encrypt(
    source: &mut impl Read,
    sink: &mut impl Write,
    auth: &AuthenticationContext<'_>,
) -> anyhow::Result<()> {
    let key = derive_stream_key(auth.passphrase, &auth.salt, &auth.kdf)?;
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_base = [0u8; NONCE_BASE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_base);

    sink.write_all(&[STREAM_MAGIC, STREAM_VERSION])?;
    sink.write_all(&auth.salt)?;
    sink.write_all(&nonce_base)?;

    let mut page = [0u8; PAGE_SIZE];
    let mut next = [0u8; PAGE_SIZE];
    let mut page_len = read_fill(source, &mut page)?;
    let mut index: u64 = 0;

    loop {
        // One page of lookahead: the page that observes end-of-input is the
        // final chunk, so an exact multiple of PAGE_SIZE gets no trailer.
        let next_len = if page_len == PAGE_SIZE {
            read_fill(source, &mut next)?
        } else {
            0
        };
        let is_final = page_len < PAGE_SIZE || next_len == 0;
        let marker = if is_final {
            ChunkMarker::Final
        } else {
            ChunkMarker::Message
        };

        let sealed = seal_chunk(
            &cipher,
            &nonce_base,
            index,
            &auth.additional_data,
            marker,
            &page[..page_len],
        )?;
        sink.write_all(&sealed)?;

        if is_final {
            break;
        }
        std::mem::swap(&mut page, &mut next);
        page_len = next_len;
        index += 1;
    }

    sink.flush()?;
    debug!(chunks = index + 1, "encrypted stream complete");
    Ok(())
}

/// Decrypt `source` into `sink` under the given context.
///
/// `Success` iff every chunk authenticated in order, a final-marked chunk
/// was consumed, and nothing followed it. Bytes from a chunk that failed
/// authentication are never written to the sink; on any failure the sink's
/// contents must be discarded by the caller.
pub fn decrypt(
    source: &mut impl Read,
    sink: &mut impl Write,
    auth: &AuthenticationContext<'_>,
) -> DecryptionResult {
    match decrypt_inner(source, sink, auth) {
        Ok(result) => result,
        Err(e) => DecryptionResult::Unknown(e.to_string()),
    }
}

fn decrypt_inner(
    source: &mut impl Read,
    sink: &mut impl Write,
    auth: &AuthenticationContext<'_>,
) -> anyhow::Result<DecryptionResult> {
    let mut header = [0u8; STREAM_HEADER_LEN];
    if read_fill(source, &mut header)? < STREAM_HEADER_LEN {
        // Truncated before the first chunk could exist.
        return Ok(DecryptionResult::AuthenticationFailure);
    }
    if header[0] != STREAM_MAGIC {
        anyhow::bail!("unrecognized encrypted stream format");
    }
    if header[1] != STREAM_VERSION {
        anyhow::bail!("unsupported encrypted stream version {}", header[1]);
    }
    if header[2..2 + SALT_SIZE] != auth.salt[..] {
        return Ok(DecryptionResult::AuthenticationFailure);
    }
    let mut nonce_base = [0u8; NONCE_BASE_SIZE];
    nonce_base.copy_from_slice(&header[2 + SALT_SIZE..]);

    let key = derive_stream_key(auth.passphrase, &auth.salt, &auth.kdf)?;
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    // Non-final chunks are exactly CHUNK_MAX bytes, so fixed-size reads stay
    // aligned with chunk boundaries and the last read yields the final chunk.
    let mut buf = vec![0u8; CHUNK_MAX];
    let mut index: u64 = 0;
    loop {
        let n = read_fill(source, &mut buf)?;
        if n == 0 {
            // Source ended without a final-marked chunk.
            return Ok(DecryptionResult::AuthenticationFailure);
        }
        let (marker, plaintext) = match open_chunk(
            &cipher,
            &nonce_base,
            index,
            &auth.additional_data,
            &buf[..n],
        ) {
            Ok(opened) => opened,
            Err(_) => return Ok(DecryptionResult::AuthenticationFailure),
        };

        if marker == ChunkMarker::Final {
            let mut probe = [0u8; 1];
            if source.read(&mut probe)? != 0 {
                // Data after the final chunk: the stream was extended.
                return Ok(DecryptionResult::AuthenticationFailure);
            }
            sink.write_all(&plaintext)?;
            sink.flush()?;
            debug!(chunks = index + 1, "decrypted stream complete");
            return Ok(DecryptionResult::Success);
        }
        sink.write_all(&plaintext)?;
        index += 1;
    }
}

/// Read until `buf` is full or the source is exhausted; returns bytes read.
fn read_fill(source: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
