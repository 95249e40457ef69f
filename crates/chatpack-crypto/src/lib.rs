//! chatpack-crypto: password-authenticated streaming encryption for backup payloads
//!
//! Pipeline: passphrase + salt → Argon2id → stream key → per-page XChaCha20-Poly1305
//!
//! Stream layout (binary):
//! ```text
//! [1 byte: magic 0xC7][1 byte: stream version][16 bytes: salt][16 bytes: nonce base]
//! [chunk 0][chunk 1]...[final chunk]
//! ```
//!
//! Each chunk seals `marker byte || up to 4096 plaintext bytes`, so the
//! final/non-final marker is itself authenticated. Nonce = nonce base ||
//! chunk index (8 bytes, big-endian); AAD = caller data || chunk index.
//! Chunks only open in the order they were written.

pub mod chunk;
pub mod kdf;
pub mod stream;

pub use kdf::{derive_stream_key, new_salt, KdfParams, StreamKey};
pub use stream::{decrypt, encrypt, AuthenticationContext, DecryptionResult};

/// Size of a derived stream key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Required Argon2id salt length in bytes
pub const SALT_SIZE: usize = 16;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of the random per-stream nonce base; the remaining 8 nonce bytes
/// hold the chunk index
pub const NONCE_BASE_SIZE: usize = 16;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Plaintext bytes per chunk; peak memory for encrypt/decrypt is a small
/// constant multiple of this regardless of payload size
pub const PAGE_SIZE: usize = 4096;
