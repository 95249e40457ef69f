//! Unencrypted backup envelope: the parseable prefix of every backup file
//!
//! Envelope format (binary, 67 bytes):
//! ```text
//! [4 bytes: magic "CPAK"][2 bytes: version, BE][1 byte: flags (bit 0 = encrypted)]
//! [16 bytes: KDF salt][32 bytes: creator identity hash]
//! [4 bytes: KDF mem cost KiB, BE][4 bytes: KDF time cost, BE][4 bytes: KDF parallelism, BE]
//! ```
//!
//! Versioned independently of the payload encryption: bumping the stream
//! format does not bump the envelope version and vice versa.

use std::io::Read;

use chatpack_crypto::{KdfParams, SALT_SIZE};
use thiserror::Error;

const MAGIC: &[u8; 4] = b"CPAK";
const FLAG_ENCRYPTED: u8 = 0b0000_0001;

/// Envelope length in bytes.
pub const HEADER_LEN: usize = 4 + 2 + 1 + SALT_SIZE + 32 + 12;

/// Envelope schema version written by this build.
pub const FORMAT_VERSION: u16 = 1;

/// The identifier of the user a backup belongs to: id plus home domain.
/// Compared verbatim; no normalization or case folding anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedUserId {
    pub id: String,
    pub domain: String,
}

impl QualifiedUserId {
    pub fn new(id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
        }
    }
}

/// One-way hash of a [`QualifiedUserId`], used only for equality checks.
pub trait IdentityHasher {
    fn hash_identity(&self, user: &QualifiedUserId) -> [u8; 32];
}

/// Default identity hasher: BLAKE3 over length-prefixed id and domain, so
/// ("ab", "c") and ("a", "bc") can never collide.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3IdentityHasher;

impl IdentityHasher for Blake3IdentityHasher {
    fn hash_identity(&self, user: &QualifiedUserId) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(user.id.len() as u64).to_be_bytes());
        hasher.update(user.id.as_bytes());
        hasher.update(&(user.domain.len() as u64).to_be_bytes());
        hasher.update(user.domain.as_bytes());
        *hasher.finalize().as_bytes()
    }
}

/// Why an envelope failed to decode.
#[derive(Debug, Error)]
pub enum HeaderDecodeError {
    #[error("unknown backup format")]
    UnknownFormat,
    #[error("backup header is truncated")]
    Truncated,
    #[error("unsupported backup version {0}")]
    UnsupportedVersion(u16),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The unencrypted envelope of a backup file. Produced once at export time,
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupHeader {
    pub version: u16,
    pub is_encrypted: bool,
    /// Hash of the exporting user's qualified id; opaque, equality-only
    pub creator_hash: [u8; 32],
    /// KDF salt; all zeroes when the payload is unencrypted
    pub salt: [u8; SALT_SIZE],
    pub kdf: KdfParams,
}

impl BackupHeader {
    pub fn new(
        is_encrypted: bool,
        creator_hash: [u8; 32],
        salt: [u8; SALT_SIZE],
        kdf: KdfParams,
    ) -> Self {
        Self {
            version: FORMAT_VERSION,
            is_encrypted,
            creator_hash,
            salt,
            kdf,
        }
    }

    /// Serialize the envelope to its 67-byte binary form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.push(if self.is_encrypted { FLAG_ENCRYPTED } else { 0 });
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.creator_hash);
        out.extend_from_slice(&self.kdf.mem_cost_kib.to_be_bytes());
        out.extend_from_slice(&self.kdf.time_cost.to_be_bytes());
        out.extend_from_slice(&self.kdf.parallelism.to_be_bytes());
        out
    }

    /// Decode an envelope from exactly [`HEADER_LEN`] leading bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, HeaderDecodeError> {
        if bytes.len() >= 4 && bytes[..4] != MAGIC[..] {
            return Err(HeaderDecodeError::UnknownFormat);
        }
        if bytes.len() < HEADER_LEN {
            return Err(HeaderDecodeError::Truncated);
        }

        let version = u16::from_be_bytes([bytes[4], bytes[5]]);
        if version == 0 || version > FORMAT_VERSION {
            return Err(HeaderDecodeError::UnsupportedVersion(version));
        }
        let is_encrypted = bytes[6] & FLAG_ENCRYPTED != 0;

        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&bytes[7..7 + SALT_SIZE]);
        let mut creator_hash = [0u8; 32];
        creator_hash.copy_from_slice(&bytes[7 + SALT_SIZE..7 + SALT_SIZE + 32]);

        let costs = &bytes[7 + SALT_SIZE + 32..];
        let kdf = KdfParams {
            mem_cost_kib: u32::from_be_bytes([costs[0], costs[1], costs[2], costs[3]]),
            time_cost: u32::from_be_bytes([costs[4], costs[5], costs[6], costs[7]]),
            parallelism: u32::from_be_bytes([costs[8], costs[9], costs[10], costs[11]]),
        };

        Ok(Self {
            version,
            is_encrypted,
            creator_hash,
            salt,
            kdf,
        })
    }

    /// Read and decode the envelope from a source, returning the header and
    /// its raw bytes (the raw form doubles as the payload's additional
    /// authenticated data).
    pub fn read_from(source: &mut impl Read) -> Result<(Self, Vec<u8>), HeaderDecodeError> {
        let mut bytes = vec![0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = source.read(&mut bytes[filled..])?;
            if n == 0 {
                bytes.truncate(filled);
                break;
            }
            filled += n;
        }
        let header = Self::decode(&bytes)?;
        Ok((header, bytes))
    }

    /// Whether this backup was created by `candidate`. True only when both
    /// the id and the domain hash to the stored value exactly.
    pub fn is_created_by_same_user(
        &self,
        candidate: &QualifiedUserId,
        hasher: &impl IdentityHasher,
    ) -> bool {
        hasher.hash_identity(candidate) == self.creator_hash
    }
}

/// Outcome of [`peek`].
#[derive(Debug)]
pub enum BackupPeekResult {
    Success {
        version: u16,
        is_encrypted: bool,
        hash_data: [u8; 32],
    },
    Failure(HeaderDecodeError),
}

/// Inspect only the unencrypted envelope of a backup, without a passphrase
/// and without touching the payload.
pub fn peek(source: &mut impl Read) -> BackupPeekResult {
    match BackupHeader::read_from(source) {
        Ok((header, _)) => BackupPeekResult::Success {
            version: header.version,
            is_encrypted: header.is_encrypted,
            hash_data: header.creator_hash,
        },
        Err(reason) => BackupPeekResult::Failure(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_header(is_encrypted: bool) -> BackupHeader {
        BackupHeader::new(is_encrypted, [0xCD; 32], [0xEF; SALT_SIZE], KdfParams::default())
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        for encrypted in [false, true] {
            let header = sample_header(encrypted);
            let bytes = header.encode();
            assert_eq!(bytes.len(), HEADER_LEN);

            let decoded = BackupHeader::decode(&bytes).unwrap();
            assert_eq!(decoded, header);
        }
    }

    #[test]
    fn test_decode_unknown_format() {
        let mut bytes = sample_header(true).encode();
        bytes[..4].copy_from_slice(b"ZZZZ");
        assert!(matches!(
            BackupHeader::decode(&bytes),
            Err(HeaderDecodeError::UnknownFormat)
        ));
    }

    #[test]
    fn test_decode_truncated() {
        let bytes = sample_header(true).encode();
        assert!(matches!(
            BackupHeader::decode(&bytes[..HEADER_LEN - 1]),
            Err(HeaderDecodeError::Truncated)
        ));
        assert!(matches!(
            BackupHeader::decode(&[]),
            Err(HeaderDecodeError::Truncated)
        ));
    }

    #[test]
    fn test_decode_unsupported_version() {
        let mut bytes = sample_header(true).encode();
        bytes[4..6].copy_from_slice(&99u16.to_be_bytes());
        assert!(matches!(
            BackupHeader::decode(&bytes),
            Err(HeaderDecodeError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_peek_reports_envelope_fields() {
        let header = sample_header(true);
        let mut source = Cursor::new(header.encode());

        match peek(&mut source) {
            BackupPeekResult::Success {
                version,
                is_encrypted,
                hash_data,
            } => {
                assert_eq!(version, FORMAT_VERSION);
                assert!(is_encrypted);
                assert_eq!(hash_data, [0xCD; 32]);
            }
            BackupPeekResult::Failure(reason) => panic!("peek failed: {reason}"),
        }
    }

    #[test]
    fn test_peek_failure_on_garbage() {
        let mut source = Cursor::new(b"not a backup file at all".to_vec());
        assert!(matches!(peek(&mut source), BackupPeekResult::Failure(_)));
    }

    #[test]
    fn test_identity_check_requires_exact_match() {
        let hasher = Blake3IdentityHasher;
        let creator = QualifiedUserId::new("alice", "alpha.example.com");
        let header = BackupHeader::new(
            true,
            hasher.hash_identity(&creator),
            [0u8; SALT_SIZE],
            KdfParams::default(),
        );

        assert!(header.is_created_by_same_user(&creator, &hasher));
        // Same id, different domain.
        assert!(!header.is_created_by_same_user(
            &QualifiedUserId::new("alice", "beta.example.com"),
            &hasher
        ));
        // Same domain, different id.
        assert!(!header.is_created_by_same_user(
            &QualifiedUserId::new("bob", "alpha.example.com"),
            &hasher
        ));
        // No case folding.
        assert!(!header.is_created_by_same_user(
            &QualifiedUserId::new("Alice", "alpha.example.com"),
            &hasher
        ));
    }

    #[test]
    fn test_identity_hash_field_boundaries_do_not_alias() {
        let hasher = Blake3IdentityHasher;
        let a = hasher.hash_identity(&QualifiedUserId::new("ab", "c"));
        let b = hasher.hash_identity(&QualifiedUserId::new("a", "bc"));
        assert_ne!(a, b);
    }

    proptest::proptest! {
        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..=2 * HEADER_LEN)) {
            // Arbitrary prefixes must decode or fail cleanly, never panic.
            let _ = BackupHeader::decode(&bytes);
        }
    }
}
