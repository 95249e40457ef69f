//! chatpack-backup: the password-protected conversation backup container
//!
//! File layout:
//! ```text
//! [67 bytes: unencrypted envelope — magic, version, flags, salt, creator hash, KDF costs]
//! [payload: encrypted stream (chatpack-crypto) or the raw archive when unencrypted]
//! ```
//!
//! The envelope can be inspected ("peeked") before any passphrase is
//! supplied. When the payload is encrypted, the envelope bytes are bound
//! into every chunk's authentication as additional data, so an envelope
//! swapped onto a foreign payload fails decryption.
//!
//! The archive codec that turns the decrypted payload into entries and the
//! persistence layer that stores them are collaborators behind traits; see
//! [`import::ArchiveExtractor`] and [`import::EntrySink`].

pub mod envelope;
pub mod export;
pub mod import;

pub use envelope::{
    peek, BackupHeader, BackupPeekResult, Blake3IdentityHasher, HeaderDecodeError, IdentityHasher,
    QualifiedUserId,
};
pub use export::export_backup;
pub use import::{
    ArchiveExtractor, BackupImportResult, BackupImporter, EntrySink, PayloadDecryptor,
    StreamDecryptor,
};
