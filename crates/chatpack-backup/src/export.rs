//! Export: wrap an already-archived conversation history into a backup file

use std::io::{Read, Write};

use chatpack_crypto::{encrypt, new_salt, AuthenticationContext, KdfParams, SALT_SIZE};
use secrecy::SecretString;
use tracing::debug;

use crate::envelope::{BackupHeader, IdentityHasher, QualifiedUserId};

/// Write a backup file: envelope first, then the payload.
///
/// With a passphrase, a fresh random salt goes into the envelope and the
/// archive bytes are fed through the encrypted stream with the envelope's
/// own raw bytes as additional authenticated data. Without one, the archive
/// is copied verbatim after the envelope and the salt field stays zeroed.
///
/// I/O and encryption faults are plain errors; export has no result taxonomy.
pub fn export_backup(
    archive: &mut impl Read,
    sink: &mut impl Write,
    creator: &QualifiedUserId,
    hasher: &impl IdentityHasher,
    passphrase: Option<&SecretString>,
    kdf: KdfParams,
) -> anyhow::Result<()> {
    let creator_hash = hasher.hash_identity(creator);

    match passphrase {
        Some(passphrase) => {
            let salt = new_salt();
            let header = BackupHeader::new(true, creator_hash, salt, kdf);
            let envelope = header.encode();
            sink.write_all(&envelope)?;

            let auth = AuthenticationContext::new(passphrase, salt.to_vec(), envelope)
                .with_kdf(header.kdf);
            encrypt(archive, sink, &auth)?;
            debug!("exported encrypted backup");
        }
        None => {
            let header = BackupHeader::new(false, creator_hash, [0u8; SALT_SIZE], kdf);
            sink.write_all(&header.encode())?;
            let copied = std::io::copy(archive, sink)?;
            sink.flush()?;
            debug!(payload_bytes = copied, "exported plain backup");
        }
    }
    Ok(())
}
