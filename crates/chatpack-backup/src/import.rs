//! Import: turn a raw byte source back into stored conversation entries
//!
//! A single sequential pass per call: parse envelope → passphrase gate →
//! decrypt → unzip → persist. Every stage short-circuits into one of the
//! [`BackupImportResult`] variants; there are no internal retries and no
//! state shared between calls.

use std::io::{Read, Write};

use chatpack_crypto::{decrypt, AuthenticationContext, DecryptionResult};
use secrecy::SecretString;
use tracing::{debug, warn};

use crate::envelope::BackupHeader;

/// The archive codec collaborator. The one boundary in the pipeline that
/// signals malformed input through an error instead of a typed result; the
/// importer catches it and converts it to
/// [`BackupImportResult::UnzippingError`].
pub trait ArchiveExtractor {
    type Entries;

    fn extract(&self, archive: &[u8]) -> anyhow::Result<Self::Entries>;
}

/// The persistence collaborator: receives the decoded entries of one backup.
pub trait EntrySink<E> {
    fn persist(&mut self, entries: E) -> anyhow::Result<()>;
}

impl<E, T: EntrySink<E> + ?Sized> EntrySink<E> for &mut T {
    fn persist(&mut self, entries: E) -> anyhow::Result<()> {
        (**self).persist(entries)
    }
}

/// Seam over the payload decryption, so the staged pipeline can be exercised
/// against a scripted decryptor. Production code uses [`StreamDecryptor`].
pub trait PayloadDecryptor {
    fn decrypt(
        &self,
        source: &mut dyn Read,
        sink: &mut dyn Write,
        auth: &AuthenticationContext<'_>,
    ) -> DecryptionResult;
}

/// Default decryptor: the chatpack-crypto encrypted stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamDecryptor;

impl PayloadDecryptor for StreamDecryptor {
    fn decrypt(
        &self,
        mut source: &mut dyn Read,
        mut sink: &mut dyn Write,
        auth: &AuthenticationContext<'_>,
    ) -> DecryptionResult {
        decrypt(&mut source, &mut sink, auth)
    }
}

/// Outcome of one [`BackupImporter::import_backup`] call.
///
/// Wrong and absent passphrases are deliberately indistinguishable: both
/// surface as [`MissingOrWrongPassphrase`], as does any other
/// authentication failure, so the result never reveals *why* decryption
/// was refused.
///
/// [`MissingOrWrongPassphrase`]: BackupImportResult::MissingOrWrongPassphrase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupImportResult {
    Success,
    /// The envelope was unparsable: unknown format, truncated, or an
    /// unsupported version. Retrying with the same file cannot succeed.
    ParsingFailure,
    MissingOrWrongPassphrase,
    /// Non-cryptographic fault during decryption or persistence
    UnknownError(String),
    /// The archive codec rejected the decrypted payload
    UnzippingError(String),
}

/// Staged backup importer. Owns its collaborators; each call is independent.
pub struct BackupImporter<X, S, D = StreamDecryptor> {
    extractor: X,
    sink: S,
    decryptor: D,
}

impl<X, S> BackupImporter<X, S> {
    pub fn new(extractor: X, sink: S) -> Self {
        Self {
            extractor,
            sink,
            decryptor: StreamDecryptor,
        }
    }
}

impl<X, S, D> BackupImporter<X, S, D> {
    pub fn with_decryptor<D2>(self, decryptor: D2) -> BackupImporter<X, S, D2> {
        BackupImporter {
            extractor: self.extractor,
            sink: self.sink,
            decryptor,
        }
    }
}

impl<X, S, D> BackupImporter<X, S, D>
where
    X: ArchiveExtractor,
    S: EntrySink<X::Entries>,
    D: PayloadDecryptor,
{
    /// Run the whole import pipeline over `source`.
    pub fn import_backup(
        &mut self,
        source: &mut impl Read,
        passphrase: Option<&SecretString>,
    ) -> BackupImportResult {
        // Stage 1: parse the unencrypted envelope.
        let (header, envelope) = match BackupHeader::read_from(source) {
            Ok(parsed) => parsed,
            Err(reason) => {
                warn!(%reason, "backup envelope rejected");
                return BackupImportResult::ParsingFailure;
            }
        };
        debug!(
            version = header.version,
            encrypted = header.is_encrypted,
            "backup envelope parsed"
        );

        // Stages 2 + 3: passphrase gate, then decryption. A passphrase
        // supplied for an unencrypted backup is ignored.
        let payload = if header.is_encrypted {
            let Some(passphrase) = passphrase else {
                debug!("encrypted backup but no passphrase supplied");
                return BackupImportResult::MissingOrWrongPassphrase;
            };
            let auth = AuthenticationContext::new(passphrase, header.salt.to_vec(), envelope)
                .with_kdf(header.kdf.clone());

            let mut decrypted = Vec::new();
            match self.decryptor.decrypt(source, &mut decrypted, &auth) {
                DecryptionResult::Success => decrypted,
                DecryptionResult::AuthenticationFailure => {
                    debug!("backup payload failed authentication");
                    return BackupImportResult::MissingOrWrongPassphrase;
                }
                DecryptionResult::Unknown(message) => {
                    warn!(detail = %message, "backup decryption hit a non-cryptographic fault");
                    return BackupImportResult::UnknownError(message);
                }
            }
        } else {
            let mut raw = Vec::new();
            if let Err(e) = source.read_to_end(&mut raw) {
                return BackupImportResult::UnknownError(e.to_string());
            }
            raw
        };
        debug!(payload_bytes = payload.len(), "backup payload ready");

        // Stage 4: archive extraction, the documented throwing boundary.
        let entries = match self.extractor.extract(&payload) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "archive extraction failed");
                return BackupImportResult::UnzippingError(e.to_string());
            }
        };

        // Stage 5: hand entries to persistence.
        if let Err(e) = self.sink.persist(entries) {
            warn!(error = %e, "persisting imported entries failed");
            return BackupImportResult::UnknownError(e.to_string());
        }

        debug!("backup import complete");
        BackupImportResult::Success
    }
}
