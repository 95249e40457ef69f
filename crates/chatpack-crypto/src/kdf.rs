//! Key derivation: Argon2id passphrase → stream key

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::{KEY_SIZE, SALT_SIZE};

/// A 256-bit symmetric key derived from a passphrase via Argon2id.
///
/// Zeroized on drop so key material never outlives the call that derived it.
pub struct StreamKey {
    bytes: [u8; KEY_SIZE],
}

impl StreamKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for StreamKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Argon2id cost parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Derive a 256-bit stream key from a passphrase and salt using Argon2id.
///
/// The salt must be exactly [`SALT_SIZE`] bytes; it is not secret and is
/// stored alongside the encrypted data. Derivation is deterministic for a
/// fixed (passphrase, salt, params) triple.
pub fn derive_stream_key(
    passphrase: &SecretString,
    salt: &[u8],
    params: &KdfParams,
) -> anyhow::Result<StreamKey> {
    if salt.len() != SALT_SIZE {
        anyhow::bail!(
            "salt has wrong length: {} bytes (required {})",
            salt.len(),
            SALT_SIZE
        );
    }

    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| anyhow::anyhow!("invalid Argon2id params: {e}"))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(passphrase.expose_secret().as_bytes(), salt, &mut key)
        .map_err(|e| anyhow::anyhow!("Argon2id KDF failed: {e}"))?;

    Ok(StreamKey::from_bytes(key))
}

/// Generate a fresh random salt from the OS CSPRNG.
pub fn new_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use secrecy::SecretString;

    /// Fast params so tests don't pay the interactive 64 MiB cost.
    pub(crate) fn test_params() -> KdfParams {
        KdfParams {
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_kdf_deterministic() {
        let passphrase = SecretString::from("test-passphrase-123");
        let salt = [1u8; SALT_SIZE];

        let key1 = derive_stream_key(&passphrase, &salt, &test_params()).unwrap();
        let key2 = derive_stream_key(&passphrase, &salt, &test_params()).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes(), "KDF must be deterministic");
    }

    #[test]
    fn test_kdf_different_passphrases() {
        let salt = [1u8; SALT_SIZE];

        let key1 =
            derive_stream_key(&SecretString::from("passphrase-a"), &salt, &test_params()).unwrap();
        let key2 =
            derive_stream_key(&SecretString::from("passphrase-b"), &salt, &test_params()).unwrap();

        assert_ne!(
            key1.as_bytes(),
            key2.as_bytes(),
            "different passphrases must produce different keys"
        );
    }

    #[test]
    fn test_kdf_different_salts() {
        let passphrase = SecretString::from("same-passphrase");

        let key1 = derive_stream_key(&passphrase, &[1u8; SALT_SIZE], &test_params()).unwrap();
        let key2 = derive_stream_key(&passphrase, &[2u8; SALT_SIZE], &test_params()).unwrap();

        assert_ne!(
            key1.as_bytes(),
            key2.as_bytes(),
            "different salts must produce different keys"
        );
    }

    #[test]
    fn test_kdf_rejects_wrong_salt_length() {
        let passphrase = SecretString::from("whatever");

        assert!(derive_stream_key(&passphrase, &[0u8; 8], &test_params()).is_err());
        assert!(derive_stream_key(&passphrase, &[0u8; 32], &test_params()).is_err());
        assert!(derive_stream_key(&passphrase, &[], &test_params()).is_err());
    }

    #[test]
    fn test_new_salt_is_random() {
        let s1 = new_salt();
        let s2 = new_salt();
        assert_ne!(s1, s2, "salts must not repeat");
        assert_ne!(s1, [0u8; SALT_SIZE], "salt must not be zero");
    }
}
