//! Master key material and per-session subkey derivation.
//!
//! The master key is either supplied directly (base64) or
//! stretched from a passphrase with an MD5-based KDF
//! (`MD5(previous_md5 || passphrase)`, concatenated until `key_len` bytes
//! are produced). The per-connection subkey is
//! `HKDF-SHA1(salt, master_key, "ss-subkey", key_len)`.

use base64::Engine;
use hkdf::Hkdf;
use md5::{Digest, Md5};
use relay_proto::CipherKind;
use sha1::Sha1;
use zeroize::Zeroize;

use crate::error::CryptoError;

const HKDF_INFO: &[u8] = b"ss-subkey";

/// Master key bytes, zeroized on drop.
#[derive(Clone)]
pub struct MasterKey {
    bytes: Vec<u8>,
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey").field("bytes", &"<redacted>").finish()
    }
}

impl MasterKey {
    /// Decode a base64-encoded master key, validating its length against
    /// `cipher`.
    pub fn from_base64(encoded: &str, cipher: CipherKind) -> Result<Self, CryptoError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::InvalidKeyEncoding)?;
        if bytes.len() != cipher.key_len() {
            return Err(CryptoError::InvalidKeyLength { expected: cipher.key_len(), actual: bytes.len() });
        }
        Ok(Self { bytes })
    }

    /// Stretch an arbitrary passphrase into `cipher.key_len()` bytes using
    /// the legacy shadowsocks MD5 KDF: concatenate
    /// `MD5(passphrase)`, `MD5(MD5(passphrase) || passphrase)`, ... until
    /// there are enough bytes, then truncate.
    pub fn from_passphrase(passphrase: &str, cipher: CipherKind) -> Self {
        let key_len = cipher.key_len();
        let mut out = Vec::with_capacity(key_len + Md5::output_size());
        let mut prev: Vec<u8> = Vec::new();
        while out.len() < key_len {
            let mut hasher = Md5::new();
            hasher.update(&prev);
            hasher.update(passphrase.as_bytes());
            let digest = hasher.finalize();
            out.extend_from_slice(&digest);
            prev = digest.to_vec();
        }
        out.truncate(key_len);
        Self { bytes: out }
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Derive the per-connection subkey for `salt` via
    /// `HKDF-SHA1(salt, self, "ss-subkey", key_len)`.
    pub fn derive_subkey(&self, salt: &[u8], key_len: usize) -> SubKey {
        let hk = Hkdf::<Sha1>::new(Some(salt), &self.bytes);
        let mut out = vec![0u8; key_len];
        // HKDF only fails when the requested length exceeds 255 * hash_len,
        // which no AEAD key size here approaches.
        #[allow(clippy::expect_used)]
        hk.expand(HKDF_INFO, &mut out).expect("invariant: key_len is far below HKDF-SHA1's output limit");
        SubKey { bytes: out }
    }
}

/// A derived per-connection subkey, zeroized on drop.
#[derive(Clone)]
pub struct SubKey {
    bytes: Vec<u8>,
}

impl SubKey {
    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl Drop for SubKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_master_key_roundtrip() {
        let raw = [7u8; 32];
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
        let key = MasterKey::from_base64(&encoded, CipherKind::Aes256Gcm).unwrap();
        assert_eq!(key.as_bytes(), &raw);
    }

    #[test]
    fn base64_master_key_wrong_length_rejected() {
        let raw = [7u8; 16];
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
        let err = MasterKey::from_base64(&encoded, CipherKind::Aes256Gcm).unwrap_err();
        assert_eq!(err, CryptoError::InvalidKeyLength { expected: 32, actual: 16 });
    }

    #[test]
    fn passphrase_kdf_is_deterministic_and_sized() {
        let a = MasterKey::from_passphrase("hunter2", CipherKind::Aes256Gcm);
        let b = MasterKey::from_passphrase("hunter2", CipherKind::Aes256Gcm);
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.as_bytes().len(), 32);
    }

    #[test]
    fn passphrase_kdf_differs_per_passphrase() {
        let a = MasterKey::from_passphrase("hunter2", CipherKind::Chacha20Poly1305);
        let b = MasterKey::from_passphrase("hunter3", CipherKind::Chacha20Poly1305);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn subkey_derivation_is_deterministic_per_salt() {
        let key = MasterKey::from_passphrase("hunter2", CipherKind::Aes256Gcm);
        let salt = [1u8; 32];
        let a = key.derive_subkey(&salt, 32);
        let b = key.derive_subkey(&salt, 32);
        assert_eq!(a.as_bytes(), b.as_bytes());

        let other_salt = [2u8; 32];
        let c = key.derive_subkey(&other_salt, 32);
        assert_ne!(a.as_bytes(), c.as_bytes());
    }
}
