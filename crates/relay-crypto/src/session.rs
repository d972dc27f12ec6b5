//! Per-direction AEAD session: key schedule (the subkey is supplied already
//! derived) plus the monotonic record counter and the two-sealing-per-record
//! primitive used by the shadowsocks-style wire format.
//!
//! A `Session` only knows how to seal/open one (length-cell, payload) record
//! at a time; framing (splitting a stream into records, buffering partial
//! ciphertext, the 0x3FFF payload cap) lives in `relay-core`'s AEAD chunk
//! codec, which is the only caller that needs to see raw bytes off the wire.

use aes_gcm::{
    AesGcm, Key as AesKey,
    aead::{Nonce as AesNonce, generic_array::GenericArray},
};
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, XChaCha20Poly1305, aead::Aead};
use relay_proto::CipherKind;

use crate::{error::CryptoError, key::SubKey};

type Aes128Gcm = aes_gcm::Aes128Gcm;
type Aes192Gcm = AesGcm<aes::Aes192, aes_gcm::aead::consts::U12>;
type Aes256Gcm = aes_gcm::Aes256Gcm;

enum AeadImpl {
    Aes128Gcm(Box<Aes128Gcm>),
    Aes192Gcm(Box<Aes192Gcm>),
    Aes256Gcm(Box<Aes256Gcm>),
    Chacha20Poly1305(Box<ChaCha20Poly1305>),
    XChacha20Poly1305(Box<XChaCha20Poly1305>),
}

impl AeadImpl {
    fn new(kind: CipherKind, key_bytes: &[u8]) -> Self {
        match kind {
            CipherKind::Aes128Gcm => {
                let key: &AesKey<Aes128Gcm> = GenericArray::from_slice(key_bytes);
                Self::Aes128Gcm(Box::new(Aes128Gcm::new(key)))
            },
            CipherKind::Aes192Gcm => {
                let key: &AesKey<Aes192Gcm> = GenericArray::from_slice(key_bytes);
                Self::Aes192Gcm(Box::new(Aes192Gcm::new(key)))
            },
            CipherKind::Aes256Gcm => {
                let key: &AesKey<Aes256Gcm> = GenericArray::from_slice(key_bytes);
                Self::Aes256Gcm(Box::new(Aes256Gcm::new(key)))
            },
            CipherKind::Chacha20Poly1305 => {
                let key = GenericArray::from_slice(key_bytes);
                Self::Chacha20Poly1305(Box::new(ChaCha20Poly1305::new(key)))
            },
            CipherKind::XChacha20Poly1305 => {
                let key = GenericArray::from_slice(key_bytes);
                Self::XChacha20Poly1305(Box::new(XChaCha20Poly1305::new(key)))
            },
        }
    }

    fn seal(&self, nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            Self::Aes128Gcm(c) => c.encrypt(AesNonce::<Aes128Gcm>::from_slice(nonce), plaintext),
            Self::Aes192Gcm(c) => c.encrypt(AesNonce::<Aes192Gcm>::from_slice(nonce), plaintext),
            Self::Aes256Gcm(c) => c.encrypt(AesNonce::<Aes256Gcm>::from_slice(nonce), plaintext),
            Self::Chacha20Poly1305(c) => c.encrypt(GenericArray::from_slice(nonce), plaintext),
            Self::XChacha20Poly1305(c) => c.encrypt(GenericArray::from_slice(nonce), plaintext),
        }
        .map_err(|_| CryptoError::AeadFailure)
    }

    fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            Self::Aes128Gcm(c) => c.decrypt(AesNonce::<Aes128Gcm>::from_slice(nonce), ciphertext),
            Self::Aes192Gcm(c) => c.decrypt(AesNonce::<Aes192Gcm>::from_slice(nonce), ciphertext),
            Self::Aes256Gcm(c) => c.decrypt(AesNonce::<Aes256Gcm>::from_slice(nonce), ciphertext),
            Self::Chacha20Poly1305(c) => c.decrypt(GenericArray::from_slice(nonce), ciphertext),
            Self::XChacha20Poly1305(c) => c.decrypt(GenericArray::from_slice(nonce), ciphertext),
        }
        .map_err(|_| CryptoError::AeadFailure)
    }
}

/// A live AEAD session bound to one subkey, in one direction.
///
/// The counter starts at 0 and advances by exactly 2 per successfully
/// completed record.
pub struct Session {
    kind: CipherKind,
    cipher: AeadImpl,
    counter: u64,
}

impl Session {
    /// Start a new session from a derived subkey.
    pub fn new(kind: CipherKind, subkey: &SubKey) -> Self {
        Self { kind, cipher: AeadImpl::new(kind, subkey.as_bytes()), counter: 0 }
    }

    /// Current counter value (bytes sealed/opened so far is `counter / 2`
    /// records).
    pub fn counter(&self) -> u64 {
        self.counter
    }

    fn nonce_for(&self, counter: u64) -> Vec<u8> {
        let mut nonce = vec![0u8; self.kind.nonce_len()];
        nonce[..8].copy_from_slice(&counter.to_le_bytes());
        nonce
    }

    /// Seal one record: `AEAD(len_cell, ctr) || AEAD(payload, ctr+1)`.
    /// Advances the counter by 2 on success.
    pub fn seal_record(&mut self, len_cell: [u8; 2], payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce_len = self.nonce_for(self.counter);
        let sealed_len = self.cipher.seal(&nonce_len, &len_cell)?;
        let nonce_payload = self.nonce_for(self.counter + 1);
        let mut sealed_payload = self.cipher.seal(&nonce_payload, payload)?;

        let mut out = sealed_len;
        out.append(&mut sealed_payload);
        self.counter += 2;
        Ok(out)
    }

    /// Open the length cell at the current counter value without mutating
    /// state. Safe to call repeatedly while waiting for more ciphertext:
    /// since nothing is mutated, there is nothing to roll back.
    pub fn peek_open_length(&self, ciphertext: &[u8]) -> Result<[u8; 2], CryptoError> {
        let nonce = self.nonce_for(self.counter);
        let plain = self.cipher.open(&nonce, ciphertext)?;
        plain.try_into().map_err(|_| CryptoError::InvalidRecordLength)
    }

    /// Open the payload at `counter+1` and advance the counter by 2. Must
    /// only be called after a successful `peek_open_length` for the same
    /// record.
    pub fn open_payload(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = self.nonce_for(self.counter + 1);
        let plain = self.cipher.open(&nonce, ciphertext)?;
        self.counter += 2;
        Ok(plain)
    }

    /// Authentication tag length for this session's cipher.
    pub fn tag_len(&self) -> usize {
        self.kind.tag_len()
    }
}
