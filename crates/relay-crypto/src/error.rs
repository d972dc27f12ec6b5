//! Error types for key derivation and per-record AEAD operations.

use thiserror::Error;

/// Errors from key derivation or AEAD seal/open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The supplied master key (base64) did not decode to the cipher's key
    /// length.
    #[error("invalid master key: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Bytes required by the cipher.
        expected: usize,
        /// Bytes actually supplied.
        actual: usize,
    },

    /// The base64-encoded master key failed to decode.
    #[error("master key is not valid base64")]
    InvalidKeyEncoding,

    /// AEAD seal or open failed (wrong key, tampered ciphertext, or reused
    /// nonce detected by the authentication tag).
    #[error("AEAD operation failed")]
    AeadFailure,

    /// A record's declared length had the reserved top two bits set, or was
    /// zero, or exceeded the 0x3FFF maximum payload.
    #[error("invalid record length")]
    InvalidRecordLength,
}
