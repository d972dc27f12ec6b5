//! AEAD key schedule and per-record seal/open for the shadowsocks-style
//! transport.
//!
//! # Key Lifecycle
//!
//! ```text
//! Master Key (base64 or passphrase-stretched)
//!        │
//!        ▼
//! HKDF-SHA1(salt, master_key, "ss-subkey") → SubKey
//!        │
//!        ▼
//! Session (counter starts at 0, advances by 2 per record)
//!        │
//!        ▼
//! AEAD(len_cell, ctr) || AEAD(payload, ctr+1)
//! ```
//!
//! Each direction of a connection carries its own random salt and therefore
//! its own independent `Session`; a `Session` only ever seals or only ever
//! opens, never both.
//!
//! # Security
//!
//! - The salt is generated fresh per connection per direction and sent in
//!   the clear as the first bytes of the stream; reusing a salt with the
//!   same master key would reuse subkeys and break AEAD security.
//! - The record counter is strictly increasing and never wraps in practice;
//!   reordering or replaying a record will fail authentication because the
//!   counter is mixed into the nonce.
//! - `MasterKey` and `SubKey` zeroize their bytes on drop.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod key;
pub mod session;

pub use error::CryptoError;
pub use key::{MasterKey, SubKey};
pub use session::Session;
