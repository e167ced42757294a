//! wrapplug Cryptographic Primitives
//!
//! Pure building blocks used by the reference wrappers and the derived key
//! reader. No I/O and no randomness: callers provide nonces, so every function
//! is deterministic and testable.
//!
//! # Components
//!
//! - [`HkdfReader`]: HKDF-SHA256 (RFC 5869) exposed as a streaming
//!   [`std::io::Read`] over the expand output
//! - [`seal`] / [`open`]: XChaCha20-Poly1305 with additional authenticated
//!   data
//! - [`hmac_sha256`]: keyed digest for the HMAC service
//!
//! # Security
//!
//! - HKDF output is bounded to 255 hash blocks (8160 bytes). Reading past that
//!   is an error, never repeated or fabricated output.
//! - Buffered HKDF output is zeroized on drop.
//! - AEAD authentication failure never returns partial plaintext.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod aead;
mod error;
mod hkdf_reader;
mod mac;

pub use aead::{KEY_SIZE, NONCE_SIZE, TAG_SIZE, open, seal};
pub use error::CryptoError;
pub use hkdf_reader::{HkdfReader, MAX_OUTPUT_LEN};
pub use mac::{HMAC_SIZE, hmac_sha256};
