//! Authenticated encryption using `XChaCha20-Poly1305`
//!
//! All functions are pure - the nonce must be provided by the caller.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};

use crate::error::CryptoError;

/// Root key size (32 bytes)
pub const KEY_SIZE: usize = 32;

/// `XChaCha20` nonce size (24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Encrypt `plaintext` under `key`, binding `aad`.
///
/// Returns ciphertext with the 16-byte tag appended.
///
/// # Security
///
/// The caller MUST never reuse a nonce with the same key. The 24-byte nonce is
/// large enough to be drawn at random per message.
pub fn seal(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
    aad: &[u8],
) -> Vec<u8> {
    let cipher = XChaCha20Poly1305::new(key.into());

    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(nonce), Payload { msg: plaintext, aad })
    else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    ciphertext
}

/// Decrypt and authenticate `ciphertext`.
///
/// # Errors
///
/// - `InvalidNonceLength`: nonce is not 24 bytes
/// - `DecryptionFailed`: tag mismatch (wrong key, wrong aad, or tampering)
pub fn open(
    key: &[u8; KEY_SIZE],
    nonce: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidNonceLength { expected: NONCE_SIZE, actual: nonce.len() });
    }

    let cipher = XChaCha20Poly1305::new(key.into());

    cipher.decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad }).map_err(|_| {
        CryptoError::DecryptionFailed { reason: "authentication failed".to_string() }
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const KEY: [u8; KEY_SIZE] = [7u8; KEY_SIZE];
    const NONCE: [u8; NONCE_SIZE] = [0xAB; NONCE_SIZE];

    #[test]
    fn seal_open_roundtrip() {
        let ciphertext = seal(&KEY, &NONCE, b"Hello, World!", b"");
        let plaintext = open(&KEY, &NONCE, &ciphertext, b"").unwrap();

        assert_eq!(plaintext, b"Hello, World!");
    }

    #[test]
    fn ciphertext_carries_tag() {
        let ciphertext = seal(&KEY, &NONCE, b"test message", b"");
        assert_eq!(ciphertext.len(), b"test message".len() + TAG_SIZE);
    }

    #[test]
    fn wrong_aad_fails() {
        let ciphertext = seal(&KEY, &NONCE, b"secret", b"context-a");
        let result = open(&KEY, &NONCE, &ciphertext, b"context-b");

        assert!(matches!(
            result,
            Err(CryptoError::DecryptionFailed { reason }) if reason.contains("authentication")
        ));
    }

    #[test]
    fn wrong_key_fails() {
        let ciphertext = seal(&KEY, &NONCE, b"secret", b"");
        assert!(open(&[8u8; KEY_SIZE], &NONCE, &ciphertext, b"").is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let mut ciphertext = seal(&KEY, &NONCE, b"original", b"");
        ciphertext[0] ^= 0xFF;
        assert!(open(&KEY, &NONCE, &ciphertext, b"").is_err());
    }

    #[test]
    fn short_nonce_is_rejected() {
        let ciphertext = seal(&KEY, &NONCE, b"x", b"");
        assert_eq!(
            open(&KEY, &NONCE[..12], &ciphertext, b""),
            Err(CryptoError::InvalidNonceLength { expected: 24, actual: 12 })
        );
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            plaintext in prop::collection::vec(any::<u8>(), 0..4096),
            aad in prop::collection::vec(any::<u8>(), 0..64),
        ) {
            let ciphertext = seal(&KEY, &NONCE, &plaintext, &aad);
            prop_assert_eq!(open(&KEY, &NONCE, &ciphertext, &aad).unwrap(), plaintext);
        }
    }
}
