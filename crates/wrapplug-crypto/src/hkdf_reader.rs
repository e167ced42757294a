//! Streaming HKDF-SHA256 output (RFC 5869)
//!
//! The `hkdf` crate expands into a caller-sized buffer in one call. Derived
//! key readers instead hand out a byte stream, so the expand step is driven
//! block by block here while the extract step is delegated to `hkdf`.

use std::{fmt, io};

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

type HmacSha256 = Hmac<Sha256>;

const HASH_LEN: usize = 32;

/// Maximum bytes HKDF-SHA256 can produce (255 blocks of 32 bytes).
pub const MAX_OUTPUT_LEN: usize = 255 * HASH_LEN;

/// HKDF-SHA256 expand output as an [`io::Read`].
///
/// Output is identical to `Hkdf::<Sha256>::new(salt, ikm).expand(info, ..)`
/// for any total length up to [`MAX_OUTPUT_LEN`], regardless of how reads are
/// chunked.
///
/// # Errors
///
/// A read that would cross [`MAX_OUTPUT_LEN`] fails with
/// `"hkdf: entropy limit reached"` and produces nothing.
pub struct HkdfReader {
    /// HMAC keyed with the pseudorandom key, cloned per block.
    prk: HmacSha256,
    info: Vec<u8>,
    counter: u8,
    block: [u8; HASH_LEN],
    /// Read position within `block`. `HASH_LEN` means exhausted.
    pos: usize,
    produced: usize,
}

impl HkdfReader {
    /// Run HKDF-Extract over `ikm` and prepare to stream the expand output.
    ///
    /// A missing salt is treated as 32 zero bytes, same as an empty one.
    pub fn new(ikm: &[u8], salt: Option<&[u8]>, info: &[u8]) -> Self {
        let (mut prk_bytes, _) = Hkdf::<Sha256>::extract(salt, ikm);

        let Ok(prk) = HmacSha256::new_from_slice(&prk_bytes) else {
            unreachable!("HMAC accepts keys of any length");
        };
        prk_bytes.as_mut_slice().zeroize();

        Self {
            prk,
            info: info.to_vec(),
            counter: 0,
            block: [0u8; HASH_LEN],
            pos: HASH_LEN,
            produced: 0,
        }
    }

    /// Bytes still available before the entropy limit.
    pub fn remaining(&self) -> usize {
        MAX_OUTPUT_LEN - self.produced
    }

    /// T(n) = HMAC(PRK, T(n-1) | info | n)
    fn next_block(&mut self) {
        debug_assert!(self.counter < u8::MAX);

        self.counter += 1;
        let mut mac = self.prk.clone();
        if self.counter > 1 {
            mac.update(&self.block);
        }
        mac.update(&self.info);
        mac.update(&[self.counter]);

        self.block.zeroize();
        self.block.copy_from_slice(&mac.finalize().into_bytes());
        self.pos = 0;
    }
}

impl io::Read for HkdfReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.len() > self.remaining() {
            return Err(io::Error::other("hkdf: entropy limit reached"));
        }

        let mut written = 0;
        while written < buf.len() {
            if self.pos == HASH_LEN {
                self.next_block();
            }

            let n = (HASH_LEN - self.pos).min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&self.block[self.pos..self.pos + n]);
            self.pos += n;
            written += n;
        }

        self.produced += written;
        Ok(written)
    }
}

impl Drop for HkdfReader {
    fn drop(&mut self) {
        self.block.zeroize();
        self.info.zeroize();
    }
}

impl fmt::Debug for HkdfReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HkdfReader").field("produced", &self.produced).finish_non_exhaustive()
    }
}
