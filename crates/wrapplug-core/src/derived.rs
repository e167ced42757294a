//! Derived key reader.
//!
//! Expands a wrapper's raw key material into a bounded HKDF-SHA256 stream.
//! Only local wrappers with known key shapes qualify; nothing here talks to
//! a remote backend.

use std::io::{Read, Take};

use wrapplug_crypto::HkdfReader;

use crate::{KeySource, Wrapper, WrapperError};

/// Smallest accepted length limit.
pub const MIN_DERIVED_LEN: u64 = 20;

const OP: &str = "reader.new_derived_reader";

/// Open a derived key stream over `wrapper`'s key material.
///
/// The stream yields exactly `length_limit` bytes and then EOF, up to HKDF's
/// ceiling of [`wrapplug_crypto::MAX_OUTPUT_LEN`] bytes; a limit above that
/// surfaces as an I/O error once the ceiling is crossed. Absent `salt` and
/// `info` are treated as empty.
///
/// # Errors
///
/// `InvalidParameter`, checked in this order:
/// - no wrapper
/// - `length_limit` below [`MIN_DERIVED_LEN`]
/// - a pooled wrapper whose base entry is not a direct or test wrapper
/// - an opaque wrapper (including RPC proxies)
/// - empty key material
pub fn derived_reader(
    wrapper: Option<&dyn Wrapper>,
    length_limit: u64,
    salt: Option<&[u8]>,
    info: Option<&[u8]>,
) -> Result<Take<HkdfReader>, WrapperError> {
    let Some(wrapper) = wrapper else {
        return Err(WrapperError::invalid_parameter(OP, "missing wrapper"));
    };
    if length_limit < MIN_DERIVED_LEN {
        return Err(WrapperError::invalid_parameter(
            OP,
            format!("length limit {length_limit} is below minimum {MIN_DERIVED_LEN}"),
        ));
    }

    let key = key_material(wrapper)?;
    if key.is_empty() {
        return Err(WrapperError::invalid_parameter(OP, "missing key material"));
    }

    tracing::trace!(length_limit, "opening derived key reader");

    Ok(HkdfReader::new(key, salt, info.unwrap_or_default()).take(length_limit))
}

fn key_material(wrapper: &dyn Wrapper) -> Result<&[u8], WrapperError> {
    match wrapper.key_source() {
        KeySource::Direct(key) | KeySource::Test(key) => Ok(key),
        KeySource::Pooled(pool) => match pool.base().key_source() {
            KeySource::Direct(key) | KeySource::Test(key) => Ok(key),
            other => Err(WrapperError::invalid_parameter(
                OP,
                format!("pooled base wrapper has unsupported shape {}", other.kind()),
            )),
        },
        KeySource::Opaque => Err(WrapperError::invalid_parameter(OP, "unknown wrapper type")),
    }
}
