//! Canonical cache/metric key derivation.
//!
//! Every cached response and every metric bucket is addressed by a key of
//! the form `bifrost:{provider}:{operation}:{hash}`. The hash is a SHA-256
//! digest over the raw input and a canonical serialization of the request
//! options, so identical requests always land on the same key while the
//! key itself never leaks prompt text into the shared store.
//!
//! Canonicalization relies on `serde_json::Value` objects being backed by
//! a `BTreeMap`: converting options to a `Value` before serializing sorts
//! keys at every nesting level, making `{a:1,b:2}` and `{b:2,a:1}` digest
//! identically.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::Result;

/// Namespace prefix shared by all bifrost keys in the backing store.
pub const KEY_PREFIX: &str = "bifrost";

/// Derive the canonical key for an (operation, provider, input, options)
/// tuple.
///
/// Deterministic: identical arguments always produce identical keys, and
/// option-map key order does not matter. Different providers or operations
/// for the same input produce different keys because both appear verbatim
/// in the key text.
pub fn fingerprint<T: Serialize>(
    operation: &str,
    provider: &str,
    input: &str,
    options: &T,
) -> Result<String> {
    let canonical = canonical_json(options)?;

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    // Separator keeps (input="ab", options="c") distinct from
    // (input="a", options="bc").
    hasher.update([0u8]);
    hasher.update(canonical.as_bytes());
    let hash: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();

    Ok(format!("{KEY_PREFIX}:{provider}:{operation}:{hash}"))
}

/// Serialize `value` with object keys sorted at every level.
pub(crate) fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&value)?)
}
