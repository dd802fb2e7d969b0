//! Canonical JSON encoding and stable content hashing.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::errors::{BolabError, ErrorInfo};

/// Encodes a serializable payload as canonical JSON bytes.
///
/// The payload is first lifted into a [`Value`] tree, whose object maps are
/// backed by `BTreeMap` and therefore iterate in sorted key order. Two equal
/// payloads always produce identical bytes regardless of field declaration
/// order, which is what makes the content hashes comparable across sessions.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, BolabError> {
    let tree: Value = serde_json::to_value(value).map_err(|err| {
        BolabError::Validation(ErrorInfo::new("canonical-encode", err.to_string()))
    })?;
    serde_json::to_vec(&tree).map_err(|err| {
        BolabError::Validation(ErrorInfo::new("canonical-serialize", err.to_string()))
    })
}

/// Computes a stable hexadecimal SHA-256 hash for the provided payload.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, BolabError> {
    let bytes = to_canonical_json_bytes(value)?;
    let digest = Sha256::digest(bytes);
    Ok(format!("{:x}", digest))
}
