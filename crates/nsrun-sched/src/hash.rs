use nsrun_core::errors::NsError;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::serde::to_canonical_json_bytes;

/// Hex SHA-256 of the canonical JSON form of `value`.
///
/// Used as the plan hash recorded in every batch report; key order and
/// formatting of the source YAML do not affect it.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, NsError> {
    let bytes = to_canonical_json_bytes(value)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}
