//! Hash helpers – SHA-256 en hex minúsculas, el algoritmo que exige el TSA.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::canonical_json::canonicalize;
use crate::constants::DIGEST_HEX_LEN;
use crate::errors::ProofError;

/// Hashea bytes y devuelve hex (64 caracteres).
pub fn hash_bytes(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}

/// Hashea un string y devuelve hex.
pub fn hash_str(input: &str) -> String {
    hash_bytes(input.as_bytes())
}

/// Digest del manifest: SHA-256 de su forma canónica.
pub fn digest(manifest: &Value) -> String {
    hash_bytes(&canonicalize(manifest))
}

/// Valida un digest hex (exactamente 64 caracteres hex) y lo devuelve en
/// minúsculas junto a sus 32 bytes.
pub fn parse_digest_hex(digest_hex: &str) -> Result<(String, [u8; 32]), ProofError> {
    if digest_hex.len() != DIGEST_HEX_LEN || !digest_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ProofError::InvalidDigest(format!("expected {DIGEST_HEX_LEN} hex chars, got {:?}", digest_hex)));
    }
    let lower = digest_hex.to_ascii_lowercase();
    let mut raw = [0u8; 32];
    hex::decode_to_slice(&lower, &mut raw).map_err(|e| ProofError::InvalidDigest(e.to_string()))?;
    Ok((lower, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sha256_of_empty_string() {
        assert_eq!(hash_str(""), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }

    #[test]
    fn key_order_invariance_list_order_sensitivity() {
        assert_eq!(digest(&json!({"a": 1, "b": 2})), digest(&json!({"b": 2, "a": 1})));
        assert_ne!(digest(&json!({"x": [1, 2]})), digest(&json!({"x": [2, 1]})));
    }

    #[test]
    fn parse_digest_rejects_bad_input() {
        assert!(matches!(parse_digest_hex("abc"), Err(ProofError::InvalidDigest(_))));
        assert!(matches!(parse_digest_hex(&"g".repeat(64)), Err(ProofError::InvalidDigest(_))));
        let (lower, raw) = parse_digest_hex(&"AB".repeat(32)).expect("valid");
        assert_eq!(lower, "ab".repeat(32));
        assert_eq!(raw, [0xab; 32]);
    }
}
