//! Módulo de hashing y canonicalización JSON de manifests.

pub mod canonical_json;
pub mod hash;

pub use canonical_json::{canonical_equal, canonicalize, sanitize, to_canonical_json};
pub use hash::{digest, hash_bytes, hash_str, parse_digest_hex};
