// Reexport de la implementación única en `proof-core` para no duplicar la
// canonicalización a nivel de workspace.
pub use proof_core::hashing::{canonical_json, canonicalize, digest, to_canonical_json};
