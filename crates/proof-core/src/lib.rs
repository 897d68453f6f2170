//! proof-core: prueba de existencia con sellado de tiempo RFC 3161 para
//! manifests de jobs.
//!
//! Piezas, de las hojas hacia arriba:
//! - `hashing`: forma canónica del manifest y su digest SHA-256.
//! - `tsa`: request determinista, verificación de respuestas, proveedores
//!   (nativo / OpenSSL) y un TSA simulado.
//! - `record`: registro persistido por job, reglas de transición y store.
//! - `machine`: máquina de estados y gate de disclosure del manifest.
pub mod constants;
pub mod errors;
pub mod hashing;
pub mod machine;
pub mod record;
pub mod tsa;

pub use errors::ProofError;
pub use hashing::{canonicalize, digest, to_canonical_json};
pub use machine::{InMemoryJobSource, JobDisclosure, JobSource, ProofInit, ProofMachine, ProofView, PublicProof};
pub use record::{InMemoryProofStore, ProofRecord, ProofStatus, ProofStore};
pub use tsa::{build_request, NativeProtocol, OpenSslProtocol, TimestampProtocol, TimestampRequest, TrustAnchor, TsaSimulator, VerificationOutcome};
