//! Registro de prueba por job: modelo, reglas de transición y trait de store.

mod store;
mod types;

pub use store::{InMemoryProofStore, ProofStore};
pub use types::{apply_init, apply_verified, validate_job_id, ProofRecord, ProofStatus, Transition, MAX_JOB_ID_LEN};
