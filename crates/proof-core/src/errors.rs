//! Errores del subsistema de pruebas de existencia.
//!
//! Cada fallo de verificación tiene su propia variante: `DigestMismatch`
//! indica manipulación, `SignatureInvalid` indica mala configuración de
//! confianza. No se colapsan en un "failed" genérico.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum ProofError {
    #[error("invalid digest: {0}")]
    InvalidDigest(String),
    #[error("invalid job id: {0:?}")]
    InvalidJobId(String),
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error("proof not initialized for job {0}")]
    NotInitialized(String),
    #[error("proof not found: {0}")]
    NotFound(String),
    #[error("proof for job {job_id} already verified with digest {stored}; refusing to re-initialize with {requested}")]
    AlreadyVerified { job_id: String, stored: String, requested: String },
    #[error("malformed TSA response: {0}")]
    MalformedResponse(String),
    #[error("digest mismatch: expected {expected}, got {found}")]
    DigestMismatch { expected: String, found: String },
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),
    #[error("stored proof for job {job_id} is corrupt: {detail}")]
    StorageCorrupt { job_id: String, detail: String },
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("timestamp transport unavailable: {0}")]
    TransportUnavailable(String),
}

impl ProofError {
    /// Código estable (para CLI y superficie pública).
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDigest(_) => "INVALID_DIGEST",
            Self::InvalidJobId(_) => "INVALID_JOB_ID",
            Self::JobNotFound(_) => "JOB_NOT_FOUND",
            Self::NotInitialized(_) => "NOT_INITIALIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyVerified { .. } => "ALREADY_VERIFIED",
            Self::MalformedResponse(_) => "MALFORMED_RESPONSE",
            Self::DigestMismatch { .. } => "DIGEST_MISMATCH",
            Self::SignatureInvalid(_) => "SIGNATURE_INVALID",
            Self::StorageCorrupt { .. } => "STORAGE_CORRUPT",
            Self::Storage(_) => "STORAGE",
            Self::TransportUnavailable(_) => "TRANSPORT_UNAVAILABLE",
        }
    }

    /// Fallos producidos al verificar una respuesta del TSA.
    pub fn is_verification_failure(&self) -> bool {
        matches!(self, Self::MalformedResponse(_) | Self::DigestMismatch { .. } | Self::SignatureInvalid(_))
    }
}
