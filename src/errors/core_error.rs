use proof_core::ProofError;
use thiserror::Error;

use super::DomainError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Error interno: {0}")]
    Internal(String),
    #[error("Error en IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error de configuración: {0}")]
    Config(String),
    /// Fallo del subsistema de pruebas (store, TSA, verificación).
    #[error("Error de prueba [{code}]: {0}", code = .0.code())]
    Proof(#[from] ProofError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<proof_persistence::PersistenceError> for CoreError {
    fn from(err: proof_persistence::PersistenceError) -> Self {
        match err {
            proof_persistence::PersistenceError::Config(msg) => CoreError::Config(msg),
            other => CoreError::Proof(other.into()),
        }
    }
}
