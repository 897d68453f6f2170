use proof_core::ProofError;
use proofchain_rust::errors::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("entrada inválida: {0}")]
    Input(String),
    #[error("{code}: {0}", code = .0.code())]
    Proof(ProofError),
    #[error("{0}")]
    Infra(String),
}

impl CliError {
    /// 2 uso, 3 entrada, 4 rechazo del dominio, 5 infraestructura.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Input(_) => 3,
            Self::Proof(e) => match e {
                ProofError::Storage(_) | ProofError::TransportUnavailable(_) => 5,
                _ => 4,
            },
            Self::Infra(_) => 5,
        }
    }
}

impl From<ProofError> for CliError {
    fn from(e: ProofError) -> Self {
        Self::Proof(e)
    }
}

impl From<CoreError> for CliError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Proof(inner) => Self::Proof(inner),
            other => Self::Infra(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_category() {
        assert_eq!(CliError::Usage("x".into()).exit_code(), 2);
        assert_eq!(CliError::Input("x".into()).exit_code(), 3);
        assert_eq!(CliError::from(ProofError::NotFound("J".into())).exit_code(), 4);
        assert_eq!(CliError::from(ProofError::Storage("disk".into())).exit_code(), 5);
        assert_eq!(CliError::from(CoreError::Config("PROOF_STORE".into())).exit_code(), 5);
    }

    #[test]
    fn proof_errors_show_their_code() {
        let e = CliError::from(ProofError::NotInitialized("J".into()));
        assert!(e.to_string().starts_with("NOT_INITIALIZED: "));
    }
}
