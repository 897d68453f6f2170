use thiserror::Error;

/// Errores del registro de jobs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Entidad no encontrada: {0}")]
    NotFound(String),
    #[error("Validación fallida: {0}")]
    Validation(String),
    #[error("Conflicto: {0}")]
    Conflict(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_variant_format() {
        let err = DomainError::NotFound("RecursoX".into());
        assert_eq!(err.to_string(), "Entidad no encontrada: RecursoX");
    }

    #[test]
    fn test_conflict_variant_format() {
        let err = DomainError::Conflict("job_id ya existe".into());
        assert_eq!(err.to_string(), "Conflicto: job_id ya existe");
    }
}
