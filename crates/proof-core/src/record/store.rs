use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;

use super::types::{apply_init, apply_verified, validate_job_id, ProofRecord};
use crate::errors::ProofError;
use crate::tsa::VerificationOutcome;

/// Almacenamiento de registros de prueba, uno por job.
///
/// `init` y `mark_verified` son atómicos entre sí para un mismo job: cada
/// backend aplica las transiciones de `types` dentro de su propio lock o
/// transacción.
pub trait ProofStore: Send + Sync {
    /// Upsert idempotente (ver `apply_init`).
    fn init(&self, job_id: &str, digest_hex: &str) -> Result<ProofRecord, ProofError>;
    /// `Ok(None)` si no existe (o si el id no puede ser una clave válida).
    fn load(&self, job_id: &str) -> Result<Option<ProofRecord>, ProofError>;
    /// PENDING → VERIFIED si el digest guardado sigue siendo `expected_digest`.
    fn mark_verified(&self, job_id: &str, expected_digest: &str, timestamp: Option<VerificationOutcome>) -> Result<ProofRecord, ProofError>;
    /// Job ids con registro, ordenados.
    fn list_ids(&self) -> Result<Vec<String>, ProofError>;
    /// Borrado administrativo. Devuelve si existía.
    fn purge(&self, job_id: &str) -> Result<bool, ProofError>;
}

impl<T: ProofStore + ?Sized> ProofStore for Arc<T> {
    fn init(&self, job_id: &str, digest_hex: &str) -> Result<ProofRecord, ProofError> {
        (**self).init(job_id, digest_hex)
    }
    fn load(&self, job_id: &str) -> Result<Option<ProofRecord>, ProofError> {
        (**self).load(job_id)
    }
    fn mark_verified(&self, job_id: &str, expected_digest: &str, timestamp: Option<VerificationOutcome>) -> Result<ProofRecord, ProofError> {
        (**self).mark_verified(job_id, expected_digest, timestamp)
    }
    fn list_ids(&self) -> Result<Vec<String>, ProofError> {
        (**self).list_ids()
    }
    fn purge(&self, job_id: &str) -> Result<bool, ProofError> {
        (**self).purge(job_id)
    }
}

impl<T: ProofStore + ?Sized> ProofStore for Box<T> {
    fn init(&self, job_id: &str, digest_hex: &str) -> Result<ProofRecord, ProofError> {
        (**self).init(job_id, digest_hex)
    }
    fn load(&self, job_id: &str) -> Result<Option<ProofRecord>, ProofError> {
        (**self).load(job_id)
    }
    fn mark_verified(&self, job_id: &str, expected_digest: &str, timestamp: Option<VerificationOutcome>) -> Result<ProofRecord, ProofError> {
        (**self).mark_verified(job_id, expected_digest, timestamp)
    }
    fn list_ids(&self) -> Result<Vec<String>, ProofError> {
        (**self).list_ids()
    }
    fn purge(&self, job_id: &str) -> Result<bool, ProofError> {
        (**self).purge(job_id)
    }
}

/// Store en memoria (tests, demo). El lock por entrada de DashMap serializa
/// las transiciones de un mismo job.
#[derive(Debug, Default)]
pub struct InMemoryProofStore {
    inner: DashMap<String, ProofRecord>,
}

impl InMemoryProofStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl ProofStore for InMemoryProofStore {
    fn init(&self, job_id: &str, digest_hex: &str) -> Result<ProofRecord, ProofError> {
        validate_job_id(job_id)?;
        match self.inner.entry(job_id.to_string()) {
            Entry::Occupied(mut slot) => {
                let t = apply_init(Some(slot.get().clone()), job_id, digest_hex)?;
                if t.changed {
                    slot.insert(t.record.clone());
                }
                Ok(t.record)
            }
            Entry::Vacant(slot) => {
                let t = apply_init(None, job_id, digest_hex)?;
                slot.insert(t.record.clone());
                debug!("proof init job_id={job_id} digest={}", t.record.manifest_digest);
                Ok(t.record)
            }
        }
    }

    fn load(&self, job_id: &str) -> Result<Option<ProofRecord>, ProofError> {
        Ok(self.inner.get(job_id).map(|r| r.value().clone()))
    }

    fn mark_verified(&self, job_id: &str, expected_digest: &str, timestamp: Option<VerificationOutcome>) -> Result<ProofRecord, ProofError> {
        match self.inner.get_mut(job_id) {
            Some(mut slot) => {
                let t = apply_verified(Some(slot.value().clone()), job_id, expected_digest, timestamp)?;
                if t.changed {
                    *slot.value_mut() = t.record.clone();
                }
                Ok(t.record)
            }
            None => apply_verified(None, job_id, expected_digest, timestamp).map(|t| t.record),
        }
    }

    fn list_ids(&self) -> Result<Vec<String>, ProofError> {
        let mut ids: Vec<String> = self.inner.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    fn purge(&self, job_id: &str) -> Result<bool, ProofError> {
        Ok(self.inner.remove(job_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ProofStatus;

    fn d(c: char) -> String {
        c.to_string().repeat(64)
    }

    #[test]
    fn lifecycle_in_memory() {
        let store = InMemoryProofStore::new();
        assert!(store.load("J").unwrap().is_none());
        store.init("J", &d('a')).unwrap();
        store.init("K", &d('b')).unwrap();
        assert_eq!(store.list_ids().unwrap(), vec!["J".to_string(), "K".to_string()]);

        let rec = store.mark_verified("J", &d('a'), None).unwrap();
        assert_eq!(rec.status, ProofStatus::Verified);
        assert!(store.load("J").unwrap().unwrap().verified);

        assert!(store.purge("K").unwrap());
        assert!(!store.purge("K").unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn mark_verified_requires_init() {
        let store = InMemoryProofStore::new();
        assert!(matches!(store.mark_verified("nope", &d('a'), None), Err(ProofError::NotInitialized(_))));
    }

    #[test]
    fn shared_through_arc() {
        let store: Arc<dyn ProofStore> = Arc::new(InMemoryProofStore::new());
        store.init("J", &d('c')).unwrap();
        assert_eq!(store.load("J").unwrap().unwrap().manifest_digest, d('c'));
    }
}
