//! Máquina de estados de la prueba de existencia.
//!
//! Compone canonicalización, protocolo TSA y store:
//! `initialize_proof` → (TSA externo) → `acknowledge` → `status` / `resolve`.
//! La verificación corre sin locks; sólo la transición final en el store es
//! atómica (compare-and-swap sobre el digest).

mod source;

pub use source::{InMemoryJobSource, JobSource};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProofError;
use crate::hashing::digest;
use crate::record::{validate_job_id, ProofRecord, ProofStatus, ProofStore};
use crate::tsa::{TimestampProtocol, TrustAnchor, VerificationOutcome};

/// Resultado de `initialize_proof`: lo que hay que enviar al TSA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofInit {
    pub job_id: String,
    pub digest_hex: String,
    #[serde(skip)]
    pub request_der: Vec<u8>,
}

impl ProofInit {
    pub fn request_base64(&self) -> String {
        STANDARD.encode(&self.request_der)
    }
}

/// Proyección de sólo lectura de un registro.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofView {
    pub job_id: String,
    pub status: ProofStatus,
    pub manifest_digest: String,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<VerificationOutcome>,
}

impl From<ProofRecord> for ProofView {
    fn from(r: ProofRecord) -> Self {
        Self { job_id: r.job_id, status: r.status, manifest_digest: r.manifest_digest, verified: r.verified, timestamp: r.timestamp }
    }
}

/// Respuesta de la verificación pública: nunca incluye el manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProof {
    pub status: ProofStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_digest: Option<String>,
}

impl From<&ProofRecord> for PublicProof {
    fn from(r: &ProofRecord) -> Self {
        Self { status: r.status, job_id: Some(r.job_id.clone()), manifest_digest: Some(r.manifest_digest.clone()) }
    }
}

/// Lo que el gate deja ver de un job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobDisclosure {
    Locked { job_id: String, status: String },
    Unlocked(Value),
}

impl JobDisclosure {
    pub fn is_unlocked(&self) -> bool {
        matches!(self, Self::Unlocked(_))
    }
}

pub struct ProofMachine<S, J, P> {
    store: S,
    jobs: J,
    protocol: P,
    default_anchor: Option<TrustAnchor>,
}

impl<S, J, P> ProofMachine<S, J, P>
where
    S: ProofStore,
    J: JobSource,
    P: TimestampProtocol,
{
    pub fn new(store: S, jobs: J, protocol: P) -> Self {
        Self { store, jobs, protocol, default_anchor: None }
    }

    /// Ancla usada por `acknowledge` cuando el llamador no envía la suya.
    pub fn with_default_anchor(mut self, anchor: TrustAnchor) -> Self {
        self.default_anchor = Some(anchor);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn jobs(&self) -> &J {
        &self.jobs
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// Calcula el digest del manifest actual, construye el request y deja el
    /// registro en PENDING.
    pub fn initialize_proof(&self, job_id: &str) -> Result<ProofInit, ProofError> {
        let manifest = self.jobs.get_manifest(job_id).ok_or_else(|| ProofError::JobNotFound(job_id.to_string()))?;
        let digest_hex = digest(&manifest);
        let request = self.protocol.build_request(&digest_hex)?;
        let record = self.store.init(job_id, &digest_hex)?;
        info!("proof:init job_id={job_id} digest={} provider={}", record.manifest_digest, self.protocol.name());
        Ok(ProofInit { job_id: job_id.to_string(), digest_hex: record.manifest_digest, request_der: request.into_der() })
    }

    /// Verifica la respuesta del TSA contra el digest guardado y marca el
    /// registro como VERIFIED. Un fallo deja el registro intacto.
    pub fn acknowledge(&self, job_id: &str, response: &[u8], trust_anchor: Option<&TrustAnchor>) -> Result<ProofView, ProofError> {
        let record = self.store.load(job_id)?.ok_or_else(|| ProofError::NotInitialized(job_id.to_string()))?;
        let anchor = trust_anchor.or(self.default_anchor.as_ref());
        let outcome = match self.protocol.verify(response, &record.manifest_digest, anchor) {
            Ok(o) => o,
            Err(e) => {
                warn!("proof:ack rejected job_id={job_id} code={} err={e}", e.code());
                return Err(e);
            }
        };
        let updated = self.store.mark_verified(job_id, &record.manifest_digest, Some(outcome))?;
        info!("proof:ack job_id={job_id} status={}", updated.status);
        Ok(updated.into())
    }

    pub fn status(&self, job_id: &str) -> Result<ProofView, ProofError> {
        self.store.load(job_id)?.map(ProofView::from).ok_or_else(|| ProofError::NotFound(job_id.to_string()))
    }

    /// Búsqueda pública por job id o por digest (sin distinguir mayúsculas).
    /// Por digest recorre todos los registros: O(n).
    pub fn resolve(&self, reference: &str) -> Result<PublicProof, ProofError> {
        let reference = reference.trim();
        if validate_job_id(reference).is_ok() {
            if let Some(record) = self.store.load(reference)? {
                return Ok(PublicProof::from(&record));
            }
        }
        let wanted = reference.to_ascii_lowercase();
        for id in self.store.list_ids()? {
            match self.store.load(&id) {
                Ok(Some(record)) if record.manifest_digest == wanted => return Ok(PublicProof::from(&record)),
                Ok(_) => {}
                Err(e) => warn!("proof:resolve skipping job_id={id}: {e}"),
            }
        }
        debug!("proof:resolve miss reference={reference}");
        Err(ProofError::NotFound(reference.to_string()))
    }

    /// Gate del manifest: sólo se entrega si la prueba está VERIFIED y cubre
    /// el manifest actual; si no, `{job_id, status}`.
    pub fn public_manifest(&self, job_id: &str) -> Result<JobDisclosure, ProofError> {
        let manifest = self.jobs.get_manifest(job_id).ok_or_else(|| ProofError::JobNotFound(job_id.to_string()))?;
        let proof = match self.store.load(job_id) {
            Ok(record) => record,
            Err(e) => {
                warn!("proof:gate job_id={job_id} locked, record unreadable: {e}");
                None
            }
        };
        if let Some(record) = proof.as_ref().filter(|r| r.is_verified()) {
            if record.manifest_digest == digest(&manifest) {
                return Ok(JobDisclosure::Unlocked(manifest));
            }
            warn!("proof:gate job_id={job_id} manifest changed after verification; keeping locked");
        }
        let status = self
            .jobs
            .job_status(job_id)
            .or_else(|| proof.map(|r| r.status.to_string()))
            .unwrap_or_else(|| ProofStatus::Pending.to_string());
        Ok(JobDisclosure::Locked { job_id: job_id.to_string(), status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::InMemoryProofStore;
    use crate::tsa::{NativeProtocol, TsaSimulator};
    use serde_json::json;

    type Machine = ProofMachine<InMemoryProofStore, InMemoryJobSource, NativeProtocol>;

    fn machine(sim: &TsaSimulator) -> Machine {
        let jobs = InMemoryJobSource::new();
        jobs.insert("J1", json!({"b": ["é", "x"], "a": "café"}));
        ProofMachine::new(InMemoryProofStore::new(), jobs, NativeProtocol::new()).with_default_anchor(sim.trust_anchor())
    }

    #[test]
    fn unknown_job_is_job_not_found() {
        let sim = TsaSimulator::new(1).expect("simulator");
        assert!(matches!(machine(&sim).initialize_proof("nope"), Err(ProofError::JobNotFound(_))));
    }

    #[test]
    fn acknowledge_before_init() {
        let sim = TsaSimulator::new(1).expect("simulator");
        assert!(matches!(machine(&sim).acknowledge("J1", b"x", None), Err(ProofError::NotInitialized(_))));
        assert!(matches!(machine(&sim).status("J1"), Err(ProofError::NotFound(_))));
    }

    #[test]
    fn failed_ack_keeps_pending() {
        let sim = TsaSimulator::new(1).expect("simulator");
        let m = machine(&sim);
        m.initialize_proof("J1").unwrap();
        let err = m.acknowledge("J1", b"garbage", None).unwrap_err();
        assert!(matches!(err, ProofError::MalformedResponse(_)));
        assert_eq!(m.status("J1").unwrap().status, ProofStatus::Pending);
    }

    #[test]
    fn gate_locks_until_verified() {
        let sim = TsaSimulator::new(1).expect("simulator");
        let m = machine(&sim);
        let locked = m.public_manifest("J1").unwrap();
        assert_eq!(locked, JobDisclosure::Locked { job_id: "J1".into(), status: "PENDING".into() });

        let init = m.initialize_proof("J1").unwrap();
        assert!(!m.public_manifest("J1").unwrap().is_unlocked());
        m.acknowledge("J1", &sim.respond(&init.request_der), None).unwrap();
        match m.public_manifest("J1").unwrap() {
            JobDisclosure::Unlocked(v) => assert_eq!(v["a"], "café"),
            other => panic!("expected unlocked, got {other:?}"),
        }
    }

    #[test]
    fn gate_relocks_when_manifest_changes_after_verification() {
        let sim = TsaSimulator::new(1).expect("simulator");
        let m = machine(&sim);
        let init = m.initialize_proof("J1").unwrap();
        m.acknowledge("J1", &sim.respond(&init.request_der), None).unwrap();
        m.jobs().insert("J1", json!({"a": "changed"}));
        assert!(!m.public_manifest("J1").unwrap().is_unlocked());
    }

    #[test]
    fn locked_view_serializes_as_job_id_and_status() {
        let v = serde_json::to_value(JobDisclosure::Locked { job_id: "J".into(), status: "QUEUED".into() }).unwrap();
        assert_eq!(v, json!({"job_id": "J", "status": "QUEUED"}));
    }

    #[test]
    fn resolve_by_digest_is_case_insensitive() {
        let sim = TsaSimulator::new(1).expect("simulator");
        let m = machine(&sim);
        let init = m.initialize_proof("J1").unwrap();
        let by_digest = m.resolve(&init.digest_hex.to_uppercase()).unwrap();
        assert_eq!(by_digest.job_id.as_deref(), Some("J1"));
        assert_eq!(by_digest.status, ProofStatus::Pending);
        assert!(matches!(m.resolve("missing"), Err(ProofError::NotFound(_))));
    }
}
