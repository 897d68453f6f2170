//! Registro de jobs en memoria: ciclo de vida QUEUED → PROCESSING → PASS/FAIL
//! y fuente de manifests para la máquina de pruebas.
//!
//! Es una instancia explícita que se inyecta donde haga falta; el orden de
//! inserción define el orden en que los workers toman jobs.

mod status;

pub use status::JobStatus;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{debug, info};
use parking_lot::RwLock;
use proof_core::record::validate_job_id;
use proof_core::JobSource;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub profile: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_key: Option<String>,
    pub manifest: Value,
    pub created_at: DateTime<Utc>,
}

/// Datos para crear un job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub input_key: Option<String>,
    #[serde(default)]
    pub profile: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub status: JobStatus,
}

/// Trabajo entregado a un worker por `next_job`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub job_id: String,
    pub profile: Value,
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<IndexMap<String, Job>>,
}

/// 12 hex en mayúsculas (6 bytes aleatorios).
fn generate_job_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_ascii_uppercase()
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crea el job en QUEUED con un manifest inicial `{job_id, proof: {}}`.
    pub fn create(&self, req: NewJob) -> Result<JobSummary, DomainError> {
        let job_id = match req.job_id {
            Some(id) => {
                validate_job_id(&id).map_err(|e| DomainError::Validation(e.to_string()))?;
                id
            }
            None => generate_job_id(),
        };
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&job_id) {
            return Err(DomainError::Conflict(format!("job_id already exists: {job_id}")));
        }
        let profile = if req.profile.is_null() { json!({}) } else { req.profile };
        jobs.insert(
            job_id.clone(),
            Job {
                job_id: job_id.clone(),
                status: JobStatus::Queued,
                profile,
                input_key: req.input_key,
                manifest: json!({ "job_id": job_id, "proof": {} }),
                created_at: Utc::now(),
            },
        );
        info!("job:create job_id={job_id}");
        Ok(JobSummary { job_id, status: JobStatus::Queued })
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().get(job_id).cloned()
    }

    pub fn list(&self) -> Vec<JobSummary> {
        self.jobs.read().values().map(|j| JobSummary { job_id: j.job_id.clone(), status: j.status }).collect()
    }

    /// Toma el primer job en QUEUED (orden de creación) y lo pasa a PROCESSING.
    pub fn next_job(&self) -> Option<WorkItem> {
        let mut jobs = self.jobs.write();
        let job = jobs.values_mut().find(|j| j.status == JobStatus::Queued)?;
        job.status = JobStatus::Processing;
        debug!("job:next job_id={}", job.job_id);
        Some(WorkItem { job_id: job.job_id.clone(), profile: job.profile.clone() })
    }

    /// Reemplaza el manifest y el estado que reporta el worker.
    pub fn update_job(&self, job_id: &str, manifest: Value, status: JobStatus) -> Result<(), DomainError> {
        if !manifest.is_object() {
            return Err(DomainError::Validation("manifest must be a JSON object".into()));
        }
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(job_id).ok_or_else(|| DomainError::NotFound(format!("job {job_id}")))?;
        job.manifest = manifest;
        job.status = status;
        info!("job:update job_id={job_id} status={status}");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

impl JobSource for JobRegistry {
    fn get_manifest(&self, job_id: &str) -> Option<Value> {
        self.jobs.read().get(job_id).map(|j| j.manifest.clone())
    }

    fn job_status(&self, job_id: &str) -> Option<String> {
        self.jobs.read().get(job_id).map(|j| j.status.to_string())
    }
}
