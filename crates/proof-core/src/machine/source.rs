use dashmap::DashMap;
use serde_json::Value;

/// Colaborador del ciclo de vida de jobs: sólo se le pide el manifest actual.
pub trait JobSource: Send + Sync {
    fn get_manifest(&self, job_id: &str) -> Option<Value>;

    /// Estado del job en su propio ciclo de vida (QUEUED, PASS, ...), usado
    /// por la vista bloqueada del gate.
    fn job_status(&self, _job_id: &str) -> Option<String> {
        None
    }
}

impl<T: JobSource + ?Sized> JobSource for std::sync::Arc<T> {
    fn get_manifest(&self, job_id: &str) -> Option<Value> {
        (**self).get_manifest(job_id)
    }
    fn job_status(&self, job_id: &str) -> Option<String> {
        (**self).job_status(job_id)
    }
}

/// Fuente mínima en memoria (tests, CLI con manifests sueltos).
#[derive(Debug, Default)]
pub struct InMemoryJobSource {
    manifests: DashMap<String, Value>,
}

impl InMemoryJobSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job_id: impl Into<String>, manifest: Value) {
        self.manifests.insert(job_id.into(), manifest);
    }
}

impl JobSource for InMemoryJobSource {
    fn get_manifest(&self, job_id: &str) -> Option<Value> {
        self.manifests.get(job_id).map(|m| m.value().clone())
    }
}
