//! Importación de registros `*.proof.json` (formato actual o heredado) hacia
//! cualquier `ProofStore`, típicamente del store de archivos a Postgres.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use proof_core::{ProofError, ProofRecord, ProofStore};
use serde::Serialize;

use crate::fs::RECORD_SUFFIX;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub migrated: Vec<String>,
    pub skipped: Vec<(PathBuf, String)>,
    pub failed: Vec<(PathBuf, String)>,
}

impl MigrationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Recorre `dir` e inicializa (y marca verificado si corresponde) cada
/// registro en `target`. Un directorio inexistente no es error: no hay nada
/// que migrar.
pub fn import_legacy_dir<S: ProofStore + ?Sized>(dir: &Path, target: &S) -> Result<MigrationReport, ProofError> {
    let mut report = MigrationReport::default();
    if !dir.exists() {
        info!("no legacy proofs found at {}; skipping", dir.display());
        return Ok(report);
    }
    let entries = fs::read_dir(dir).map_err(|e| ProofError::Storage(format!("list {}: {e}", dir.display())))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with(RECORD_SUFFIX)))
        .collect();
    files.sort();

    for path in files {
        match import_one(&path, target) {
            Ok(Some(job_id)) => {
                info!("MIGRATED: {}", path.display());
                report.migrated.push(job_id);
            }
            Ok(None) => {
                warn!("SKIP (no digest): {}", path.display());
                report.skipped.push((path, "no manifest digest".into()));
            }
            Err(e) => {
                warn!("ERR: {}: {e}", path.display());
                report.failed.push((path, e.to_string()));
            }
        }
    }
    Ok(report)
}

fn import_one<S: ProofStore + ?Sized>(path: &Path, target: &S) -> Result<Option<String>, ProofError> {
    let key = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(RECORD_SUFFIX))
        .unwrap_or_default()
        .to_string();
    let raw = fs::read(path).map_err(|e| ProofError::Storage(format!("read {}: {e}", path.display())))?;
    let value: serde_json::Value =
        serde_json::from_slice(&raw).map_err(|e| ProofError::StorageCorrupt { job_id: key.clone(), detail: e.to_string() })?;
    let has_digest = ["manifest_digest", "manifest_sha256"]
        .iter()
        .any(|k| value.get(*k).and_then(|v| v.as_str()).is_some_and(|s| !s.is_empty()));
    if !has_digest {
        return Ok(None);
    }
    let record: ProofRecord =
        serde_json::from_value(value).map_err(|e| ProofError::StorageCorrupt { job_id: key.clone(), detail: e.to_string() })?;
    let record = record.normalized(&key);

    target.init(&record.job_id, &record.manifest_digest)?;
    if record.verified {
        target.mark_verified(&record.job_id, &record.manifest_digest, record.timestamp.clone())?;
    }
    Ok(Some(record.job_id))
}
