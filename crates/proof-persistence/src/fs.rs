//! Store de pruebas en archivos: un `<job_id>.proof.json` compacto por job.
//!
//! Escritura atómica: archivo temporal único en el mismo directorio,
//! `sync_all`, `rename` sobre el destino y fsync del directorio (best-effort).
//! Un crash deja el valor viejo o el nuevo completo, nunca uno parcial; los
//! temporales huérfanos no cuentan como registros.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, warn};
use parking_lot::Mutex;
use proof_core::record::{apply_init, apply_verified, validate_job_id};
use proof_core::{ProofError, ProofRecord, ProofStore, VerificationOutcome};
use uuid::Uuid;

pub const RECORD_SUFFIX: &str = ".proof.json";
const TMP_SUFFIX: &str = ".tmp";

pub struct FileProofStore {
    dir: PathBuf,
    // un lock por job: serializa init / mark_verified / purge del mismo id
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

fn storage(context: &str, path: &Path, e: io::Error) -> ProofError {
    ProofError::Storage(format!("{context} {}: {e}", path.display()))
}

impl FileProofStore {
    /// Abre (y crea si hace falta) el directorio de registros.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ProofError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| storage("create dir", &dir, e))?;
        Ok(Self { dir, locks: Mutex::new(HashMap::new()) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{job_id}{RECORD_SUFFIX}"))
    }

    /// Ejecuta `f` con el lock del job tomado. La entrada del mapa se descarta
    /// cuando nadie más la retiene, así el mapa no crece con cada id visto.
    fn with_job_lock<T>(&self, job_id: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.locks.lock().entry(job_id.to_string()).or_default().clone();
        let out = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);
        let mut locks = self.locks.lock();
        if locks.get(job_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(job_id);
        }
        out
    }

    fn read_record(&self, job_id: &str) -> Result<Option<ProofRecord>, ProofError> {
        let path = self.path_for(job_id);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage("read", &path, e)),
        };
        match serde_json::from_slice::<ProofRecord>(&bytes) {
            Ok(rec) => Ok(Some(rec.normalized(job_id))),
            Err(e) => {
                warn!("proof record corrupt job_id={job_id} path={}: {e}", path.display());
                Err(ProofError::StorageCorrupt { job_id: job_id.to_string(), detail: e.to_string() })
            }
        }
    }

    fn write_record(&self, record: &ProofRecord) -> Result<(), ProofError> {
        let tmp = self.dir.join(format!(".{}.{}{TMP_SUFFIX}", record.job_id, Uuid::new_v4().simple()));
        self.write_record_via(record, &tmp)
    }

    fn write_record_via(&self, record: &ProofRecord, tmp: &Path) -> Result<(), ProofError> {
        let path = self.path_for(&record.job_id);
        let bytes = serde_json::to_vec(record).map_err(|e| ProofError::Storage(format!("serialize: {e}")))?;
        let result = write_atomic(tmp, &path, &bytes);
        if let Err(e) = &result {
            if tmp.is_file() {
                let _ = fs::remove_file(tmp);
            }
            error!("proof write failed job_id={} path={}: {e}", record.job_id, path.display());
        }
        result.map_err(|e| storage("write", &path, e))?;
        sync_dir(&self.dir);
        debug!("proof write job_id={} status={}", record.job_id, record.status);
        Ok(())
    }
}

fn write_atomic(tmp: &Path, dest: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(tmp, dest)
}

// Hace durable el rename. No todos los sistemas permiten abrir directorios.
fn sync_dir(dir: &Path) {
    if let Ok(d) = File::open(dir) {
        let _ = d.sync_all();
    }
}

impl ProofStore for FileProofStore {
    fn init(&self, job_id: &str, digest_hex: &str) -> Result<ProofRecord, ProofError> {
        validate_job_id(job_id)?;
        self.with_job_lock(job_id, || {
            let existing = match self.read_record(job_id) {
                Ok(rec) => rec,
                Err(ProofError::StorageCorrupt { .. }) => {
                    warn!("re-initializing over corrupt record job_id={job_id}");
                    None
                }
                Err(e) => return Err(e),
            };
            let t = apply_init(existing, job_id, digest_hex)?;
            if t.changed {
                self.write_record(&t.record)?;
            }
            Ok(t.record)
        })
    }

    fn load(&self, job_id: &str) -> Result<Option<ProofRecord>, ProofError> {
        if validate_job_id(job_id).is_err() {
            return Ok(None);
        }
        self.read_record(job_id)
    }

    fn mark_verified(&self, job_id: &str, expected_digest: &str, timestamp: Option<VerificationOutcome>) -> Result<ProofRecord, ProofError> {
        if validate_job_id(job_id).is_err() {
            return Err(ProofError::NotInitialized(job_id.to_string()));
        }
        self.with_job_lock(job_id, || {
            let t = apply_verified(self.read_record(job_id)?, job_id, expected_digest, timestamp)?;
            if t.changed {
                self.write_record(&t.record)?;
            }
            Ok(t.record)
        })
    }

    fn list_ids(&self) -> Result<Vec<String>, ProofError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage("list", &self.dir, e)),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| storage("list", &self.dir, e))?;
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(|n| n.strip_suffix(RECORD_SUFFIX)) else {
                continue;
            };
            if validate_job_id(id).is_ok() {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn purge(&self, job_id: &str) -> Result<bool, ProofError> {
        if validate_job_id(job_id).is_err() {
            return Ok(false);
        }
        self.with_job_lock(job_id, || {
            let path = self.path_for(job_id);
            match fs::remove_file(&path) {
                Ok(()) => {
                    sync_dir(&self.dir);
                    debug!("proof purged job_id={job_id}");
                    Ok(true)
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(storage("purge", &path, e)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(c: char) -> String {
        c.to_string().repeat(64)
    }

    #[test]
    fn record_is_compact_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProofStore::open(dir.path()).unwrap();
        store.init("J1", &d('a')).unwrap();
        let raw = fs::read_to_string(store.path_for("J1")).unwrap();
        assert!(!raw.contains(' ') && !raw.contains('\n'));
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["job_id"], "J1");
        assert_eq!(v["status"], "PENDING");
        assert_eq!(v["verified"], false);
        assert_eq!(v["manifest_digest"], d('a'));
    }

    #[test]
    fn open_creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("jobs").join("proof");
        let store = FileProofStore::open(&nested).unwrap();
        assert!(nested.is_dir());
        assert!(store.list_ids().unwrap().is_empty());
    }

    fn stray_tmp_files(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap())
            .filter(|e| e.file_type().unwrap().is_file())
            .filter_map(|e| e.file_name().to_str().map(str::to_owned))
            .filter(|n| n.ends_with(TMP_SUFFIX))
            .collect()
    }

    #[test]
    fn failed_write_keeps_prior_record_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProofStore::open(dir.path()).unwrap();
        let before = store.init("J1", &d('a')).unwrap();

        // un directorio ocupando la ruta temporal hace fallar la creación
        let blocked = dir.path().join(format!(".J1.blocked{TMP_SUFFIX}"));
        fs::create_dir(&blocked).unwrap();
        let next = apply_verified(Some(before.clone()), "J1", &d('a'), None).unwrap().record;
        let err = store.write_record_via(&next, &blocked).unwrap_err();

        assert!(matches!(err, ProofError::Storage(_)), "got {err:?}");
        assert_eq!(store.load("J1").unwrap(), Some(before));
        assert!(stray_tmp_files(dir.path()).is_empty());
        assert_eq!(store.list_ids().unwrap(), vec!["J1".to_string()]);
    }

    #[test]
    fn lock_table_does_not_grow_with_job_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProofStore::open(dir.path()).unwrap();
        for i in 0..50 {
            let id = format!("J{i}");
            store.init(&id, &d('a')).unwrap();
            store.mark_verified(&id, &d('a'), None).unwrap();
            if i % 2 == 0 {
                store.purge(&id).unwrap();
            }
        }
        assert!(store.locks.lock().is_empty());
        assert_eq!(store.list_ids().unwrap().len(), 25);
    }

    #[test]
    fn unsafe_ids_never_touch_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProofStore::open(dir.path()).unwrap();
        assert!(matches!(store.init("../escape", &d('a')), Err(ProofError::InvalidJobId(_))));
        assert_eq!(store.load("../escape").unwrap(), None);
        assert!(!store.purge("../escape").unwrap());
    }
}
