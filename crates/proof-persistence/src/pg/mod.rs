//! Implementación Postgres (Diesel) de `ProofStore`.
//!
//! - Una fila por job en `proofs`; las reglas de transición son las mismas
//!   funciones puras que usan los backends en memoria y de archivos.
//! - `init` y `mark_verified` leen la fila con `SELECT ... FOR UPDATE` dentro
//!   de una transacción read-write, así dos llamadas concurrentes sobre el
//!   mismo job se serializan.
//! - Errores transitorios (serialización, conexión) se reintentan con un
//!   backoff corto.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::{debug, warn};
use serde_json::Value;

use proof_core::record::{apply_init, apply_verified, validate_job_id};
use proof_core::{ProofError, ProofRecord, ProofStatus, ProofStore, VerificationOutcome};

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::proofs;

/// Pool r2d2 de conexiones Postgres. Se construye con `build_pool`, que corre
/// las migraciones pendientes.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones (pool real o uno de tests).
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool.get().map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Fila de `proofs` (orden de columnas igual al de la tabla).
#[derive(Queryable, Debug)]
pub struct ProofRow {
    pub job_id: String,
    pub manifest_digest: String,
    pub status: String,
    pub verified: bool,
    pub tsa_timestamp: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProofRow {
    fn into_record(self) -> Result<ProofRecord, ProofError> {
        let corrupt = |detail: String| ProofError::StorageCorrupt { job_id: self.job_id.clone(), detail };
        let status = ProofStatus::parse(&self.status).ok_or_else(|| corrupt(format!("unknown status {:?}", self.status)))?;
        let timestamp = match self.tsa_timestamp.clone() {
            Some(v) => Some(serde_json::from_value::<VerificationOutcome>(v).map_err(|e| corrupt(format!("timestamp: {e}")))?),
            None => None,
        };
        Ok(ProofRecord {
            job_id: self.job_id,
            manifest_digest: self.manifest_digest,
            status,
            verified: self.verified,
            timestamp,
            updated_at: Some(self.updated_at),
        }
        .normalized(""))
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = proofs)]
struct NewProofRow<'a> {
    job_id: &'a str,
    manifest_digest: &'a str,
    status: &'a str,
    verified: bool,
    tsa_timestamp: Option<Value>,
    updated_at: DateTime<Utc>,
}

impl<'a> NewProofRow<'a> {
    fn from_record(r: &'a ProofRecord) -> Result<Self, PersistenceError> {
        let tsa_timestamp = match &r.timestamp {
            Some(t) => Some(serde_json::to_value(t).map_err(|e| PersistenceError::Unknown(format!("ser timestamp: {e}")))?),
            None => None,
        };
        Ok(Self {
            job_id: &r.job_id,
            manifest_digest: &r.manifest_digest,
            status: r.status.as_str(),
            verified: r.verified,
            tsa_timestamp,
            updated_at: r.updated_at.unwrap_or_else(Utc::now),
        })
    }
}

fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict | PersistenceError::TransientIo(_) => true,
        // algunos drivers sólo reportan texto
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
                || m.contains("could not serialize access")
                || m.contains("connection closed")
                || m.contains("connection refused")
                || m.contains("timeout")
        }
        _ => false,
    }
}

/// Hasta 3 reintentos con backoff de 15ms, 30ms, 45ms.
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
where
    F: FnMut() -> Result<T, PersistenceError>,
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms", attempts + 1, e, delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

fn locked_row(conn: &mut PgConnection, job_id: &str) -> Result<Option<ProofRecord>, PersistenceError> {
    let row = proofs::table.find(job_id).for_update().first::<ProofRow>(conn).optional()?;
    Ok(row.map(ProofRow::into_record).transpose()?)
}

fn insert_new(conn: &mut PgConnection, record: &ProofRecord) -> Result<(), PersistenceError> {
    let inserted = diesel::insert_into(proofs::table)
        .values(NewProofRow::from_record(record)?)
        .on_conflict(proofs::job_id)
        .do_nothing()
        .execute(conn)?;
    if inserted == 0 {
        // otra transacción creó la fila entre el SELECT y el INSERT: reintentar
        return Err(PersistenceError::SerializationConflict);
    }
    Ok(())
}

fn update_existing(conn: &mut PgConnection, record: &ProofRecord) -> Result<(), PersistenceError> {
    let row = NewProofRow::from_record(record)?;
    diesel::update(proofs::table.find(record.job_id.as_str()))
        .set((
            proofs::manifest_digest.eq(row.manifest_digest),
            proofs::status.eq(row.status),
            proofs::verified.eq(row.verified),
            proofs::tsa_timestamp.eq(row.tsa_timestamp),
            proofs::updated_at.eq(row.updated_at),
        ))
        .execute(conn)?;
    Ok(())
}

pub struct PgProofStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgProofStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl PgProofStore<PoolProvider> {
    pub fn from_pool(pool: PgPool) -> Self {
        Self::new(PoolProvider { pool })
    }
}

impl<P: ConnectionProvider> ProofStore for PgProofStore<P> {
    fn init(&self, job_id: &str, digest_hex: &str) -> Result<ProofRecord, ProofError> {
        validate_job_id(job_id)?;
        debug!("pg init:start job_id={job_id}");
        let record = with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction().read_write().run(|tx| {
                let (existing, row_exists) = match locked_row(tx, job_id) {
                    Ok(rec) => {
                        let present = rec.is_some();
                        (rec, present)
                    }
                    Err(PersistenceError::Proof(ProofError::StorageCorrupt { detail, .. })) => {
                        warn!("re-initializing over corrupt row job_id={job_id}: {detail}");
                        (None, true)
                    }
                    Err(e) => return Err(e),
                };
                let t = apply_init(existing, job_id, digest_hex)?;
                if t.changed {
                    if row_exists {
                        update_existing(tx, &t.record)?;
                    } else {
                        insert_new(tx, &t.record)?;
                    }
                }
                Ok::<_, PersistenceError>(t.record)
            })
        })?;
        Ok(record)
    }

    fn load(&self, job_id: &str) -> Result<Option<ProofRecord>, ProofError> {
        if validate_job_id(job_id).is_err() {
            return Ok(None);
        }
        let row = with_retry(|| {
            let mut conn = self.provider.connection()?;
            Ok(proofs::table.find(job_id).first::<ProofRow>(&mut conn).optional()?)
        })?;
        row.map(ProofRow::into_record).transpose()
    }

    fn mark_verified(&self, job_id: &str, expected_digest: &str, timestamp: Option<VerificationOutcome>) -> Result<ProofRecord, ProofError> {
        if validate_job_id(job_id).is_err() {
            return Err(ProofError::NotInitialized(job_id.to_string()));
        }
        let record = with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction().read_write().run(|tx| {
                let existing = locked_row(tx, job_id)?;
                let t = apply_verified(existing, job_id, expected_digest, timestamp.clone())?;
                if t.changed {
                    update_existing(tx, &t.record)?;
                }
                Ok::<_, PersistenceError>(t.record)
            })
        })?;
        debug!("pg mark_verified job_id={job_id} status={}", record.status);
        Ok(record)
    }

    fn list_ids(&self) -> Result<Vec<String>, ProofError> {
        let ids = with_retry(|| {
            let mut conn = self.provider.connection()?;
            Ok(proofs::table.select(proofs::job_id).order(proofs::job_id.asc()).load::<String>(&mut conn)?)
        })?;
        Ok(ids)
    }

    fn purge(&self, job_id: &str) -> Result<bool, ProofError> {
        if validate_job_id(job_id).is_err() {
            return Ok(false);
        }
        let deleted = with_retry(|| {
            let mut conn = self.provider.connection()?;
            Ok(diesel::delete(proofs::table.find(job_id)).execute(&mut conn)?)
        })?;
        Ok(deleted > 0)
    }
}

/// Construye un pool r2d2 y corre las migraciones pendientes.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let max = max_size.max(1);
    let min = min_size.max(1);
    if min > max {
        warn!("min_size > max_size ({min} > {max}), ajustando min=max");
    }
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .min_idle(Some(min.min(max)))
        .max_size(max)
        .build(manager)
        .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get().map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Carga `.env`, lee `DbConfig` y construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
