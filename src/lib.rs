//! Proofchain Rust Library
//!
//! Capa de aplicación sobre `proof-core` y `proof-persistence`:
//! - `config`: configuración desde el entorno (`CONFIG`, `AppConfig::from_env`).
//! - `errors`: errores de núcleo y del registro de jobs.
//! - `jobs`: registro de jobs en memoria, fuente de manifests para el gate.
//! - `startup`: chequeos de arranque que sólo avisan.
//! - `wiring`: store y protocolo TSA elegidos por configuración.
//! - `hashing`: reexport de la canonicalización.

pub mod config;
pub mod errors;
pub mod hashing;
pub mod jobs;
pub mod startup;
pub mod wiring;

pub use config::{AppConfig, CONFIG};
pub use jobs::{Job, JobRegistry, JobStatus, NewJob};

/// Instala el subscriber de `tracing` (filtro por `RUST_LOG`, por defecto
/// `info`). También recibe los registros del facade `log`. Llamarlo dos veces
/// no falla.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}
