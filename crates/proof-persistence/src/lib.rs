//! proof-persistence
//!
//! Backends durables de `ProofStore`:
//! - `fs`: un archivo JSON por job con escritura atómica (temp + rename).
//! - `pg`: tabla `proofs` en Postgres vía Diesel, con migraciones embebidas.
//! - `migrate`: importación de registros en archivo (incluido el formato
//!   heredado) hacia cualquier store.
//! - `config`: configuración de conexión desde .env.

pub mod config;
pub mod error;
pub mod fs;
pub mod migrate;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use fs::FileProofStore;
pub use migrate::{import_legacy_dir, MigrationReport};
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgPool, PgProofStore, PoolProvider};
