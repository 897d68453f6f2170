//! Configuración central de la aplicación.
//! Carga variables de entorno (.env) una sola vez y expone `CONFIG`, además de
//! `AppConfig::from_env` para quien prefiera manejar el error.
use std::env;
use std::fmt;
use std::path::PathBuf;

use log::warn;
use once_cell::sync::Lazy;

use crate::errors::CoreError;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenvy::dotenv();
});

/// Backend de registros de prueba.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    Memory,
    #[default]
    File,
    Postgres,
}

impl StoreKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Some(Self::Memory),
            "file" | "fs" => Some(Self::File),
            "postgres" | "pg" | "db" => Some(Self::Postgres),
            _ => None,
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Postgres => "postgres",
        })
    }
}

/// Implementación del protocolo de sellado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    Native,
    OpenSsl,
}

impl ProviderKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "rust" => Some(Self::Native),
            "openssl" => Some(Self::OpenSsl),
            _ => None,
        }
    }
}

/// Configuración global de la aplicación.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub proof: ProofConfig,
    pub tsa: TsaConfig,
}

/// Dónde viven los registros de prueba.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofConfig {
    pub store: StoreKind,
    /// Directorio del store de archivos (y origen por defecto de `migrate`).
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsaConfig {
    pub provider: ProviderKind,
    /// Bundle PEM usado como ancla cuando el llamador no envía la suya.
    pub ca_file: Option<PathBuf>,
    pub openssl_bin: String,
}

pub const DEFAULT_PROOF_DIR: &str = "jobs/proof";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            proof: ProofConfig { store: StoreKind::default(), dir: PathBuf::from(DEFAULT_PROOF_DIR) },
            tsa: TsaConfig { provider: ProviderKind::default(), ca_file: None, openssl_bin: "openssl".into() },
        }
    }
}

impl AppConfig {
    /// Lee la configuración del entorno (cargando `.env` la primera vez).
    pub fn from_env() -> Result<Self, CoreError> {
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|k| env::var(k).ok())
    }

    /// Igual que `from_env` pero con una fuente de variables arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();
        if let Some(v) = get("PROOF_STORE") {
            cfg.proof.store = StoreKind::parse(&v).ok_or_else(|| CoreError::Config(format!("PROOF_STORE inválido: {v}")))?;
        }
        if let Some(v) = get("PROOF_DIR") {
            cfg.proof.dir = PathBuf::from(v);
        }
        if let Some(v) = get("TSA_PROVIDER") {
            cfg.tsa.provider = ProviderKind::parse(&v).ok_or_else(|| CoreError::Config(format!("TSA_PROVIDER inválido: {v}")))?;
        }
        cfg.tsa.ca_file = get("TSA_CA_FILE").map(PathBuf::from);
        if let Some(v) = get("OPENSSL_BIN") {
            cfg.tsa.openssl_bin = v;
        }
        Ok(cfg)
    }
}

/// Instancia global perezosa. Un valor inválido no aborta: se registra y se
/// usan los valores por defecto.
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| match AppConfig::from_env() {
    Ok(cfg) => cfg,
    Err(e) => {
        warn!("{e}; usando configuración por defecto");
        AppConfig::default()
    }
});
