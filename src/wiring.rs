//! Construcción de store y protocolo a partir de `AppConfig`.

use log::info;
use proof_core::{InMemoryProofStore, JobSource, NativeProtocol, OpenSslProtocol, ProofMachine, ProofStore, TimestampProtocol, TrustAnchor};
use proof_persistence::{build_dev_pool_from_env, FileProofStore, PgProofStore};

use crate::config::{AppConfig, ProviderKind, StoreKind};
use crate::errors::CoreError;

pub type DynProofStore = Box<dyn ProofStore>;
pub type DynProtocol = Box<dyn TimestampProtocol>;
pub type AppMachine<J> = ProofMachine<DynProofStore, J, DynProtocol>;

pub fn open_store(cfg: &AppConfig) -> Result<DynProofStore, CoreError> {
    let store: DynProofStore = match cfg.proof.store {
        StoreKind::Memory => Box::new(InMemoryProofStore::new()),
        StoreKind::File => Box::new(FileProofStore::open(&cfg.proof.dir)?),
        StoreKind::Postgres => Box::new(PgProofStore::from_pool(build_dev_pool_from_env()?)),
    };
    info!("proof store: {}", cfg.proof.store);
    Ok(store)
}

/// El ancla por defecto (`TSA_CA_FILE`) se usa cuando `acknowledge` no recibe una.
pub fn open_protocol(cfg: &AppConfig) -> Result<DynProtocol, CoreError> {
    let protocol: DynProtocol = match cfg.tsa.provider {
        ProviderKind::Native => match &cfg.tsa.ca_file {
            Some(path) => Box::new(NativeProtocol::with_default_anchor(&TrustAnchor::from_file(path)?)?),
            None => Box::new(NativeProtocol::new()),
        },
        ProviderKind::OpenSsl => {
            let p = OpenSslProtocol::with_binary(&cfg.tsa.openssl_bin);
            match &cfg.tsa.ca_file {
                Some(path) => Box::new(p.with_default_ca_file(path)),
                None => Box::new(p),
            }
        }
    };
    info!("tsa provider: {}", protocol.name());
    Ok(protocol)
}

pub fn build_machine<J: JobSource>(cfg: &AppConfig, jobs: J) -> Result<AppMachine<J>, CoreError> {
    Ok(ProofMachine::new(open_store(cfg)?, jobs, open_protocol(cfg)?))
}
