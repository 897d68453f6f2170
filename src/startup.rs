//! Chequeos de arranque: detectan configuración incompleta temprano.
//! Sólo avisan (`warn!`); nunca abortan el proceso.

use std::fs;

use log::{info, warn};
use proof_core::{OpenSslProtocol, TrustAnchor};
use uuid::Uuid;

use crate::config::{AppConfig, ProviderKind, StoreKind};

/// Corre todos los chequeos y devuelve los avisos emitidos.
pub fn run(cfg: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    check_proof_dir(cfg, &mut warnings);
    check_ca_file(cfg, &mut warnings);
    check_tools(cfg, &mut warnings);
    check_database(cfg, &mut warnings);
    for w in &warnings {
        warn!("[startup] {w}");
    }
    info!("[startup] checks completed ({} warnings)", warnings.len());
    warnings
}

fn check_proof_dir(cfg: &AppConfig, out: &mut Vec<String>) {
    if cfg.proof.store != StoreKind::File {
        return;
    }
    let dir = &cfg.proof.dir;
    if let Err(e) = fs::create_dir_all(dir) {
        out.push(format!("proof dir {} cannot be created: {e}", dir.display()));
        return;
    }
    let marker = dir.join(format!(".startup-{}.tmp", Uuid::new_v4().simple()));
    match fs::write(&marker, b"ok") {
        Ok(()) => {
            let _ = fs::remove_file(&marker);
        }
        Err(e) => out.push(format!("proof dir {} is not writable: {e}", dir.display())),
    }
}

fn check_ca_file(cfg: &AppConfig, out: &mut Vec<String>) {
    let Some(path) = &cfg.tsa.ca_file else {
        return;
    };
    match TrustAnchor::from_file(path).and_then(|a| a.certificates()) {
        Ok(certs) if certs.is_empty() => out.push(format!("TSA_CA_FILE {} contains no certificates", path.display())),
        Ok(_) => {}
        Err(e) => out.push(format!("TSA_CA_FILE {} unusable: {e}", path.display())),
    }
}

fn check_tools(cfg: &AppConfig, out: &mut Vec<String>) {
    if cfg.tsa.provider != ProviderKind::OpenSsl {
        return;
    }
    if let Err(e) = OpenSslProtocol::with_binary(&cfg.tsa.openssl_bin).ensure_available() {
        out.push(format!("openssl unavailable (proof endpoints will fail): {e}"));
    }
}

fn check_database(cfg: &AppConfig, out: &mut Vec<String>) {
    if cfg.proof.store == StoreKind::Postgres && std::env::var("DATABASE_URL").map(|v| v.is_empty()).unwrap_or(true) {
        out.push("PROOF_STORE=postgres but DATABASE_URL is not set".into());
    }
}
