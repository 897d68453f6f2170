//! Implementación de cada subcomando. Devuelven el texto a imprimir.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{info, warn};
use proof_core::{InMemoryJobSource, TrustAnchor, TsaSimulator};
use proof_persistence::import_legacy_dir;
use proofchain_rust::config::{AppConfig, StoreKind};
use proofchain_rust::wiring::{build_machine, open_store, AppMachine};
use serde::Serialize;
use serde_json::{json, Value};

use crate::args::Flags;
use crate::error::CliError;

pub const USAGE: &str = "\
Uso: proof <comando> [opciones]
  init        --job <ID> --manifest <FILE.json> [--out <FILE.tsq>]
  ack         --job <ID> --response <FILE.tsr> [--ca <FILE.pem>]
  status      --job <ID>
  resolve     --ref <JOB_ID|DIGEST>
  purge       --job <ID>
  migrate     [--from <DIR>]
  sim-respond --request <FILE.tsq> --out <FILE.tsr> [--seed <N>] [--ca-out <FILE.pem>]";

pub fn dispatch(command: &str, flags: &Flags, cfg: &AppConfig) -> Result<String, CliError> {
    match command {
        "init" => init(flags, cfg),
        "ack" => ack(flags, cfg),
        "status" => status(flags, cfg),
        "resolve" => resolve(flags, cfg),
        "purge" => purge(flags, cfg),
        "migrate" => migrate(flags, cfg),
        "sim-respond" => sim_respond(flags),
        other => Err(CliError::Usage(format!("comando desconocido: {other}\n{USAGE}"))),
    }
}

fn machine(cfg: &AppConfig, jobs: InMemoryJobSource) -> Result<AppMachine<InMemoryJobSource>, CliError> {
    Ok(build_machine(cfg, jobs)?)
}

fn pretty<T: Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value).map_err(|e| CliError::Infra(format!("serialización: {e}")))
}

fn read_file(path: &Path) -> Result<Vec<u8>, CliError> {
    fs::read(path).map_err(|e| CliError::Input(format!("{}: {e}", path.display())))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    fs::write(path, bytes).map_err(|e| CliError::Infra(format!("{}: {e}", path.display())))
}

/// Acepta DER crudo o el mismo contenido en base64 (texto).
fn read_der(path: &Path) -> Result<Vec<u8>, CliError> {
    let raw = read_file(path)?;
    if raw.first() == Some(&0x30) {
        return Ok(raw);
    }
    let text = String::from_utf8(raw).map_err(|_| CliError::Input(format!("{}: ni DER ni base64", path.display())))?;
    let compact: String = text.split_whitespace().collect();
    STANDARD.decode(compact).map_err(|e| CliError::Input(format!("{}: base64 inválido: {e}", path.display())))
}

fn init(flags: &Flags, cfg: &AppConfig) -> Result<String, CliError> {
    const USE: &str = "Uso: proof init --job <ID> --manifest <FILE.json> [--out <FILE.tsq>]";
    let job_id = flags.require("job", USE)?;
    let manifest_path = PathBuf::from(flags.require("manifest", USE)?);
    let manifest: Value = serde_json::from_slice(&read_file(&manifest_path)?)
        .map_err(|e| CliError::Input(format!("{}: JSON inválido: {e}", manifest_path.display())))?;

    let jobs = InMemoryJobSource::new();
    jobs.insert(job_id, manifest);
    let init = machine(cfg, jobs)?.initialize_proof(job_id)?;

    let mut out = json!({ "job_id": init.job_id, "digest": init.digest_hex, "status": "PENDING" });
    match flags.get("out") {
        Some(path) => {
            write_file(Path::new(path), &init.request_der)?;
            out["request_file"] = json!(path);
        }
        None => out["request_b64"] = json!(init.request_base64()),
    }
    pretty(&out)
}

fn ack(flags: &Flags, cfg: &AppConfig) -> Result<String, CliError> {
    const USE: &str = "Uso: proof ack --job <ID> --response <FILE.tsr> [--ca <FILE.pem>]";
    let job_id = flags.require("job", USE)?;
    let response = read_der(Path::new(flags.require("response", USE)?))?;
    let anchor = flags.get("ca").map(|p| TrustAnchor::from_file(Path::new(p))).transpose()?;
    let view = machine(cfg, InMemoryJobSource::new())?.acknowledge(job_id, &response, anchor.as_ref())?;
    pretty(&view)
}

fn status(flags: &Flags, cfg: &AppConfig) -> Result<String, CliError> {
    let job_id = flags.require("job", "Uso: proof status --job <ID>")?;
    pretty(&machine(cfg, InMemoryJobSource::new())?.status(job_id)?)
}

fn resolve(flags: &Flags, cfg: &AppConfig) -> Result<String, CliError> {
    let reference = flags.require("ref", "Uso: proof resolve --ref <JOB_ID|DIGEST>")?;
    pretty(&machine(cfg, InMemoryJobSource::new())?.resolve(reference)?)
}

fn purge(flags: &Flags, cfg: &AppConfig) -> Result<String, CliError> {
    let job_id = flags.require("job", "Uso: proof purge --job <ID>")?;
    if open_store(cfg)?.purge(job_id)? {
        info!("proof purged job_id={job_id}");
        Ok(format!("purgado: {job_id}"))
    } else {
        Err(proof_core::ProofError::NotFound(job_id.to_string()).into())
    }
}

fn migrate(flags: &Flags, cfg: &AppConfig) -> Result<String, CliError> {
    let from = flags.get("from").map(PathBuf::from).unwrap_or_else(|| cfg.proof.dir.clone());
    if cfg.proof.store == StoreKind::File && from == cfg.proof.dir {
        warn!("migrate: origen y destino son el mismo directorio ({})", from.display());
    }
    let target = open_store(cfg)?;
    let report = import_legacy_dir(&from, &target)?;
    let text = pretty(&json!({
        "migrated": report.migrated,
        "skipped": report.skipped.iter().map(|(p, why)| json!({"file": p.display().to_string(), "reason": why})).collect::<Vec<_>>(),
        "failed": report.failed.iter().map(|(p, why)| json!({"file": p.display().to_string(), "error": why})).collect::<Vec<_>>(),
    }))?;
    if report.is_clean() {
        Ok(text)
    } else {
        Err(CliError::Input(format!("migración con {} errores\n{text}", report.failed.len())))
    }
}

fn sim_respond(flags: &Flags) -> Result<String, CliError> {
    const USE: &str = "Uso: proof sim-respond --request <FILE.tsq> --out <FILE.tsr> [--seed <N>] [--ca-out <FILE.pem>]";
    let request = read_der(Path::new(flags.require("request", USE)?))?;
    let out = flags.require("out", USE)?;
    let seed = match flags.get("seed") {
        Some(s) => s.parse::<u8>().map_err(|_| CliError::Usage(format!("--seed debe ser 0..=255: {s}")))?,
        None => 1,
    };
    let sim = TsaSimulator::new(seed)?;
    write_file(Path::new(out), &sim.respond(&request))?;
    if let Some(ca_out) = flags.get("ca-out") {
        write_file(Path::new(ca_out), sim.ca_pem().as_bytes())?;
    }
    Ok(format!("respuesta escrita en {out} (seed={seed})"))
}
