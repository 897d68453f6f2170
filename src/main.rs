//! Demo de punta a punta: un job pasa por el registro, se sella su manifest
//! contra el TSA simulado y el gate lo libera.

use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info};
use proof_core::TsaSimulator;
use proofchain_rust::errors::CoreError;
use proofchain_rust::jobs::{JobRegistry, JobStatus, NewJob};
use proofchain_rust::{startup, wiring, CONFIG};
use serde_json::json;

fn run_demo() -> Result<(), CoreError> {
    let cfg = &*CONFIG;
    startup::run(cfg);

    let registry = Arc::new(JobRegistry::new());
    let machine = wiring::build_machine(cfg, Arc::clone(&registry))?;
    let tsa = TsaSimulator::new(7)?;

    // 1) alta y procesamiento del job
    let job = registry.create(NewJob { profile: json!({"res": "2K", "shape": "FLAT"}), ..Default::default() })?;
    let work = registry.next_job().ok_or_else(|| CoreError::Internal("no hay jobs en cola".into()))?;
    let manifest = json!({
        "job_id": work.job_id,
        "profile": work.profile,
        "outputs": {"dcp": format!("s3://dcp/{}/", work.job_id)},
        "qc": {"audio_lufs": -23.5, "video_issues": 0},
        "proof": {},
    });
    registry.update_job(&work.job_id, manifest, JobStatus::Pass)?;
    println!("[demo] job {} -> {:?}", job.job_id, machine.public_manifest(&job.job_id)?);

    // 2) prueba: request -> TSA -> ack
    let init = machine.initialize_proof(&job.job_id)?;
    println!("[demo] digest={} request={}B", init.digest_hex, init.request_der.len());
    let response = tsa.respond(&init.request_der);
    let view = machine.acknowledge(&job.job_id, &response, Some(&tsa.trust_anchor()))?;
    println!("[demo] status={} timestamp={:?}", view.status, view.timestamp);

    // 3) verificación pública y gate
    let public = machine.resolve(&init.digest_hex.to_ascii_uppercase())?;
    println!("[demo] resolve por digest -> {}", serde_json::to_string(&public).unwrap_or_default());
    let disclosure = machine.public_manifest(&job.job_id)?;
    info!("gate unlocked={}", disclosure.is_unlocked());
    println!("[demo] manifest liberado: {}", serde_json::to_string(&disclosure).unwrap_or_default());
    Ok(())
}

fn main() -> ExitCode {
    proofchain_rust::init_logging();
    match run_demo() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("demo failed: {e}");
            ExitCode::FAILURE
        }
    }
}
