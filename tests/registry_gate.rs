use std::sync::Arc;

use proof_core::{InMemoryProofStore, JobDisclosure, NativeProtocol, ProofError, ProofMachine, ProofStatus, TsaSimulator};
use proofchain_rust::jobs::{JobRegistry, JobStatus, NewJob};
use serde_json::json;

fn setup() -> (Arc<JobRegistry>, ProofMachine<InMemoryProofStore, Arc<JobRegistry>, NativeProtocol>, TsaSimulator) {
    let registry = Arc::new(JobRegistry::new());
    let sim = TsaSimulator::new(11).expect("simulator");
    let machine = ProofMachine::new(InMemoryProofStore::new(), Arc::clone(&registry), NativeProtocol::new())
        .with_default_anchor(sim.trust_anchor());
    (registry, machine, sim)
}

fn finish_job(registry: &JobRegistry, job_id: &str) {
    registry.create(NewJob { job_id: Some(job_id.into()), ..Default::default() }).unwrap();
    let work = registry.next_job().unwrap();
    assert_eq!(work.job_id, job_id);
    registry
        .update_job(job_id, json!({"job_id": job_id, "outputs": {"dcp": "ok"}, "qc": {"video_issues": 0}, "proof": {}}), JobStatus::Pass)
        .unwrap();
}

#[test]
fn manifest_stays_locked_until_verified() {
    let (registry, machine, sim) = setup();
    finish_job(&registry, "J1");

    let locked = machine.public_manifest("J1").unwrap();
    assert_eq!(locked, JobDisclosure::Locked { job_id: "J1".into(), status: "PASS".into() });

    let init = machine.initialize_proof("J1").unwrap();
    assert!(!machine.public_manifest("J1").unwrap().is_unlocked());

    machine.acknowledge("J1", &sim.respond(&init.request_der), None).unwrap();
    match machine.public_manifest("J1").unwrap() {
        JobDisclosure::Unlocked(m) => assert_eq!(m["outputs"]["dcp"], "ok"),
        other => panic!("expected unlocked manifest, got {other:?}"),
    }
}

#[test]
fn locked_view_reports_lifecycle_status() {
    let (registry, machine, _sim) = setup();
    registry.create(NewJob { job_id: Some("Q".into()), ..Default::default() }).unwrap();
    assert_eq!(machine.public_manifest("Q").unwrap(), JobDisclosure::Locked { job_id: "Q".into(), status: "QUEUED".into() });
    registry.next_job().unwrap();
    assert_eq!(machine.public_manifest("Q").unwrap(), JobDisclosure::Locked { job_id: "Q".into(), status: "PROCESSING".into() });
}

#[test]
fn manifest_changed_after_verification_locks_again() {
    let (registry, machine, sim) = setup();
    finish_job(&registry, "J2");
    let init = machine.initialize_proof("J2").unwrap();
    machine.acknowledge("J2", &sim.respond(&init.request_der), None).unwrap();
    assert!(machine.public_manifest("J2").unwrap().is_unlocked());

    registry.update_job("J2", json!({"job_id": "J2", "outputs": {"dcp": "tampered"}}), JobStatus::Pass).unwrap();
    assert!(!machine.public_manifest("J2").unwrap().is_unlocked());

    // re-sellar el manifest nuevo sobre un registro VERIFIED no está permitido
    assert!(matches!(machine.initialize_proof("J2"), Err(ProofError::AlreadyVerified { .. })));
}

#[test]
fn unknown_job_is_reported() {
    let (_registry, machine, _sim) = setup();
    assert!(matches!(machine.initialize_proof("missing"), Err(ProofError::JobNotFound(_))));
    assert!(matches!(machine.public_manifest("missing"), Err(ProofError::JobNotFound(_))));
}

#[test]
fn public_resolution_by_digest_hides_manifest() {
    let (registry, machine, sim) = setup();
    finish_job(&registry, "J3");
    let init = machine.initialize_proof("J3").unwrap();
    machine.acknowledge("J3", &sim.respond(&init.request_der), None).unwrap();

    let public = machine.resolve(&format!("  {}  ", init.digest_hex.to_uppercase())).unwrap();
    assert_eq!(public.status, ProofStatus::Verified);
    assert_eq!(public.job_id.as_deref(), Some("J3"));
    let raw = serde_json::to_value(&public).unwrap();
    assert!(raw.get("outputs").is_none() && raw.get("manifest").is_none());
}
