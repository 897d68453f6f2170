use std::fs;
use std::sync::Arc;
use std::thread;

use proof_core::{InMemoryJobSource, NativeProtocol, ProofError, ProofMachine, ProofStatus, ProofStore, TsaSimulator};
use proof_persistence::FileProofStore;
use serde_json::json;

fn d(c: char) -> String {
    c.to_string().repeat(64)
}

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let store = FileProofStore::open(dir.path()).expect("open");
        store.init("J1", &d('a')).expect("init");
        store.mark_verified("J1", &d('a'), None).expect("verify");
        store.init("J2", &d('b')).expect("init");
    }
    let store = FileProofStore::open(dir.path()).expect("reopen");
    assert_eq!(store.list_ids().expect("ids"), vec!["J1".to_string(), "J2".to_string()]);
    assert_eq!(store.load("J1").expect("load").expect("J1").status, ProofStatus::Verified);
    assert_eq!(store.load("J2").expect("load").expect("J2").status, ProofStatus::Pending);
}

#[test]
fn no_temporaries_left_behind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileProofStore::open(dir.path()).expect("open");
    for c in ['a', 'b', 'c'] {
        store.init("J", &d(c)).expect("init");
    }
    let names: Vec<String> =
        fs::read_dir(dir.path()).expect("ls").map(|e| e.expect("entry").file_name().to_string_lossy().into_owned()).collect();
    assert_eq!(names, vec!["J.proof.json".to_string()]);
}

#[test]
fn orphan_temporary_from_crash_is_ignored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileProofStore::open(dir.path()).expect("open");
    store.init("J", &d('a')).expect("init");
    // escritura interrumpida antes del rename
    fs::write(dir.path().join(".J.deadbeef.tmp"), b"{\"job_id\":\"J\",\"manif").expect("orphan");
    assert_eq!(store.list_ids().expect("ids"), vec!["J".to_string()]);
    assert_eq!(store.load("J").expect("load").expect("record").manifest_digest, d('a'));
}

#[test]
fn corrupt_record_is_reported_and_recoverable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileProofStore::open(dir.path()).expect("open");
    fs::write(store.path_for("J"), b"{not json").expect("corrupt");
    assert!(matches!(store.load("J"), Err(ProofError::StorageCorrupt { .. })));
    assert!(matches!(store.mark_verified("J", &d('a'), None), Err(ProofError::StorageCorrupt { .. })));

    let rec = store.init("J", &d('a')).expect("re-init recovers");
    assert_eq!(rec.status, ProofStatus::Pending);
    assert_eq!(store.load("J").expect("load").expect("record").manifest_digest, d('a'));
}

#[test]
fn legacy_file_is_readable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileProofStore::open(dir.path()).expect("open");
    let legacy = json!({"job_id": "OLD", "status": "TSA_OK", "manifest_sha256": d('C'), "tsa_ok": true});
    fs::write(store.path_for("OLD"), legacy.to_string()).expect("write");
    let rec = store.load("OLD").expect("load").expect("record");
    assert!(rec.verified);
    assert_eq!(rec.manifest_digest, d('c'));
    // sigue siendo idempotente sobre el registro viejo
    assert!(store.mark_verified("OLD", &d('c'), None).expect("noop").verified);
}

#[test]
fn purge_removes_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileProofStore::open(dir.path()).expect("open");
    store.init("J", &d('a')).expect("init");
    assert!(store.purge("J").expect("purge"));
    assert!(store.load("J").expect("load").is_none());
    assert!(!store.purge("J").expect("second purge"));
}

#[test]
fn concurrent_init_and_verify_same_job() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(FileProofStore::open(dir.path()).expect("open"));
    store.init("J", &d('a')).expect("init");

    thread::scope(|s| {
        for i in 0..8 {
            let store = Arc::clone(&store);
            s.spawn(move || {
                if i % 2 == 0 {
                    let _ = store.mark_verified("J", &d('a'), None);
                } else {
                    let _ = store.init("J", &d('a'));
                }
            });
        }
    });
    let rec = store.load("J").expect("load").expect("record");
    assert_eq!(rec.status, ProofStatus::Verified);
    assert!(matches!(store.init("J", &d('b')), Err(ProofError::AlreadyVerified { .. })));
}

#[test]
fn machine_over_file_store_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sim = TsaSimulator::new(31).expect("simulator");
    let jobs = InMemoryJobSource::new();
    jobs.insert("J1", json!({"b": ["é", "x"], "a": "café"}));
    let m = ProofMachine::new(FileProofStore::open(dir.path()).expect("open"), jobs, NativeProtocol::new())
        .with_default_anchor(sim.trust_anchor());

    let init = m.initialize_proof("J1").expect("init");
    m.acknowledge("J1", &sim.respond(&init.request_der), None).expect("ack");

    let reopened = FileProofStore::open(dir.path()).expect("reopen");
    let rec = reopened.load("J1").expect("load").expect("record");
    assert!(rec.verified);
    assert_eq!(rec.manifest_digest, init.digest_hex);
    assert_eq!(rec.timestamp.expect("timestamp").policy, "1.3.6.1.4.1.55555.1.1");
}
