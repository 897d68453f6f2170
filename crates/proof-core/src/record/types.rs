use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ProofError;
use crate::hashing::parse_digest_hex;
use crate::tsa::VerificationOutcome;

/// Longitud máxima aceptada para un job id usado como clave de registro.
pub const MAX_JOB_ID_LEN: usize = 128;

/// Estado de la prueba. `TSA_OK` es el nombre histórico de `VERIFIED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProofStatus {
    #[default]
    Pending,
    #[serde(alias = "TSA_OK")]
    Verified,
}

impl ProofStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Verified => "VERIFIED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "VERIFIED" | "TSA_OK" => Some(Self::Verified),
            _ => None,
        }
    }
}

impl fmt::Display for ProofStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registro persistido por job. Campos desconocidos se ignoran al leer y se
/// aceptan los nombres heredados (`manifest_sha256`, `tsa_ok`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRecord {
    #[serde(default)]
    pub job_id: String,
    #[serde(alias = "manifest_sha256")]
    pub manifest_digest: String,
    #[serde(default)]
    pub status: ProofStatus,
    #[serde(default, alias = "tsa_ok")]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<VerificationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProofRecord {
    pub fn pending(job_id: &str, digest_hex: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            manifest_digest: digest_hex.to_string(),
            status: ProofStatus::Pending,
            verified: false,
            timestamp: None,
            updated_at: Some(Utc::now()),
        }
    }

    pub fn is_verified(&self) -> bool {
        self.status == ProofStatus::Verified
    }

    /// Ajusta un registro recién leído: completa el job id desde la clave,
    /// normaliza el digest a minúsculas y unifica `status`/`verified`
    /// (registros viejos pueden traer sólo uno de los dos).
    pub fn normalized(mut self, key: &str) -> Self {
        if self.job_id.is_empty() {
            self.job_id = key.to_string();
        }
        self.manifest_digest = self.manifest_digest.to_ascii_lowercase();
        if self.verified || self.status == ProofStatus::Verified {
            self.verified = true;
            self.status = ProofStatus::Verified;
        }
        self
    }
}

/// Resultado de aplicar una transición: el registro final y si hay que
/// escribirlo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub record: ProofRecord,
    pub changed: bool,
}

impl Transition {
    fn unchanged(record: ProofRecord) -> Self {
        Self { record, changed: false }
    }

    fn write(record: ProofRecord) -> Self {
        Self { record, changed: true }
    }
}

/// Un job id se usa como nombre de archivo y clave primaria: sólo ASCII
/// alfanumérico, `-`, `_` y `.` (sin empezar por punto).
pub fn validate_job_id(job_id: &str) -> Result<(), ProofError> {
    let ok = !job_id.is_empty()
        && job_id.len() <= MAX_JOB_ID_LEN
        && !job_id.starts_with('.')
        && job_id.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if ok {
        Ok(())
    } else {
        Err(ProofError::InvalidJobId(job_id.to_string()))
    }
}

/// Transición de `init`, común a todos los backends.
///
/// - sin registro: PENDING con el digest.
/// - PENDING: actualiza el digest (no-op si es el mismo).
/// - VERIFIED con el mismo digest: no-op.
/// - VERIFIED con otro digest: `AlreadyVerified`.
pub fn apply_init(existing: Option<ProofRecord>, job_id: &str, digest_hex: &str) -> Result<Transition, ProofError> {
    validate_job_id(job_id)?;
    let (digest, _) = parse_digest_hex(digest_hex)?;
    let Some(mut record) = existing else {
        return Ok(Transition::write(ProofRecord::pending(job_id, &digest)));
    };
    if record.manifest_digest == digest {
        return Ok(Transition::unchanged(record));
    }
    if record.is_verified() {
        return Err(ProofError::AlreadyVerified {
            job_id: job_id.to_string(),
            stored: record.manifest_digest,
            requested: digest,
        });
    }
    record.manifest_digest = digest;
    record.updated_at = Some(Utc::now());
    Ok(Transition::write(record))
}

/// Transición PENDING → VERIFIED, condicionada a que el digest guardado siga
/// siendo el verificado. Idempotente sobre registros ya verificados.
pub fn apply_verified(
    existing: Option<ProofRecord>,
    job_id: &str,
    expected_digest: &str,
    timestamp: Option<VerificationOutcome>,
) -> Result<Transition, ProofError> {
    let Some(mut record) = existing else {
        return Err(ProofError::NotInitialized(job_id.to_string()));
    };
    let expected = expected_digest.to_ascii_lowercase();
    if record.manifest_digest != expected {
        return Err(ProofError::DigestMismatch { expected, found: record.manifest_digest });
    }
    if record.is_verified() {
        return Ok(Transition::unchanged(record));
    }
    record.status = ProofStatus::Verified;
    record.verified = true;
    record.timestamp = timestamp;
    record.updated_at = Some(Utc::now());
    Ok(Transition::write(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(c: char) -> String {
        c.to_string().repeat(64)
    }

    #[test]
    fn status_serializes_screaming_and_accepts_legacy() {
        assert_eq!(serde_json::to_string(&ProofStatus::Verified).unwrap(), "\"VERIFIED\"");
        let legacy: ProofStatus = serde_json::from_str("\"TSA_OK\"").unwrap();
        assert_eq!(legacy, ProofStatus::Verified);
        assert_eq!(ProofStatus::parse("PENDING"), Some(ProofStatus::Pending));
        assert_eq!(ProofStatus::parse("VALID"), None);
    }

    #[test]
    fn legacy_record_loads_and_normalizes() {
        let raw = json!({"status": "TSA_OK", "manifest_sha256": d('A'), "tsa_ok": true, "fp_proof_id": "x"});
        let rec: ProofRecord = serde_json::from_value(raw).unwrap();
        let rec = rec.normalized("JOB-1");
        assert_eq!(rec.job_id, "JOB-1");
        assert_eq!(rec.manifest_digest, d('a'));
        assert!(rec.verified && rec.is_verified());
    }

    #[test]
    fn legacy_flag_alone_promotes_status() {
        let rec: ProofRecord = serde_json::from_value(json!({"job_id": "J", "manifest_sha256": d('b'), "tsa_ok": true})).unwrap();
        assert_eq!(rec.normalized("J").status, ProofStatus::Verified);
    }

    #[test]
    fn record_without_timestamp_omits_field() {
        let out = serde_json::to_value(ProofRecord::pending("J", &d('c'))).unwrap();
        assert!(out.get("timestamp").is_none());
        assert_eq!(out["status"], "PENDING");
        assert_eq!(out["verified"], false);
    }

    #[test]
    fn job_id_validation() {
        assert!(validate_job_id("J1").is_ok());
        assert!(validate_job_id("ABC-123_x.y").is_ok());
        for bad in ["", "../etc", ".hidden", "a/b", "a b", "é"] {
            assert!(matches!(validate_job_id(bad), Err(ProofError::InvalidJobId(_))), "{bad}");
        }
        assert!(validate_job_id(&"x".repeat(MAX_JOB_ID_LEN + 1)).is_err());
    }

    #[test]
    fn init_transitions() {
        let t = apply_init(None, "J", &d('A')).unwrap();
        assert!(t.changed);
        assert_eq!(t.record.manifest_digest, d('a'));

        let same = apply_init(Some(t.record.clone()), "J", &d('a')).unwrap();
        assert!(!same.changed);

        let moved = apply_init(Some(t.record), "J", &d('b')).unwrap();
        assert!(moved.changed);
        assert_eq!(moved.record.manifest_digest, d('b'));
        assert_eq!(moved.record.status, ProofStatus::Pending);
    }

    #[test]
    fn init_never_downgrades_verified() {
        let rec = apply_init(None, "J", &d('a')).unwrap().record;
        let verified = apply_verified(Some(rec), "J", &d('a'), None).unwrap().record;
        let again = apply_init(Some(verified.clone()), "J", &d('a')).unwrap();
        assert!(!again.changed && again.record.is_verified());
        let err = apply_init(Some(verified), "J", &d('b')).unwrap_err();
        assert!(matches!(err, ProofError::AlreadyVerified { .. }));
    }

    #[test]
    fn init_rejects_bad_input() {
        assert!(matches!(apply_init(None, "J", "abc"), Err(ProofError::InvalidDigest(_))));
        assert!(matches!(apply_init(None, "../x", &d('a')), Err(ProofError::InvalidJobId(_))));
    }

    #[test]
    fn verified_transitions() {
        assert!(matches!(apply_verified(None, "J", &d('a'), None), Err(ProofError::NotInitialized(_))));
        let rec = apply_init(None, "J", &d('a')).unwrap().record;
        let err = apply_verified(Some(rec.clone()), "J", &d('b'), None).unwrap_err();
        assert!(matches!(err, ProofError::DigestMismatch { .. }));

        let first = apply_verified(Some(rec), "J", &d('A'), None).unwrap();
        assert!(first.changed && first.record.verified);
        let second = apply_verified(Some(first.record.clone()), "J", &d('a'), None).unwrap();
        assert!(!second.changed);
        assert_eq!(second.record, first.record);
    }
}
