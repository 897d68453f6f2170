//! Proveedor nativo: request y verificación en Rust puro (firmas ECDSA P-256
//! y Ed25519).
//!
//! Pasos de `verify`:
//! 1. Reconstruir el request desde el digest guardado.
//! 2. Decodificar la respuesta y exigir estado granted.
//! 3. Comparar MessageImprint (algoritmo + hash) y ausencia de nonce.
//! 4. Validar atributos firmados, firma del TSA y cadena hasta un ancla: el
//!    firmante con extKeyUsage crítico timeStamping, emisores con cA=TRUE y
//!    todos los certificados vigentes en genTime.
//! 5. Extraer tiempo, política y serial.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use sha2::{Digest, Sha256};

use super::cert::Certificate;
use super::der::oid_to_string;
use super::request::{build_request, parse_request, ParsedRequest, TimestampRequest};
use super::response::{parse_response, SignedToken, STATUS_GRANTED, STATUS_GRANTED_WITH_MODS};
use super::{TimestampProtocol, TrustAnchor, VerificationOutcome};
use crate::constants::{MAX_CHAIN_DEPTH, OID_SHA256, OID_TST_INFO};
use crate::errors::ProofError;

#[derive(Debug, Clone, Default)]
pub struct NativeProtocol {
    default_anchors: Vec<Certificate>,
}

impl NativeProtocol {
    /// Sin anclas por defecto: toda verificación necesita un ancla explícita.
    pub fn new() -> Self {
        Self::default()
    }

    /// Usa `anchor` cuando el llamador no provee uno propio.
    pub fn with_default_anchor(anchor: &TrustAnchor) -> Result<Self, ProofError> {
        Ok(Self { default_anchors: anchor.certificates()? })
    }
}

impl TimestampProtocol for NativeProtocol {
    fn name(&self) -> &'static str {
        "native"
    }

    fn build_request(&self, digest_hex: &str) -> Result<TimestampRequest, ProofError> {
        build_request(digest_hex)
    }

    fn verify(&self, response: &[u8], digest_hex: &str, trust_anchor: Option<&TrustAnchor>) -> Result<VerificationOutcome, ProofError> {
        let token = inspect(response, digest_hex)?;
        let anchors = match trust_anchor {
            Some(anchor) => anchor.certificates()?,
            None => self.default_anchors.clone(),
        };
        check_signature(&token, &anchors)?;
        let outcome = outcome_of(&token);
        debug!("verify:ok digest={digest_hex} serial={} time={}", outcome.serial, outcome.asserted_time);
        Ok(outcome)
    }
}

/// Pasos 1–3: estructura e imprint. Compartido con el proveedor OpenSSL para
/// que malformación y manipulación sigan siendo distinguibles.
pub(crate) fn inspect(response: &[u8], digest_hex: &str) -> Result<SignedToken, ProofError> {
    let request = build_request(digest_hex)?;
    let expected = parse_request(request.as_der()).map_err(|e| ProofError::InvalidDigest(e.to_string()))?;

    let parsed = parse_response(response).map_err(|e| ProofError::MalformedResponse(e.to_string()))?;
    if parsed.status != STATUS_GRANTED && parsed.status != STATUS_GRANTED_WITH_MODS {
        return Err(ProofError::MalformedResponse(format!(
            "TSA did not grant the request (status {}{})",
            parsed.status,
            parsed.status_text.map(|t| format!(": {t}")).unwrap_or_default()
        )));
    }
    let token = parsed.token.ok_or_else(|| ProofError::MalformedResponse("granted response without token".into()))?;
    check_imprint(&token, &expected, request.digest_hex())?;
    Ok(token)
}

fn check_imprint(token: &SignedToken, expected: &ParsedRequest, digest_hex: &str) -> Result<(), ProofError> {
    let tst = &token.tst_info;
    let mismatch = |found: String| ProofError::DigestMismatch { expected: digest_hex.to_string(), found };
    if tst.hash_algorithm != expected.hash_algorithm {
        warn!("tsa imprint algorithm mismatch digest={digest_hex}");
        return Err(mismatch(format!("hash algorithm {}", oid_to_string(&tst.hash_algorithm))));
    }
    if tst.hashed_message != expected.hashed_message {
        warn!("tsa imprint mismatch (possible tamper) expected={digest_hex}");
        return Err(mismatch(hex::encode(&tst.hashed_message)));
    }
    if tst.nonce != expected.nonce {
        warn!("tsa nonce mismatch digest={digest_hex}");
        return Err(mismatch("unexpected nonce".into()));
    }
    Ok(())
}

fn check_signature(token: &SignedToken, anchors: &[Certificate]) -> Result<(), ProofError> {
    if anchors.is_empty() {
        return Err(ProofError::SignatureInvalid("no trust anchor available".into()));
    }
    let signer = &token.signer;
    let signer_cert = token
        .certificates
        .iter()
        .find(|c| signer.sid_serial.as_deref().map_or(true, |serial| c.serial() == serial))
        .ok_or_else(|| ProofError::SignatureInvalid("signer certificate not included in token".into()))?;

    let message: &[u8] = match &signer.signed_attrs {
        Some(attrs) => {
            if signer.digest_algorithm != OID_SHA256 {
                return Err(ProofError::SignatureInvalid(format!(
                    "unsupported digest algorithm {}",
                    oid_to_string(&signer.digest_algorithm)
                )));
            }
            if signer.content_type.as_deref() != Some(OID_TST_INFO) {
                return Err(ProofError::SignatureInvalid("content-type attribute is not TSTInfo".into()));
            }
            let content_digest = Sha256::digest(&token.tst_info_der);
            if signer.message_digest.as_deref() != Some(content_digest.as_slice()) {
                return Err(ProofError::SignatureInvalid("message-digest attribute does not cover TSTInfo".into()));
            }
            attrs
        }
        None => &token.tst_info_der,
    };

    signer_cert.subject_key()?.verify(&signer.signature_algorithm, message, &signer.signature)?;

    if !signer_cert.is_time_stamping_signer() {
        return Err(ProofError::SignatureInvalid("signer certificate lacks critical extKeyUsage id-kp-timeStamping".into()));
    }
    check_chain(signer_cert, &token.certificates, anchors, &token.tst_info.gen_time)
}

fn describe(cert: &Certificate) -> String {
    cert.subject_common_name().unwrap_or_else(|| hex::encode(cert.serial()))
}

fn check_valid_at(cert: &Certificate, at: &DateTime<Utc>) -> Result<(), ProofError> {
    if cert.is_valid_at(at) {
        return Ok(());
    }
    Err(ProofError::SignatureInvalid(format!("certificate {} not valid at {at}", describe(cert))))
}

fn check_issuer(issuer: &Certificate, at: &DateTime<Utc>) -> Result<(), ProofError> {
    if !issuer.is_ca() {
        return Err(ProofError::SignatureInvalid(format!("issuer {} is not a CA (basicConstraints)", describe(issuer))));
    }
    check_valid_at(issuer, at)
}

/// Recorre la cadena desde el firmante: cada eslabón vigente en `at` y
/// emitido por una CA, hasta un ancla (por igualdad o por emisión).
fn check_chain(leaf: &Certificate, embedded: &[Certificate], anchors: &[Certificate], at: &DateTime<Utc>) -> Result<(), ProofError> {
    let mut current = leaf;
    for _ in 0..MAX_CHAIN_DEPTH {
        check_valid_at(current, at)?;
        if anchors.iter().any(|a| a.der() == current.der()) {
            return Ok(());
        }
        if let Some(anchor) = anchors.iter().find(|a| current.verify_issued_by(a).is_ok()) {
            return check_issuer(anchor, at);
        }
        match embedded.iter().find(|c| c.der() != current.der() && current.verify_issued_by(c).is_ok()) {
            Some(next) => {
                check_issuer(next, at)?;
                current = next;
            }
            None => break,
        }
    }
    Err(ProofError::SignatureInvalid("certificate chain does not reach a trust anchor".into()))
}

pub(crate) fn outcome_of(token: &SignedToken) -> VerificationOutcome {
    VerificationOutcome {
        asserted_time: token.tst_info.gen_time,
        policy: oid_to_string(&token.tst_info.policy),
        serial: hex::encode(&token.tst_info.serial),
    }
}
