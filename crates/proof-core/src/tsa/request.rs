//! Construcción determinista del TimeStampReq (RFC 3161).
//!
//! El request depende exclusivamente del digest: versión 1, MessageImprint
//! SHA-256 (con parámetros NULL), `certReq = TRUE`, sin nonce ni política.
//! Los bytes coinciden con `openssl ts -query -sha256 -digest <hex> -cert
//! -no_nonce`, de modo que el verificador puede reconstruirlo desde el digest
//! guardado sin conservar el request original.

use super::der::{self, DerError, DerReader};
use crate::constants::{OID_SHA256, TSP_VERSION};
use crate::errors::ProofError;
use crate::hashing::parse_digest_hex;

/// Request DER listo para enviar al TSA, junto al digest del que deriva.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampRequest {
    digest_hex: String,
    der: Vec<u8>,
}

impl TimestampRequest {
    /// Envuelve bytes producidos por otro proveedor (p.ej. OpenSSL).
    pub fn from_der(digest_hex: String, der: Vec<u8>) -> Self {
        Self { digest_hex, der }
    }
    pub fn digest_hex(&self) -> &str { &self.digest_hex }
    pub fn as_der(&self) -> &[u8] { &self.der }
    pub fn into_der(self) -> Vec<u8> { self.der }
}

/// Construye el request para `digest_hex` (64 hex). Puro: sin reloj ni azar.
pub fn build_request(digest_hex: &str) -> Result<TimestampRequest, ProofError> {
    let (lower, raw) = parse_digest_hex(digest_hex)?;
    let der = der::sequence(&[der::uint(TSP_VERSION), message_imprint(&raw), der::boolean(true)]);
    Ok(TimestampRequest { digest_hex: lower, der })
}

pub(crate) fn sha256_algorithm() -> Vec<u8> {
    der::sequence(&[der::oid(OID_SHA256), der::null()])
}

pub(crate) fn message_imprint(hashed: &[u8]) -> Vec<u8> {
    der::sequence(&[sha256_algorithm(), der::octet_string(hashed)])
}

/// AlgorithmIdentifier: OID y parámetros opcionales (NULL o ausentes).
pub(crate) fn read_algorithm(r: &mut DerReader<'_>) -> Result<Vec<u64>, DerError> {
    let mut alg = r.read_sequence()?;
    let oid = alg.read_oid()?;
    // Los parámetros no se interpretan; sólo se toleran.
    if !alg.is_empty() {
        alg.read_any()?;
    }
    alg.finish("AlgorithmIdentifier")?;
    Ok(oid)
}

/// MessageImprint: (algoritmo, hash).
pub(crate) fn read_message_imprint<'a>(r: &mut DerReader<'a>) -> Result<(Vec<u64>, &'a [u8]), DerError> {
    let mut mi = r.read_sequence()?;
    let alg = read_algorithm(&mut mi)?;
    let hashed = mi.read_octet_string()?;
    mi.finish("MessageImprint")?;
    Ok((alg, hashed))
}

/// Campos de un TimeStampReq decodificado (lado TSA / diagnóstico).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub hash_algorithm: Vec<u64>,
    pub hashed_message: Vec<u8>,
    pub policy: Option<Vec<u64>>,
    pub nonce: Option<Vec<u8>>,
    pub cert_req: bool,
}

pub fn parse_request(bytes: &[u8]) -> Result<ParsedRequest, DerError> {
    let mut outer = DerReader::new(bytes);
    let mut req = outer.read_sequence()?;
    outer.finish("TimeStampReq")?;
    if req.read_small_uint()? != TSP_VERSION {
        return Err(DerError::Invalid("TimeStampReq version"));
    }
    let (hash_algorithm, hashed) = read_message_imprint(&mut req)?;
    let policy = match req.read_optional(der::tag::OID)? {
        Some(tlv) => Some(der::decode_oid(tlv.content)?),
        None => None,
    };
    let nonce = req.read_optional(der::tag::INTEGER)?.map(|tlv| tlv.content.to_vec());
    let cert_req = match req.peek_tag() {
        Some(der::tag::BOOLEAN) => req.read_bool()?,
        _ => false,
    };
    // extensions [0] IMPLICIT: se ignoran
    req.read_optional(der::tag::context(0, true))?;
    req.finish("TimeStampReq")?;
    Ok(ParsedRequest { hash_algorithm, hashed_message: hashed.to_vec(), policy, nonce, cert_req })
}
