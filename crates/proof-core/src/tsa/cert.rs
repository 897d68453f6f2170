//! Certificados X.509 mínimos (sólo lo necesario para validar la cadena del
//! TSA) y lectura de bundles PEM.

use chrono::{DateTime, Utc};
use ed25519_dalek::Signature as Ed25519Signature;
use p256::ecdsa::signature::Verifier as _;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::CertificateDer;

use super::der::{self, DerError, DerReader};
use super::request::read_algorithm;
use crate::constants::{
    OID_BASIC_CONSTRAINTS, OID_COMMON_NAME, OID_EC_PUBLIC_KEY, OID_ECDSA_SHA256, OID_ED25519, OID_EXT_KEY_USAGE, OID_KP_TIME_STAMPING,
    OID_P256,
};
use crate::errors::ProofError;

/// extKeyUsage tal como viene en el certificado.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ExtKeyUsage {
    purposes: Vec<Vec<u64>>,
    critical: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    tbs: Vec<u8>,
    serial: Vec<u8>,
    issuer: Vec<u8>,
    subject: Vec<u8>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    key_algorithm: Vec<u64>,
    key_curve: Option<Vec<u64>>,
    public_key: Vec<u8>,
    signature_algorithm: Vec<u64>,
    signature: Vec<u8>,
    is_ca: bool,
    ext_key_usage: Option<ExtKeyUsage>,
}

/// Clave pública del sujeto, lista para verificar firmas.
#[derive(Debug, Clone)]
pub enum SubjectKey {
    Ed25519(ed25519_dalek::VerifyingKey),
    P256(p256::ecdsa::VerifyingKey),
}

pub(crate) fn read_bit_string<'a>(r: &mut DerReader<'a>) -> Result<&'a [u8], DerError> {
    match r.read(der::tag::BIT_STRING)?.content {
        [0x00, rest @ ..] => Ok(rest),
        _ => Err(DerError::Invalid("bit string")),
    }
}

// AlgorithmIdentifier de la SPKI: el parámetro de EC es la curva.
fn read_key_algorithm(r: &mut DerReader<'_>) -> Result<(Vec<u64>, Option<Vec<u64>>), DerError> {
    let mut alg = r.read_sequence()?;
    let oid = alg.read_oid()?;
    let curve = match alg.peek_tag() {
        Some(der::tag::OID) => Some(alg.read_oid()?),
        Some(_) => {
            alg.read_any()?;
            None
        }
        None => None,
    };
    alg.finish("AlgorithmIdentifier")?;
    Ok((oid, curve))
}

fn parse_basic_constraints(value: &[u8]) -> Result<bool, DerError> {
    let mut outer = DerReader::new(value);
    let mut bc = outer.read_sequence()?;
    outer.finish("BasicConstraints")?;
    if bc.peek_tag() == Some(der::tag::BOOLEAN) {
        return bc.read_bool();
    }
    Ok(false)
}

fn parse_ext_key_usage(value: &[u8]) -> Result<Vec<Vec<u64>>, DerError> {
    let mut outer = DerReader::new(value);
    let mut seq = outer.read_sequence()?;
    outer.finish("ExtKeyUsageSyntax")?;
    let mut purposes = Vec::new();
    while !seq.is_empty() {
        purposes.push(seq.read_oid()?);
    }
    Ok(purposes)
}

impl Certificate {
    pub fn from_der(bytes: &[u8]) -> Result<Self, DerError> {
        let mut outer = DerReader::new(bytes);
        let cert = outer.read(der::tag::SEQUENCE)?;
        outer.finish("Certificate")?;

        let mut c = cert.reader();
        let tbs = c.read(der::tag::SEQUENCE)?;
        let signature_algorithm = read_algorithm(&mut c)?;
        let signature = read_bit_string(&mut c)?.to_vec();
        c.finish("Certificate")?;

        let mut t = tbs.reader();
        t.read_optional(der::tag::context(0, true))?;
        let serial = t.read_integer()?.to_vec();
        read_algorithm(&mut t)?;
        let issuer = t.read(der::tag::SEQUENCE)?.raw.to_vec();
        let mut validity = t.read_sequence()?;
        let not_before = validity.read_time()?;
        let not_after = validity.read_time()?;
        validity.finish("Validity")?;
        let subject = t.read(der::tag::SEQUENCE)?.raw.to_vec();
        let mut spki = t.read_sequence()?;
        let (key_algorithm, key_curve) = read_key_algorithm(&mut spki)?;
        let public_key = read_bit_string(&mut spki)?.to_vec();
        spki.finish("SubjectPublicKeyInfo")?;
        t.read_optional(der::tag::context(1, false))?;
        t.read_optional(der::tag::context(2, false))?;

        let mut is_ca = false;
        let mut ext_key_usage = None;
        if let Some(wrapper) = t.read_optional(der::tag::context(3, true))? {
            let mut w = wrapper.reader();
            let mut exts = w.read_sequence()?;
            w.finish("Extensions")?;
            while !exts.is_empty() {
                let mut ext = exts.read_sequence()?;
                let id = ext.read_oid()?;
                let critical = if ext.peek_tag() == Some(der::tag::BOOLEAN) { ext.read_bool()? } else { false };
                let value = ext.read_octet_string()?;
                ext.finish("Extension")?;
                if id == OID_BASIC_CONSTRAINTS {
                    is_ca = parse_basic_constraints(value)?;
                } else if id == OID_EXT_KEY_USAGE {
                    ext_key_usage = Some(ExtKeyUsage { purposes: parse_ext_key_usage(value)?, critical });
                }
            }
        }
        t.finish("TBSCertificate")?;

        Ok(Self {
            der: bytes.to_vec(),
            tbs: tbs.raw.to_vec(),
            serial,
            issuer,
            subject,
            not_before,
            not_after,
            key_algorithm,
            key_curve,
            public_key,
            signature_algorithm,
            signature,
            is_ca,
            ext_key_usage,
        })
    }

    pub fn der(&self) -> &[u8] { &self.der }
    pub fn serial(&self) -> &[u8] { &self.serial }
    pub fn issuer(&self) -> &[u8] { &self.issuer }
    pub fn subject(&self) -> &[u8] { &self.subject }

    pub fn subject_common_name(&self) -> Option<String> {
        common_name(&self.subject)
    }

    pub fn is_valid_at(&self, t: &DateTime<Utc>) -> bool {
        self.not_before <= *t && *t <= self.not_after
    }

    /// basicConstraints con cA=TRUE.
    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    /// RFC 3161 §2.3: extKeyUsage crítico con id-kp-timeStamping como único uso.
    pub fn is_time_stamping_signer(&self) -> bool {
        match &self.ext_key_usage {
            Some(eku) => eku.critical && eku.purposes.len() == 1 && eku.purposes[0] == OID_KP_TIME_STAMPING,
            None => false,
        }
    }

    pub fn subject_key(&self) -> Result<SubjectKey, ProofError> {
        if self.key_algorithm == OID_ED25519 {
            let raw: [u8; 32] = self
                .public_key
                .as_slice()
                .try_into()
                .map_err(|_| ProofError::SignatureInvalid("ed25519 key must be 32 bytes".into()))?;
            let key = ed25519_dalek::VerifyingKey::from_bytes(&raw)
                .map_err(|e| ProofError::SignatureInvalid(format!("bad ed25519 key: {e}")))?;
            return Ok(SubjectKey::Ed25519(key));
        }
        if self.key_algorithm == OID_EC_PUBLIC_KEY && self.key_curve.as_deref() == Some(OID_P256) {
            let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(&self.public_key)
                .map_err(|e| ProofError::SignatureInvalid(format!("bad P-256 key: {e}")))?;
            return Ok(SubjectKey::P256(key));
        }
        Err(ProofError::SignatureInvalid(format!(
            "unsupported key algorithm {}",
            der::oid_to_string(&self.key_algorithm)
        )))
    }

    /// Verifica que `issuer` emitió este certificado (nombre + firma).
    pub fn verify_issued_by(&self, issuer: &Certificate) -> Result<(), ProofError> {
        if self.issuer != issuer.subject {
            return Err(ProofError::SignatureInvalid("issuer name does not match".into()));
        }
        issuer.subject_key()?.verify(&self.signature_algorithm, &self.tbs, &self.signature)
    }
}

impl SubjectKey {
    /// `algorithm` es el OID declarado junto a la firma; debe casar con la clave.
    pub fn verify(&self, algorithm: &[u64], message: &[u8], signature: &[u8]) -> Result<(), ProofError> {
        let unsupported = || ProofError::SignatureInvalid(format!("unsupported signature algorithm {}", der::oid_to_string(algorithm)));
        match self {
            Self::Ed25519(key) => {
                if algorithm != OID_ED25519 {
                    return Err(unsupported());
                }
                let sig = Ed25519Signature::from_slice(signature)
                    .map_err(|e| ProofError::SignatureInvalid(format!("bad signature encoding: {e}")))?;
                key.verify_strict(message, &sig)
                    .map_err(|_| ProofError::SignatureInvalid("signature verification failed".into()))
            }
            Self::P256(key) => {
                // algunos TSAs declaran la clave (id-ecPublicKey) en vez del esquema
                if algorithm != OID_ECDSA_SHA256 && algorithm != OID_EC_PUBLIC_KEY {
                    return Err(unsupported());
                }
                let sig = p256::ecdsa::Signature::from_der(signature)
                    .map_err(|e| ProofError::SignatureInvalid(format!("bad signature encoding: {e}")))?;
                key.verify(message, &sig)
                    .map_err(|_| ProofError::SignatureInvalid("signature verification failed".into()))
            }
        }
    }
}

fn common_name(name: &[u8]) -> Option<String> {
    let mut outer = DerReader::new(name);
    let mut rdns = outer.read_sequence().ok()?;
    while !rdns.is_empty() {
        let mut rdn = rdns.read(der::tag::SET).ok()?.reader();
        while !rdn.is_empty() {
            let mut atv = rdn.read_sequence().ok()?;
            let oid = atv.read_oid().ok()?;
            let value = atv.read_any().ok()?;
            if oid == OID_COMMON_NAME {
                return std::str::from_utf8(value.content).ok().map(str::to_owned);
            }
        }
    }
    None
}

/// Decodifica todos los certificados de un bundle PEM. Las secciones que no
/// son `CERTIFICATE` y el texto fuera de los bloques se ignoran.
pub fn parse_pem_bundle(pem: &str) -> Result<Vec<Certificate>, ProofError> {
    let certs = CertificateDer::pem_slice_iter(pem.as_bytes())
        .map(|item| {
            let der = item.map_err(|e| ProofError::SignatureInvalid(format!("trust anchor: bad PEM: {e}")))?;
            Certificate::from_der(&der).map_err(|e| ProofError::SignatureInvalid(format!("trust anchor: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(ProofError::SignatureInvalid("trust anchor: no certificate found".into()));
    }
    Ok(certs)
}
