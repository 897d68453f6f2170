//! TSA simulado, determinista, para tests, demo y pruebas locales.
//!
//! Emite con `rcgen` una CA raíz autofirmada y un certificado de TSA
//! (extKeyUsage crítico id-kp-timeStamping), opcionalmente a través de una
//! CA intermedia. Las claves se derivan de `seed`: el mismo seed produce la
//! misma CA en cualquier proceso. Por defecto firma con ECDSA P-256, que
//! también valida `openssl ts -verify`; Ed25519 queda como alternativa.
//!
//! Las respuestas llevan atributos firmados CMS: content-type,
//! message-digest y signing-certificate-v2.

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, SubsecRound, Utc};
use ed25519_dalek::Signer as _;
use p256::ecdsa::signature::Signer as _;
use p256::pkcs8::EncodePrivateKey as _;
use rcgen::{
    BasicConstraints, CertificateParams, CustomExtension, DistinguishedName, DnType, IsCa, KeyPair, KeyUsagePurpose, SerialNumber,
};
use sha2::{Digest, Sha256};

use super::cert::Certificate;
use super::der::{self, tag};
use super::request::{parse_request, sha256_algorithm};
use super::TrustAnchor;
use crate::constants::{
    OID_ATTR_CONTENT_TYPE, OID_ATTR_MESSAGE_DIGEST, OID_ATTR_SIGNING_CERTIFICATE_V2, OID_ECDSA_SHA256, OID_ED25519, OID_EXT_KEY_USAGE,
    OID_KP_TIME_STAMPING, OID_SHA256, OID_SIGNED_DATA, OID_TST_INFO,
};
use crate::errors::ProofError;

/// Política que el simulador declara en cada TSTInfo.
pub const SIMULATOR_POLICY: &[u64] = &[1, 3, 6, 1, 4, 1, 55555, 1, 1];

const CA_NAME: &str = "Proofchain Test Root CA";
const INTERMEDIATE_NAME: &str = "Proofchain Test Intermediate CA";
const TSA_NAME: &str = "Proofchain Test TSA";
const CA_SERIAL: u8 = 1;
const TSA_SERIAL: u8 = 2;
const INTERMEDIATE_SERIAL: u8 = 3;
const STATUS_REJECTION: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyAlgorithm {
    #[default]
    EcdsaP256,
    Ed25519,
}

/// CA intermedia entre la raíz y el TSA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntermediateProfile {
    /// basicConstraints cA=TRUE.
    pub is_ca: bool,
    /// Validez terminada en 2001.
    pub expired: bool,
}

impl Default for IntermediateProfile {
    fn default() -> Self {
        Self { is_ca: true, expired: false }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorBuilder {
    seed: u8,
    algorithm: KeyAlgorithm,
    time_stamping_usage: bool,
    intermediate: Option<IntermediateProfile>,
}

enum SimKey {
    P256(p256::SecretKey),
    Ed25519(ed25519_dalek::SigningKey),
}

pub struct TsaSimulator {
    tsa_key: SimKey,
    ca_pem: String,
    tsa_cert: Vec<u8>,
    intermediate_cert: Option<Vec<u8>>,
    signer_issuer: Vec<u8>,
    signer_serial: Vec<u8>,
    next_serial: AtomicU64,
}

fn sim_err(context: &str, e: impl Display) -> ProofError {
    ProofError::TransportUnavailable(format!("tsa simulator {context}: {e}"))
}

impl SimKey {
    fn derive(algorithm: KeyAlgorithm, seed: u8, label: &str) -> Result<Self, ProofError> {
        let bytes: [u8; 32] = Sha256::new().chain_update([seed; 32]).chain_update(label.as_bytes()).finalize().into();
        match algorithm {
            KeyAlgorithm::Ed25519 => Ok(Self::Ed25519(ed25519_dalek::SigningKey::from_bytes(&bytes))),
            KeyAlgorithm::EcdsaP256 => p256::SecretKey::from_slice(&bytes).map(Self::P256).map_err(|e| sim_err("P-256 key", e)),
        }
    }

    /// Par de claves para `rcgen`, vía PKCS#8.
    fn key_pair(&self) -> Result<KeyPair, ProofError> {
        let pkcs8 = match self {
            Self::P256(secret) => secret.to_pkcs8_der().map_err(|e| sim_err("pkcs8", e))?.as_bytes().to_vec(),
            // PKCS#8 v1: SEQ { 0, SEQ { id-Ed25519 }, OCTET STRING { OCTET STRING seed } }
            Self::Ed25519(key) => der::sequence(&[
                der::uint(0),
                der::sequence(&[der::oid(OID_ED25519)]),
                der::octet_string(&der::octet_string(&key.to_bytes())),
            ]),
        };
        KeyPair::try_from(pkcs8.as_slice()).map_err(|e| sim_err("key pair", e))
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            Self::P256(secret) => {
                let signature: p256::ecdsa::Signature = p256::ecdsa::SigningKey::from(secret).sign(message);
                signature.to_der().as_bytes().to_vec()
            }
            Self::Ed25519(key) => key.sign(message).to_bytes().to_vec(),
        }
    }

    fn signature_algorithm(&self) -> Vec<u8> {
        match self {
            Self::P256(_) => der::sequence(&[der::oid(OID_ECDSA_SHA256)]),
            Self::Ed25519(_) => der::sequence(&[der::oid(OID_ED25519)]),
        }
    }
}

fn params(common_name: &str, serial: u8) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, common_name);
    params.serial_number = Some(SerialNumber::from(vec![serial]));
    params
}

fn authority(common_name: &str, serial: u8) -> CertificateParams {
    let mut params = params(common_name, serial);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    params
}

impl SimulatorBuilder {
    pub fn algorithm(mut self, algorithm: KeyAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Sin el extKeyUsage id-kp-timeStamping el certificado no sirve para sellar.
    pub fn time_stamping_usage(mut self, enabled: bool) -> Self {
        self.time_stamping_usage = enabled;
        self
    }

    pub fn intermediate(mut self, profile: IntermediateProfile) -> Self {
        self.intermediate = Some(profile);
        self
    }

    fn tsa_params(&self) -> CertificateParams {
        let mut params = params(TSA_NAME, TSA_SERIAL);
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        if self.time_stamping_usage {
            // rcgen no marca extended_key_usages como crítico; RFC 3161 lo exige
            let mut eku = CustomExtension::from_oid_content(OID_EXT_KEY_USAGE, der::sequence(&[der::oid(OID_KP_TIME_STAMPING)]));
            eku.set_criticality(true);
            params.custom_extensions.push(eku);
        }
        params
    }

    pub fn build(self) -> Result<TsaSimulator, ProofError> {
        let rcgen_err = |e: rcgen::Error| sim_err("certificate", e);
        let ca_pair = SimKey::derive(self.algorithm, self.seed, "ca")?.key_pair()?;
        let ca = authority(CA_NAME, CA_SERIAL).self_signed(&ca_pair).map_err(rcgen_err)?;

        let tsa_key = SimKey::derive(self.algorithm, self.seed, "tsa")?;
        let tsa_pair = tsa_key.key_pair()?;
        let (tsa_cert, intermediate_cert) = match self.intermediate {
            Some(profile) => {
                let pair = SimKey::derive(self.algorithm, self.seed, "intermediate")?.key_pair()?;
                let mut inter = authority(INTERMEDIATE_NAME, INTERMEDIATE_SERIAL);
                if !profile.is_ca {
                    inter.is_ca = IsCa::ExplicitNoCa;
                    inter.key_usages = vec![KeyUsagePurpose::DigitalSignature];
                }
                if profile.expired {
                    inter.not_after = rcgen::date_time_ymd(2001, 1, 1);
                }
                let inter = inter.signed_by(&pair, &ca, &ca_pair).map_err(rcgen_err)?;
                let tsa = self.tsa_params().signed_by(&tsa_pair, &inter, &pair).map_err(rcgen_err)?;
                (tsa.der().to_vec(), Some(inter.der().to_vec()))
            }
            None => (self.tsa_params().signed_by(&tsa_pair, &ca, &ca_pair).map_err(rcgen_err)?.der().to_vec(), None),
        };

        // el sid del SignerInfo debe coincidir byte a byte con el certificado
        let parsed = Certificate::from_der(&tsa_cert).map_err(|e| sim_err("tsa certificate", e))?;
        Ok(TsaSimulator {
            tsa_key,
            ca_pem: ca.pem(),
            signer_issuer: parsed.issuer().to_vec(),
            signer_serial: parsed.serial().to_vec(),
            tsa_cert,
            intermediate_cert,
            next_serial: AtomicU64::new(1),
        })
    }
}

impl TsaSimulator {
    /// Jerarquía por defecto: raíz → TSA, ECDSA P-256.
    pub fn new(seed: u8) -> Result<Self, ProofError> {
        Self::builder(seed).build()
    }

    pub fn builder(seed: u8) -> SimulatorBuilder {
        SimulatorBuilder { seed, algorithm: KeyAlgorithm::default(), time_stamping_usage: true, intermediate: None }
    }

    /// Certificado raíz en PEM, para usar como ancla de confianza.
    pub fn ca_pem(&self) -> String {
        self.ca_pem.clone()
    }

    pub fn trust_anchor(&self) -> TrustAnchor {
        TrustAnchor::from_pem(self.ca_pem())
    }

    pub fn tsa_certificate_der(&self) -> &[u8] {
        &self.tsa_cert
    }

    /// Responde con la hora actual (truncada a segundos).
    pub fn respond(&self, request_der: &[u8]) -> Vec<u8> {
        self.respond_at(request_der, Utc::now().trunc_subsecs(0))
    }

    pub fn respond_at(&self, request_der: &[u8], gen_time: DateTime<Utc>) -> Vec<u8> {
        let request = match parse_request(request_der) {
            Ok(r) if r.hash_algorithm == OID_SHA256 => r,
            _ => return self.rejection("badDataFormat"),
        };
        let serial = self.next_serial.fetch_add(1, Ordering::SeqCst);

        let mut fields = vec![
            der::uint(1),
            der::oid(SIMULATOR_POLICY),
            der::sequence(&[sha256_algorithm(), der::octet_string(&request.hashed_message)]),
            der::uint(serial),
            der::generalized_time(&gen_time),
        ];
        if let Some(nonce) = &request.nonce {
            fields.push(der::encode_tlv(tag::INTEGER, nonce));
        }
        let tst_info = der::sequence(&fields);

        let content_digest = Sha256::digest(&tst_info);
        // SigningCertificateV2 { certs { ESSCertIDv2 { certHash } } }, hash sha256 por defecto
        let ess_cert_id = der::sequence(&[der::octet_string(&Sha256::digest(&self.tsa_cert))]);
        let signed_attrs = der::set(&[
            der::sequence(&[der::oid(OID_ATTR_CONTENT_TYPE), der::set(&[der::oid(OID_TST_INFO)])]),
            der::sequence(&[der::oid(OID_ATTR_MESSAGE_DIGEST), der::set(&[der::octet_string(&content_digest)])]),
            der::sequence(&[
                der::oid(OID_ATTR_SIGNING_CERTIFICATE_V2),
                der::set(&[der::sequence(&[der::sequence(&[ess_cert_id])])]),
            ]),
        ]);
        let signature = self.tsa_key.sign(&signed_attrs);
        let mut signed_attrs_implicit = signed_attrs;
        signed_attrs_implicit[0] = tag::context(0, true);

        let signer_info = der::sequence(&[
            der::uint(1),
            der::sequence(&[self.signer_issuer.clone(), der::encode_tlv(tag::INTEGER, &self.signer_serial)]),
            sha256_algorithm(),
            signed_attrs_implicit,
            self.tsa_key.signature_algorithm(),
            der::octet_string(&signature),
        ]);
        let certificates = if request.cert_req {
            let mut chain = self.tsa_cert.clone();
            if let Some(intermediate) = &self.intermediate_cert {
                chain.extend_from_slice(intermediate);
            }
            der::encode_tlv(tag::context(0, true), &chain)
        } else {
            Vec::new()
        };
        let signed_data = der::sequence(&[
            der::uint(3),
            der::set(&[sha256_algorithm()]),
            der::sequence(&[der::oid(OID_TST_INFO), der::explicit(0, &der::octet_string(&tst_info))]),
            certificates,
            der::set(&[signer_info]),
        ]);
        let token = der::sequence(&[der::oid(OID_SIGNED_DATA), der::explicit(0, &signed_data)]);
        der::sequence(&[der::sequence(&[der::uint(0)]), token])
    }

    /// Respuesta de rechazo (PKIStatus rejection) sin token.
    pub fn rejection(&self, reason: &str) -> Vec<u8> {
        let status = der::sequence(&[der::uint(STATUS_REJECTION), der::sequence(&[der::utf8_string(reason)])]);
        der::sequence(&[status])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsa::request::build_request;
    use crate::tsa::response::parse_response;
    use chrono::TimeZone;

    #[test]
    fn serials_increase_and_time_is_kept() {
        let sim = TsaSimulator::new(9).expect("simulator");
        let req = build_request(&"ab".repeat(32)).expect("request");
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).single().expect("date");
        let first = parse_response(&sim.respond_at(req.as_der(), at)).expect("first");
        let second = parse_response(&sim.respond_at(req.as_der(), at)).expect("second");
        let (t1, t2) = (first.token.expect("token"), second.token.expect("token"));
        assert_eq!(t1.tst_info.serial, vec![1]);
        assert_eq!(t2.tst_info.serial, vec![2]);
        assert_eq!(t1.tst_info.gen_time, at);
        assert_eq!(t1.certificates.len(), 1);
        assert_eq!(t1.signer.signature_algorithm, OID_ECDSA_SHA256);
    }

    #[test]
    fn same_seed_same_authority_across_instances() {
        let a = Certificate::from_der(TsaSimulator::new(4).expect("a").tsa_certificate_der()).expect("a");
        let ca = &crate::tsa::parse_pem_bundle(&TsaSimulator::new(4).expect("b").ca_pem()).expect("ca")[0];
        a.verify_issued_by(ca).expect("same CA key");
    }

    #[test]
    fn intermediate_is_embedded_with_the_signer() {
        let sim = TsaSimulator::builder(9).intermediate(IntermediateProfile::default()).build().expect("simulator");
        let req = build_request(&"cd".repeat(32)).expect("request");
        let token = parse_response(&sim.respond(req.as_der())).expect("parse").token.expect("token");
        assert_eq!(token.certificates.len(), 2);
        assert!(token.certificates[1].is_ca());
        assert_eq!(token.certificates[1].subject_common_name().as_deref(), Some(INTERMEDIATE_NAME));
    }

    #[test]
    fn garbage_request_is_rejected() {
        let sim = TsaSimulator::new(9).expect("simulator");
        let parsed = parse_response(&sim.respond(b"\x30\x00")).expect("parse");
        assert_eq!(parsed.status, 2);
        assert!(parsed.token.is_none());
    }
}
