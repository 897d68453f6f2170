//! Decodificación del TimeStampResp (RFC 3161) y del token CMS SignedData.
//!
//! Sólo estructura: no valida firmas ni compara digests (eso vive en
//! `native`). Cualquier error aquí se reporta como respuesta malformada.

use chrono::{DateTime, Utc};

use super::cert::Certificate;
use super::der::{self, tag, DerError, DerReader};
use super::request::{read_algorithm, read_message_imprint};
use crate::constants::{OID_ATTR_CONTENT_TYPE, OID_ATTR_MESSAGE_DIGEST, OID_SIGNED_DATA, OID_TST_INFO, TSP_VERSION};

/// PKIStatus granted / grantedWithMods.
pub const STATUS_GRANTED: u64 = 0;
pub const STATUS_GRANTED_WITH_MODS: u64 = 1;

#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub status: u64,
    pub status_text: Option<String>,
    pub token: Option<SignedToken>,
}

/// Token de sellado: TSTInfo firmado más el material de firma.
#[derive(Debug, Clone)]
pub struct SignedToken {
    /// Bytes DER exactos del TSTInfo (eContent).
    pub tst_info_der: Vec<u8>,
    pub tst_info: TstInfo,
    pub certificates: Vec<Certificate>,
    pub signer: SignerInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TstInfo {
    pub policy: Vec<u64>,
    pub hash_algorithm: Vec<u64>,
    pub hashed_message: Vec<u8>,
    pub serial: Vec<u8>,
    pub gen_time: DateTime<Utc>,
    pub nonce: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerInfo {
    /// Serial del emisor si el `sid` es IssuerAndSerialNumber.
    pub sid_serial: Option<Vec<u8>>,
    pub digest_algorithm: Vec<u64>,
    /// Atributos firmados re-etiquetados como SET (lo que cubre la firma).
    pub signed_attrs: Option<Vec<u8>>,
    pub content_type: Option<Vec<u64>>,
    pub message_digest: Option<Vec<u8>>,
    pub signature_algorithm: Vec<u64>,
    pub signature: Vec<u8>,
}

pub fn parse_response(bytes: &[u8]) -> Result<ParsedResponse, DerError> {
    let mut outer = DerReader::new(bytes);
    let mut resp = outer.read_sequence()?;
    outer.finish("TimeStampResp")?;

    let mut status_info = resp.read_sequence()?;
    let status = status_info.read_small_uint()?;
    let status_text = match status_info.read_optional(tag::SEQUENCE)? {
        Some(text) => {
            let mut parts = Vec::new();
            let mut r = text.reader();
            while !r.is_empty() {
                parts.push(String::from_utf8_lossy(r.read(tag::UTF8_STRING)?.content).into_owned());
            }
            Some(parts.join("; "))
        }
        None => None,
    };

    let token = if resp.is_empty() { None } else { Some(parse_token(resp.read(tag::SEQUENCE)?.raw)?) };
    resp.finish("TimeStampResp")?;
    Ok(ParsedResponse { status, status_text, token })
}

fn parse_token(bytes: &[u8]) -> Result<SignedToken, DerError> {
    let mut content_info = DerReader::new(bytes).read_sequence()?;
    if content_info.read_oid()? != OID_SIGNED_DATA {
        return Err(DerError::Invalid("content type (expected signedData)"));
    }
    let mut explicit = content_info.read(tag::context(0, true))?.reader();
    let mut signed_data = explicit.read_sequence()?;
    explicit.finish("ContentInfo")?;
    content_info.finish("ContentInfo")?;

    signed_data.read_small_uint()?;
    signed_data.read(tag::SET)?;

    let mut encap = signed_data.read_sequence()?;
    if encap.read_oid()? != OID_TST_INFO {
        return Err(DerError::Invalid("eContentType (expected TSTInfo)"));
    }
    let mut econtent = encap.read(tag::context(0, true))?.reader();
    let tst_info_der = econtent.read_octet_string()?.to_vec();
    econtent.finish("eContent")?;
    encap.finish("EncapsulatedContentInfo")?;

    let mut certificates = Vec::new();
    if let Some(certs) = signed_data.read_optional(tag::context(0, true))? {
        let mut r = certs.reader();
        while !r.is_empty() {
            let cert = r.read_any()?;
            if cert.tag == tag::SEQUENCE {
                certificates.push(Certificate::from_der(cert.raw)?);
            }
        }
    }
    signed_data.read_optional(tag::context(1, true))?;

    let mut signer_infos = signed_data.read(tag::SET)?.reader();
    let signer = parse_signer_info(&mut signer_infos)?;
    signed_data.finish("SignedData")?;

    let tst_info = parse_tst_info(&tst_info_der)?;
    Ok(SignedToken { tst_info_der, tst_info, certificates, signer })
}

fn parse_signer_info(r: &mut DerReader<'_>) -> Result<SignerInfo, DerError> {
    let mut si = r.read_sequence()?;
    si.read_small_uint()?;
    let sid = si.read_any()?;
    let sid_serial = if sid.tag == tag::SEQUENCE {
        let mut ias = sid.reader();
        ias.read(tag::SEQUENCE)?;
        Some(ias.read_integer()?.to_vec())
    } else {
        None
    };
    let digest_algorithm = read_algorithm(&mut si)?;

    let mut signed_attrs = None;
    let mut content_type = None;
    let mut message_digest = None;
    if let Some(attrs) = si.read_optional(tag::context(0, true))? {
        let mut as_set = attrs.raw.to_vec();
        as_set[0] = tag::SET;
        signed_attrs = Some(as_set);
        let mut r = attrs.reader();
        while !r.is_empty() {
            let mut attr = r.read_sequence()?;
            let oid = attr.read_oid()?;
            let mut values = attr.read(tag::SET)?.reader();
            if oid == OID_ATTR_CONTENT_TYPE {
                content_type = Some(values.read_oid()?);
            } else if oid == OID_ATTR_MESSAGE_DIGEST {
                message_digest = Some(values.read_octet_string()?.to_vec());
            }
        }
    }

    let signature_algorithm = read_algorithm(&mut si)?;
    let signature = si.read_octet_string()?.to_vec();
    si.read_optional(tag::context(1, true))?;
    si.finish("SignerInfo")?;
    Ok(SignerInfo { sid_serial, digest_algorithm, signed_attrs, content_type, message_digest, signature_algorithm, signature })
}

pub fn parse_tst_info(bytes: &[u8]) -> Result<TstInfo, DerError> {
    let mut outer = DerReader::new(bytes);
    let mut tst = outer.read_sequence()?;
    outer.finish("TSTInfo")?;
    if tst.read_small_uint()? != TSP_VERSION {
        return Err(DerError::Invalid("TSTInfo version"));
    }
    let policy = tst.read_oid()?;
    let (hash_algorithm, hashed) = read_message_imprint(&mut tst)?;
    let serial = tst.read_integer()?.to_vec();
    let gen_time = match tst.read_any()? {
        t if t.tag == tag::GENERALIZED_TIME => der::parse_generalized_time(t.content)?,
        t => return Err(DerError::UnexpectedTag { expected: tag::GENERALIZED_TIME, found: t.tag }),
    };
    // accuracy / ordering: opcionales, no se usan
    tst.read_optional(tag::SEQUENCE)?;
    if tst.peek_tag() == Some(tag::BOOLEAN) {
        tst.read_bool()?;
    }
    let nonce = tst.read_optional(tag::INTEGER)?.map(|t| t.content.to_vec());
    Ok(TstInfo { policy, hash_algorithm, hashed_message: hashed.to_vec(), serial, gen_time, nonce })
}
