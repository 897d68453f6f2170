//! Constantes del protocolo de sellado de tiempo (RFC 3161 / CMS).
//!
//! Los OIDs se guardan como arcos; `tsa::der::oid` los codifica.
//! Cambiar cualquiera de ellos altera los bytes del TimeStampReq y rompe la
//! reconstrucción determinista del request a partir del digest guardado.

/// Longitud del digest SHA-256 en hex.
pub const DIGEST_HEX_LEN: usize = 64;

/// id-sha256 (NIST).
pub const OID_SHA256: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 1];
/// id-Ed25519 (RFC 8410).
pub const OID_ED25519: &[u64] = &[1, 3, 101, 112];
/// id-ecPublicKey (RFC 5480).
pub const OID_EC_PUBLIC_KEY: &[u64] = &[1, 2, 840, 10045, 2, 1];
/// prime256v1 / secp256r1.
pub const OID_P256: &[u64] = &[1, 2, 840, 10045, 3, 1, 7];
/// ecdsa-with-SHA256.
pub const OID_ECDSA_SHA256: &[u64] = &[1, 2, 840, 10045, 4, 3, 2];
/// id-signedData (CMS).
pub const OID_SIGNED_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 2];
/// id-ct-TSTInfo (RFC 3161).
pub const OID_TST_INFO: &[u64] = &[1, 2, 840, 113549, 1, 9, 16, 1, 4];
/// id-contentType (atributo firmado CMS).
pub const OID_ATTR_CONTENT_TYPE: &[u64] = &[1, 2, 840, 113549, 1, 9, 3];
/// id-messageDigest (atributo firmado CMS).
pub const OID_ATTR_MESSAGE_DIGEST: &[u64] = &[1, 2, 840, 113549, 1, 9, 4];
/// id-aa-signingCertificateV2 (RFC 5035). OpenSSL lo exige en tokens TSP.
pub const OID_ATTR_SIGNING_CERTIFICATE_V2: &[u64] = &[1, 2, 840, 113549, 1, 9, 16, 2, 47];
/// id-ce-basicConstraints.
pub const OID_BASIC_CONSTRAINTS: &[u64] = &[2, 5, 29, 19];
/// id-ce-extKeyUsage.
pub const OID_EXT_KEY_USAGE: &[u64] = &[2, 5, 29, 37];
/// id-kp-timeStamping: único uso permitido (y crítico) para el firmante.
pub const OID_KP_TIME_STAMPING: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 3, 8];
/// id-at-commonName.
pub const OID_COMMON_NAME: &[u64] = &[2, 5, 4, 3];

/// Versión de TimeStampReq/TSTInfo.
pub const TSP_VERSION: u64 = 1;

/// Profundidad máxima de la cadena de certificados a recorrer.
pub const MAX_CHAIN_DEPTH: usize = 4;
