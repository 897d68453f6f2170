//! Protocolo de sellado de tiempo (RFC 3161): construcción de requests y
//! verificación de respuestas.
//!
//! `TimestampProtocol` es el punto de extensión: `NativeProtocol` lo
//! implementa en Rust puro, `OpenSslProtocol` delega en el binario `openssl`.
//! El transporte hacia el TSA no vive aquí; el llamador envía los bytes.

pub mod cert;
pub mod der;
pub mod native;
pub mod openssl;
pub mod request;
pub mod response;
pub mod simulator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ProofError;

pub use cert::{parse_pem_bundle, Certificate};
pub use native::NativeProtocol;
pub use openssl::OpenSslProtocol;
pub use request::{build_request, TimestampRequest};
pub use simulator::{IntermediateProfile, KeyAlgorithm, TsaSimulator};

/// Datos extraídos de un token verificado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub asserted_time: DateTime<Utc>,
    /// OID de política en notación punteada.
    pub policy: String,
    /// Serial del token en hex.
    pub serial: String,
}

/// Bundle PEM de certificados raíz en los que se confía.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    pem: String,
}

impl TrustAnchor {
    pub fn from_pem(pem: impl Into<String>) -> Self {
        Self { pem: pem.into() }
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ProofError> {
        std::fs::read_to_string(path)
            .map(Self::from_pem)
            .map_err(|e| ProofError::SignatureInvalid(format!("trust anchor {}: {e}", path.display())))
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn certificates(&self) -> Result<Vec<Certificate>, ProofError> {
        parse_pem_bundle(&self.pem)
    }
}

/// Proveedor del protocolo: construir el request y verificar la respuesta.
///
/// `verify` no toca estado persistido; la máquina de estados compone la
/// verificación con el store.
pub trait TimestampProtocol: Send + Sync {
    fn name(&self) -> &'static str;

    /// Request determinista para `digest_hex` (sin nonce ni reloj).
    fn build_request(&self, digest_hex: &str) -> Result<TimestampRequest, ProofError>;

    /// Verifica `response` contra el request reconstruido desde `digest_hex`.
    fn verify(&self, response: &[u8], digest_hex: &str, trust_anchor: Option<&TrustAnchor>) -> Result<VerificationOutcome, ProofError>;
}

impl<T: TimestampProtocol + ?Sized> TimestampProtocol for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn build_request(&self, digest_hex: &str) -> Result<TimestampRequest, ProofError> {
        (**self).build_request(digest_hex)
    }

    fn verify(&self, response: &[u8], digest_hex: &str, trust_anchor: Option<&TrustAnchor>) -> Result<VerificationOutcome, ProofError> {
        (**self).verify(response, digest_hex, trust_anchor)
    }
}
