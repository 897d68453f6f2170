//! Proveedor que delega en `openssl ts` (request y validación de cadena).
//!
//! El parseo estructural nativo corre antes de invocar al binario, así una
//! respuesta ilegible o con otro imprint sigue reportándose como
//! `MalformedResponse` / `DigestMismatch` y no como un fallo genérico de
//! `openssl ts -verify`. Permite validar TSAs con claves RSA/ECDSA (el
//! camino PKCS#7 de `openssl ts` no acepta Ed25519).

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use log::{debug, warn};
use once_cell::sync::OnceCell;

use super::native::{inspect, outcome_of};
use super::request::TimestampRequest;
use super::{TimestampProtocol, TrustAnchor, VerificationOutcome};
use crate::errors::ProofError;
use crate::hashing::parse_digest_hex;

pub const DEFAULT_OPENSSL_BIN: &str = "openssl";

#[derive(Debug)]
pub struct OpenSslProtocol {
    bin: PathBuf,
    default_ca_file: Option<PathBuf>,
    // resultado de `openssl version`, se consulta una sola vez
    availability: OnceCell<Result<String, String>>,
}

impl OpenSslProtocol {
    pub fn new() -> Self {
        Self::with_binary(DEFAULT_OPENSSL_BIN)
    }

    pub fn with_binary(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into(), default_ca_file: None, availability: OnceCell::new() }
    }

    /// Bundle PEM usado como `-CAfile` cuando el llamador no aporta ancla.
    pub fn with_default_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_ca_file = Some(path.into());
        self
    }

    pub fn binary(&self) -> &Path {
        &self.bin
    }

    /// Comprueba (una vez) que el binario existe y responde.
    pub fn ensure_available(&self) -> Result<&str, ProofError> {
        let version = self.availability.get_or_init(|| match Command::new(&self.bin).arg("version").output() {
            Ok(out) if out.status.success() => Ok(String::from_utf8_lossy(&out.stdout).trim().to_string()),
            Ok(out) => Err(format!("{} version exited with {}", self.bin.display(), out.status)),
            Err(e) => Err(format!("{} not executable: {e}", self.bin.display())),
        });
        version.as_deref().map_err(|e| ProofError::TransportUnavailable(e.to_string()))
    }

    fn run<I, S>(&self, args: I) -> Result<Output, ProofError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Command::new(&self.bin).args(args).output().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ProofError::TransportUnavailable(format!("{} not found", self.bin.display())),
            _ => ProofError::TransportUnavailable(format!("{}: {e}", self.bin.display())),
        })
    }
}

impl Default for OpenSslProtocol {
    fn default() -> Self {
        Self::new()
    }
}

// Archivos de trabajo para el binario: no es el store de pruebas.
fn io_err(context: &str) -> impl Fn(io::Error) -> ProofError + '_ {
    move |e| ProofError::TransportUnavailable(format!("openssl workdir {context}: {e}"))
}

fn stderr_or_stdout(out: &Output) -> String {
    let err = String::from_utf8_lossy(&out.stderr).trim().to_string();
    if err.is_empty() {
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    } else {
        err
    }
}

impl TimestampProtocol for OpenSslProtocol {
    fn name(&self) -> &'static str {
        "openssl"
    }

    fn build_request(&self, digest_hex: &str) -> Result<TimestampRequest, ProofError> {
        let (lower, _) = parse_digest_hex(digest_hex)?;
        self.ensure_available()?;
        let out = self.run(["ts", "-query", "-sha256", "-digest", lower.as_str(), "-cert", "-no_nonce"])?;
        if !out.status.success() {
            return Err(ProofError::TransportUnavailable(format!("openssl ts -query failed: {}", stderr_or_stdout(&out))));
        }
        Ok(TimestampRequest::from_der(lower, out.stdout))
    }

    fn verify(&self, response: &[u8], digest_hex: &str, trust_anchor: Option<&TrustAnchor>) -> Result<VerificationOutcome, ProofError> {
        let token = inspect(response, digest_hex)?;
        let request = self.build_request(digest_hex)?;

        let dir = tempfile::tempdir().map_err(io_err("tempdir"))?;
        let tsr = dir.path().join("resp.tsr");
        let tsq = dir.path().join("req.tsq");
        fs::write(&tsr, response).map_err(io_err("write tsr"))?;
        fs::write(&tsq, request.as_der()).map_err(io_err("write tsq"))?;

        let ca_file = match trust_anchor {
            Some(anchor) => {
                let p = dir.path().join("tsa.pem");
                fs::write(&p, anchor.pem()).map_err(io_err("write ca"))?;
                Some(p)
            }
            None => self.default_ca_file.clone(),
        };
        let mut args: Vec<OsString> =
            vec!["ts".into(), "-verify".into(), "-in".into(), tsr.into_os_string(), "-queryfile".into(), tsq.into_os_string()];
        if let Some(ca) = ca_file {
            args.push("-CAfile".into());
            args.push(ca.into_os_string());
        }
        let out = self.run(&args)?;
        if !out.status.success() {
            let detail = stderr_or_stdout(&out);
            warn!("openssl ts -verify rejected token digest={digest_hex}: {detail}");
            return Err(ProofError::SignatureInvalid(if detail.is_empty() { "verify failed".into() } else { detail }));
        }
        let outcome = outcome_of(&token);
        debug!("openssl verify:ok digest={digest_hex} serial={}", outcome.serial);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsa::request::build_request;
    use crate::tsa::simulator::TsaSimulator;

    const DIGEST: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn missing() -> OpenSslProtocol {
        OpenSslProtocol::with_binary("/nonexistent/bin/openssl")
    }

    #[test]
    fn missing_binary_is_transport_unavailable() {
        let proto = missing();
        assert!(matches!(proto.ensure_available(), Err(ProofError::TransportUnavailable(_))));
        assert!(matches!(proto.build_request(DIGEST), Err(ProofError::TransportUnavailable(_))));
    }

    #[test]
    fn workdir_io_failure_is_transport_not_storage() {
        let err = io_err("write tsr")(io::Error::new(io::ErrorKind::PermissionDenied, "read-only tmp"));
        assert!(matches!(&err, ProofError::TransportUnavailable(msg) if msg.contains("write tsr")), "got {err:?}");
    }

    #[test]
    fn invalid_digest_is_reported_before_running_openssl() {
        assert!(matches!(missing().build_request("xyz"), Err(ProofError::InvalidDigest(_))));
    }

    #[test]
    fn structural_failures_stay_distinguishable_without_binary() {
        let sim = TsaSimulator::new(5).expect("simulator");
        let resp = sim.respond(build_request(DIGEST).expect("req").as_der());
        let other = "f".repeat(64);
        let proto = missing();
        assert!(matches!(proto.verify(b"junk", DIGEST, None), Err(ProofError::MalformedResponse(_))));
        assert!(matches!(proto.verify(&resp, &other, None), Err(ProofError::DigestMismatch { .. })));
        assert!(matches!(proto.verify(&resp, DIGEST, None), Err(ProofError::TransportUnavailable(_))));
    }

    #[test]
    fn request_matches_native_bytes_when_openssl_present() {
        let Some(proto) = present() else { return };
        let ours = build_request(DIGEST).expect("native");
        let theirs = proto.build_request(DIGEST).expect("openssl");
        assert_eq!(ours.as_der(), theirs.as_der());
    }

    fn present() -> Option<OpenSslProtocol> {
        let proto = OpenSslProtocol::new();
        match proto.ensure_available() {
            Ok(_) => Some(proto),
            Err(e) => {
                eprintln!("openssl not available ({e}); skipping");
                None
            }
        }
    }

    #[test]
    fn simulator_token_verifies_through_openssl() {
        let Some(proto) = present() else { return };
        let sim = TsaSimulator::new(5).expect("simulator");
        let resp = sim.respond(build_request(DIGEST).expect("req").as_der());
        let outcome = proto.verify(&resp, DIGEST, Some(&sim.trust_anchor())).expect("openssl accepts simulator token");
        assert_eq!(outcome.serial, "01");
        assert_eq!(outcome.policy, "1.3.6.1.4.1.55555.1.1");
    }

    #[test]
    fn openssl_rejects_signer_without_time_stamping_usage() {
        let Some(proto) = present() else { return };
        let sim = TsaSimulator::builder(5).time_stamping_usage(false).build().expect("simulator");
        let resp = sim.respond(build_request(DIGEST).expect("req").as_der());
        assert!(matches!(proto.verify(&resp, DIGEST, Some(&sim.trust_anchor())), Err(ProofError::SignatureInvalid(_))));
    }

    #[test]
    fn openssl_rejects_foreign_anchor() {
        let Some(proto) = present() else { return };
        let sim = TsaSimulator::new(5).expect("simulator");
        let other = TsaSimulator::new(6).expect("other");
        let resp = sim.respond(build_request(DIGEST).expect("req").as_der());
        assert!(matches!(proto.verify(&resp, DIGEST, Some(&other.trust_anchor())), Err(ProofError::SignatureInvalid(_))));
    }
}
