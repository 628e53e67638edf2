//! TLS certificate pinning.
//!
//! # Design
//! `PinningValidator` is a rustls `ServerCertVerifier` consulted once per
//! server-trust challenge. It first runs standard evaluation (chain, expiry,
//! hostname) through an inner verifier, by default webpki over the platform
//! trust store plus any configured private roots. It then requires the leaf
//! certificate's DER bytes to equal the pinned certificate. Anything else rejects the handshake: a failed chain, a
//! missing pinned resource, or a byte mismatch. The connection then fails
//! and reaches the engine as a transport error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

/// Where the pinned DER certificate comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum PinnedCertificate {
    /// Certificate bytes held in memory, e.g. from `include_bytes!`.
    Der(Arc<[u8]>),
    /// A DER file on disk.
    File(PathBuf),
    /// A bundled resource, resolved as `<certificate_dir>/<name>.der`.
    Named(String),
}

impl PinnedCertificate {
    pub fn der(bytes: impl Into<Arc<[u8]>>) -> Self {
        PinnedCertificate::Der(bytes.into())
    }

    pub fn named(name: impl Into<String>) -> Self {
        PinnedCertificate::Named(name.into())
    }

    /// Load the certificate bytes. Failure is logged and reported as `None`;
    /// the validator then rejects every handshake.
    pub fn load(&self, certificate_dir: Option<&Path>) -> Option<Vec<u8>> {
        let path = match self {
            PinnedCertificate::Der(bytes) => return Some(bytes.to_vec()),
            PinnedCertificate::File(path) => path.clone(),
            PinnedCertificate::Named(name) => match certificate_dir {
                Some(dir) => dir.join(format!("{name}.der")),
                None => {
                    tracing::warn!(%name, "no certificate directory configured for pinned certificate");
                    return None;
                }
            },
        };
        match std::fs::read(&path) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => {
                tracing::warn!(path = %path.display(), "pinned certificate is empty");
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read pinned certificate");
                None
            }
        }
    }
}

impl fmt::Debug for PinnedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinnedCertificate::Der(bytes) => write!(f, "Der({} bytes)", bytes.len()),
            PinnedCertificate::File(path) => f.debug_tuple("File").field(path).finish(),
            PinnedCertificate::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Trust anchors for standard evaluation.
///
/// The platform store is read through rustls-native-certs. If it cannot be
/// read, or yields nothing, the bundled Mozilla roots stand in. `extra`
/// certificates, typically a private CA, are added on top.
pub fn trust_roots(extra: &[CertificateDer<'static>]) -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for error in &native.errors {
        tracing::warn!(%error, "failed to load platform certificates");
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    if ignored > 0 {
        tracing::debug!(ignored, "skipped unparsable platform certificates");
    }
    if added == 0 || !native.errors.is_empty() {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    for cert in extra {
        if let Err(e) = roots.add(cert.clone()) {
            tracing::warn!(error = %e, "failed to add root certificate");
        }
    }
    tracing::debug!(roots = roots.len(), "loaded trust roots");
    roots
}

/// Platform roots without extras, loaded once per process.
pub fn platform_roots() -> Arc<RootCertStore> {
    static ROOTS: OnceLock<Arc<RootCertStore>> = OnceLock::new();
    ROOTS.get_or_init(|| Arc::new(trust_roots(&[]))).clone()
}

/// Standard trust evaluation plus byte-for-byte leaf comparison.
#[derive(Debug)]
pub struct PinningValidator {
    standard: Arc<dyn ServerCertVerifier>,
    pinned: Option<Vec<u8>>,
}

impl PinningValidator {
    /// Validator running webpki over `roots`.
    pub fn new(roots: Arc<RootCertStore>, pinned: Option<Vec<u8>>) -> Result<Self, rustls::Error> {
        let standard = WebPkiServerVerifier::builder_with_provider(roots, provider())
            .build()
            .map_err(|e| rustls::Error::General(format!("failed to build webpki verifier: {e}")))?;
        Ok(Self::with_standard(standard, pinned))
    }

    /// Validator with a caller-supplied standard evaluation step.
    pub fn with_standard(standard: Arc<dyn ServerCertVerifier>, pinned: Option<Vec<u8>>) -> Self {
        Self { standard, pinned }
    }

    pub fn has_pinned_certificate(&self) -> bool {
        self.pinned.is_some()
    }

    /// rustls client configuration that routes every server-trust challenge
    /// through this validator.
    pub fn client_config(self: Arc<Self>) -> Result<ClientConfig, rustls::Error> {
        Ok(ClientConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(self)
            .with_no_client_auth())
    }
}

impl ServerCertVerifier for PinningValidator {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if let Err(e) = self.standard.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            tracing::warn!(?server_name, error = %e, "server trust evaluation failed");
            return Err(e);
        }

        let Some(pinned) = &self.pinned else {
            tracing::warn!(?server_name, "pinned certificate unavailable, rejecting");
            return Err(rustls::Error::General("pinned certificate unavailable".into()));
        };
        if pinned.as_slice() != end_entity.as_ref() {
            tracing::warn!(?server_name, "server certificate does not match pinned certificate");
            return Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ));
        }
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.standard.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.standard.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.standard.supported_verify_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Standard evaluation with a fixed verdict.
    #[derive(Debug)]
    struct StubTrust {
        trusted: bool,
    }

    impl ServerCertVerifier for StubTrust {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            if self.trusted {
                Ok(ServerCertVerified::assertion())
            } else {
                Err(rustls::Error::InvalidCertificate(CertificateError::Expired))
            }
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            vec![SignatureScheme::ECDSA_NISTP256_SHA256]
        }
    }

    const LEAF: &[u8] = &[0x30, 0x82, 0x01, 0x0a, 0xde, 0xad, 0xbe, 0xef];

    fn validator(trusted: bool, pinned: Option<&[u8]>) -> PinningValidator {
        PinningValidator::with_standard(
            Arc::new(StubTrust { trusted }),
            pinned.map(<[u8]>::to_vec),
        )
    }

    fn challenge(validator: &PinningValidator, leaf: &[u8]) -> Result<ServerCertVerified, rustls::Error> {
        let server_name = ServerName::try_from("api.example.com").unwrap();
        validator.verify_server_cert(
            &CertificateDer::from(leaf.to_vec()),
            &[],
            &server_name,
            &[],
            UnixTime::now(),
        )
    }

    #[test]
    fn trusted_and_matching_passes() {
        assert!(challenge(&validator(true, Some(LEAF)), LEAF).is_ok());
    }

    #[test]
    fn trusted_but_different_bytes_rejects() {
        let err = challenge(&validator(true, Some(&[0x30, 0x00][..])), LEAF).unwrap_err();
        assert_eq!(
            err,
            rustls::Error::InvalidCertificate(CertificateError::ApplicationVerificationFailure)
        );
    }

    #[test]
    fn untrusted_rejects_even_when_bytes_match() {
        let err = challenge(&validator(false, Some(LEAF)), LEAF).unwrap_err();
        assert_eq!(err, rustls::Error::InvalidCertificate(CertificateError::Expired));
    }

    #[test]
    fn missing_pinned_certificate_fails_closed() {
        let v = validator(true, None);
        assert!(!v.has_pinned_certificate());
        assert!(challenge(&v, LEAF).is_err());
    }

    #[test]
    fn webpki_rejects_garbage_chain_regardless_of_pin() {
        let v = PinningValidator::new(platform_roots(), Some(LEAF.to_vec())).unwrap();
        assert!(challenge(&v, LEAF).is_err());
    }

    #[test]
    fn trust_roots_include_extra_certificates() {
        let platform = trust_roots(&[]);
        assert!(!platform.is_empty());

        let ca = rcgen::generate_simple_self_signed(vec!["ca.internal".to_string()]).unwrap();
        let with_extra = trust_roots(&[ca.cert.der().clone()]);
        assert_eq!(with_extra.len(), platform.len() + 1);
    }

    #[test]
    fn client_config_builds() {
        let v = Arc::new(validator(true, Some(LEAF)));
        assert!(v.client_config().is_ok());
    }

    #[test]
    fn signature_checks_delegate_to_standard() {
        let v = validator(true, Some(LEAF));
        assert_eq!(
            v.supported_verify_schemes(),
            vec![SignatureScheme::ECDSA_NISTP256_SHA256]
        );
    }

    #[test]
    fn load_named_certificate_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("api.der"), LEAF).unwrap();
        let cert = PinnedCertificate::named("api");
        assert_eq!(cert.load(Some(dir.path())).as_deref(), Some(LEAF));
        assert_eq!(PinnedCertificate::named("other").load(Some(dir.path())), None);
        assert_eq!(cert.load(None), None);
    }

    #[test]
    fn load_in_memory_and_file() {
        assert_eq!(
            PinnedCertificate::der(LEAF.to_vec()).load(None).as_deref(),
            Some(LEAF)
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.der");
        std::fs::write(&path, b"").unwrap();
        assert_eq!(PinnedCertificate::File(path).load(None), None);
    }
}
