//! TLS client setup for adapters that pin server keys themselves.
//!
//! Chains are never rejected for being self-signed; whether the server is
//! trusted is decided against a [`TrustStore`](wayfarer_security::TrustStore).
//! Adapters that drive the socket themselves check after the handshake and
//! before writing. Adapters that hand the config to a client library pass a
//! [`HandshakeTrust`] so the verdict is reached inside the handshake and a
//! refused host never sees the request. When system CA validation is enabled
//! the chain is also checked against the native roots and the outcome
//! recorded for that decision. Handshake signatures are always verified.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use rustls::client::{ServerCertVerified, ServerCertVerifier, WebPkiVerifier};
use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore, ServerName};
use url::Url;
use wayfarer_security::{ClientIdentity, HostCertificate, SharedTrustStore, TrustStatus};

use crate::error::NetworkError;
use crate::request::RequestOptions;

/// Trust decision to make while the handshake is still running
pub struct HandshakeTrust {
    pub store: SharedTrustStore,
    pub url: Url,
    pub options: RequestOptions,
}

/// What the verifier saw during the handshake
#[derive(Debug, Default)]
pub struct HandshakeRecord {
    pub peer: Option<HostCertificate>,
    pub rejection: Option<NetworkError>,
}

/// Remembers the peer and whether its chain validated against the CAs.
/// Only fails the handshake when a [`HandshakeTrust`] refuses the host.
struct RecordingVerifier {
    webpki: Option<WebPkiVerifier>,
    ca_verified: Arc<AtomicBool>,
    trust: Option<HandshakeTrust>,
    record: Arc<Mutex<HandshakeRecord>>,
}

impl ServerCertVerifier for RecordingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        server_name: &ServerName,
        scts: &mut dyn Iterator<Item = &[u8]>,
        ocsp_response: &[u8],
        now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if let Some(webpki) = &self.webpki {
            let outcome = webpki.verify_server_cert(
                end_entity,
                intermediates,
                server_name,
                scts,
                ocsp_response,
                now,
            );
            if let Err(e) = &outcome {
                log::debug!("CA validation failed: {}", e);
            }
            self.ca_verified.store(outcome.is_ok(), Ordering::SeqCst);
        }

        let Some(trust) = &self.trust else {
            return Ok(ServerCertVerified::assertion());
        };

        let certificate = HostCertificate::from_der(&end_entity.0)
            .map_err(|e| rustls::Error::General(e.to_string()))?;
        let verdict = check_host_trust(
            &trust.store,
            &trust.url,
            &certificate,
            self.ca_verified.load(Ordering::SeqCst),
            trust.options,
        );

        let mut record = self.record.lock();
        record.peer = Some(certificate);
        match verdict {
            Ok(()) => Ok(ServerCertVerified::assertion()),
            Err(error) => {
                let message = error.to_string();
                record.rejection = Some(error);
                Err(rustls::Error::General(message))
            }
        }
    }
}

/// A client configuration plus what its verifier writes
pub struct PinningConfig {
    pub config: Arc<ClientConfig>,
    pub ca_verified: Arc<AtomicBool>,
    record: Arc<Mutex<HandshakeRecord>>,
}

impl PinningConfig {
    pub fn ca_verified(&self) -> bool {
        self.ca_verified.load(Ordering::SeqCst)
    }

    /// Peer certificate and trust rejection of the last handshake
    pub fn take_handshake(&self) -> HandshakeRecord {
        std::mem::take(&mut *self.record.lock())
    }
}

fn native_roots() -> Result<RootCertStore, NetworkError> {
    let mut root_store = RootCertStore::empty();

    for cert in rustls_native_certs::load_native_certs().map_err(|e| {
        NetworkError::TlsFailure(format!("Failed to load system certificates: {}", e))
    })? {
        if let Err(e) = root_store.add(&Certificate(cert.0)) {
            log::debug!("Skipping unusable system certificate: {}", e);
        }
    }

    Ok(root_store)
}

/// Build a client configuration for one request
pub fn pinning_config(
    enable_ca: bool,
    identity: Option<&ClientIdentity>,
    trust: Option<HandshakeTrust>,
) -> Result<PinningConfig, NetworkError> {
    let ca_verified = Arc::new(AtomicBool::new(false));
    let record = Arc::new(Mutex::new(HandshakeRecord::default()));
    let webpki = if enable_ca {
        Some(WebPkiVerifier::new(native_roots()?, None))
    } else {
        None
    };

    let builder = ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(RecordingVerifier {
            webpki,
            ca_verified: ca_verified.clone(),
            trust,
            record: record.clone(),
        }));

    let config = match identity {
        Some(identity) => builder
            .with_client_auth_cert(
                vec![Certificate(identity.certificate.clone())],
                PrivateKey(identity.private_key.clone()),
            )
            .map_err(|e| NetworkError::InvalidClientCertificate(e.to_string()))?,
        None => builder.with_no_client_auth(),
    };

    Ok(PinningConfig {
        config: Arc::new(config),
        ca_verified,
        record,
    })
}

pub fn server_name(host: &str) -> Result<ServerName, NetworkError> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    ServerName::try_from(bare)
        .map_err(|_| NetworkError::BadRequest(format!("Invalid server name: {}", host)))
}

/// Decide whether the connection to `url` may proceed.
///
/// `ignore_tls_errors` skips the check without pinning anything. A chain that
/// validated against the system CAs is accepted when the store allows it.
pub fn check_host_trust(
    store: &SharedTrustStore,
    url: &Url,
    certificate: &HostCertificate,
    ca_verified: bool,
    options: RequestOptions,
) -> Result<(), NetworkError> {
    if options.ignore_tls_errors {
        log::debug!("Skipping trust check for {} on request", url);
        return Ok(());
    }

    let mut store = store.lock();
    if store.enable_ca && ca_verified {
        return Ok(());
    }

    match store.get_trust(url, Some(certificate)) {
        TrustStatus::Trusted => Ok(()),
        TrustStatus::Untrusted => Err(NetworkError::UntrustedHost(format!(
            "The host {} presented a certificate that is not trusted (fingerprint {})",
            url.host_str().unwrap_or(""),
            certificate.fingerprint()
        ))),
        TrustStatus::Mistrusted => Err(NetworkError::MistrustedHost(format!(
            "The host {} presented a different certificate than the one pinned (fingerprint {})",
            url.host_str().unwrap_or(""),
            certificate.fingerprint()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_security::{TrustLevel, TrustStore};

    fn cert(key: &[u8]) -> HostCertificate {
        HostCertificate::new(key.to_vec(), key.to_vec())
    }

    #[test]
    fn test_trust_check_maps_verdicts() {
        let store = TrustStore::new(TrustLevel::TrustOnFirstUse).shared();
        let url = Url::parse("gemini://example.org/").unwrap();
        let options = RequestOptions::default();

        assert!(check_host_trust(&store, &url, &cert(b"A"), false, options).is_ok());
        let err = check_host_trust(&store, &url, &cert(b"B"), false, options).unwrap_err();
        assert!(matches!(err, NetworkError::MistrustedHost(_)));
    }

    #[test]
    fn test_ignore_tls_errors_does_not_pin() {
        let store = TrustStore::new(TrustLevel::TrustOnFirstUse).shared();
        let url = Url::parse("gemini://example.org/").unwrap();

        assert!(check_host_trust(&store, &url, &cert(b"A"), false, RequestOptions::ignoring_tls_errors()).is_ok());
        assert!(store.lock().trusted_hosts().is_empty());
    }

    #[test]
    fn test_ca_validation_bypasses_pins_when_enabled() {
        let mut inner = TrustStore::new(TrustLevel::RequireExplicitTrust);
        inner.enable_ca = true;
        let store = inner.shared();
        let url = Url::parse("https://example.org/").unwrap();
        let options = RequestOptions::default();

        assert!(check_host_trust(&store, &url, &cert(b"A"), true, options).is_ok());
        let err = check_host_trust(&store, &url, &cert(b"A"), false, options).unwrap_err();
        assert!(matches!(err, NetworkError::UntrustedHost(_)));
    }

    fn verify_during_handshake(
        store: &SharedTrustStore,
        der: Vec<u8>,
        options: RequestOptions,
    ) -> (Result<ServerCertVerified, rustls::Error>, HandshakeRecord) {
        let record = Arc::new(Mutex::new(HandshakeRecord::default()));
        let verifier = RecordingVerifier {
            webpki: None,
            ca_verified: Arc::new(AtomicBool::new(false)),
            trust: Some(HandshakeTrust {
                store: store.clone(),
                url: Url::parse("https://localhost/").unwrap(),
                options,
            }),
            record: record.clone(),
        };
        let outcome = verifier.verify_server_cert(
            &Certificate(der),
            &[],
            &server_name("localhost").unwrap(),
            &mut std::iter::empty(),
            &[],
            SystemTime::now(),
        );
        let seen = std::mem::take(&mut *record.lock());
        (outcome, seen)
    }

    #[test]
    fn test_handshake_refuses_changed_key() {
        let first = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
        let second = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
        let store = TrustStore::new(TrustLevel::TrustOnFirstUse).shared();

        let (outcome, seen) =
            verify_during_handshake(&store, first.serialize_der().unwrap(), RequestOptions::default());
        assert!(outcome.is_ok());
        assert!(seen.peer.is_some());
        assert!(seen.rejection.is_none());
        assert_eq!(store.lock().trusted_hosts().len(), 1);

        let (outcome, seen) =
            verify_during_handshake(&store, second.serialize_der().unwrap(), RequestOptions::default());
        assert!(outcome.is_err());
        assert!(matches!(seen.rejection, Some(NetworkError::MistrustedHost(_))));
        let peer = seen.peer.unwrap();
        assert_eq!(peer, HostCertificate::from_der(&second.serialize_der().unwrap()).unwrap());

        let (outcome, seen) = verify_during_handshake(
            &store,
            second.serialize_der().unwrap(),
            RequestOptions::ignoring_tls_errors(),
        );
        assert!(outcome.is_ok());
        assert!(seen.rejection.is_none());
    }

    #[test]
    fn test_server_name_accepts_ip_literals() {
        assert!(server_name("example.org").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
        assert!(server_name("[::1]").is_ok());
    }
}
