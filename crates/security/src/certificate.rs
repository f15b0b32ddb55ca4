//! Server certificates as seen by the trust store.
//!
//! Only the pieces a pinning decision needs are kept: the raw DER for display
//! and re-pinning, and the encoded SubjectPublicKeyInfo that pins compare.

use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};

use crate::error::{SecurityError, SecurityResult};

/// A certificate presented by a server during a TLS handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCertificate {
    /// DER encoding of the full certificate
    der: Vec<u8>,
    /// DER encoding of the SubjectPublicKeyInfo
    public_key: Vec<u8>,
    /// Subject distinguished name, if it could be decoded
    subject: Option<String>,
    /// End of the validity period, if it could be decoded
    not_after: Option<DateTime<Utc>>,
}

impl HostCertificate {
    /// Build a certificate from already extracted parts
    pub fn new(der: Vec<u8>, public_key: Vec<u8>) -> Self {
        Self {
            der,
            public_key,
            subject: None,
            not_after: None,
        }
    }

    /// Decode an X.509 certificate and extract its public key
    pub fn from_der(der: &[u8]) -> SecurityResult<Self> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| SecurityError::InvalidCertificate(e.to_string()))?;

        let not_after = Utc
            .timestamp_opt(cert.validity().not_after.timestamp(), 0)
            .single();

        Ok(Self {
            der: der.to_vec(),
            public_key: cert.public_key().raw.to_vec(),
            subject: Some(cert.subject().to_string()),
            not_after,
        })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn not_after(&self) -> Option<DateTime<Utc>> {
        self.not_after
    }

    /// SHA-256 fingerprint of the DER encoding, as colon separated hex
    pub fn fingerprint(&self) -> String {
        Sha256::digest(&self.der)
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_format() {
        let cert = HostCertificate::new(vec![1, 2, 3], vec![4, 5, 6]);
        let fingerprint = cert.fingerprint();

        assert_eq!(fingerprint.split(':').count(), 32);
        assert!(fingerprint.chars().all(|c| c == ':' || c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let result = HostCertificate::from_der(b"definitely not a certificate");
        assert!(matches!(result, Err(SecurityError::InvalidCertificate(_))));
    }
}
