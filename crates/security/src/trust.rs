//! Trust-on-first-use pinning of server public keys.
//!
//! Each scheme family owns one [`TrustStore`]. A store remembers at most one
//! public key per host name. A key that differs from the pinned one is never
//! silently re-pinned: it yields [`TrustStatus::Mistrusted`] until the user
//! removes the old pin explicitly.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::certificate::HostCertificate;
use crate::error::{SecurityError, SecurityResult};

/// A trust store shared between the adapters and the orchestrator.
/// Mutation (pin, remove) goes through the single mutex.
pub type SharedTrustStore = Arc<Mutex<TrustStore>>;

/// How unknown server identities are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrustLevel {
    /// Every certificate is accepted without looking at the pins
    TrustEverything,
    /// The first key seen for a host is pinned automatically
    #[default]
    TrustOnFirstUse,
    /// Unknown hosts stay untrusted until the user pins them
    RequireExplicitTrust,
}

/// Verdict for one certificate presented by one host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustStatus {
    /// The key matches the pin (or trust is unconditional)
    Trusted,
    /// Nothing is known about the host, or there is no certificate
    Untrusted,
    /// The host is pinned to a different key
    Mistrusted,
}

/// A pinned host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedHost {
    pub host_name: String,
    pub trusted_at: DateTime<Utc>,
    #[serde(serialize_with = "encode_key", deserialize_with = "decode_key")]
    pub public_key: Vec<u8>,
}

pub(crate) fn encode_key<S: Serializer>(key: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(key))
}

pub(crate) fn decode_key<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let text = String::deserialize(deserializer)?;
    base64::engine::general_purpose::STANDARD
        .decode(text.as_bytes())
        .map_err(serde::de::Error::custom)
}

/// Set of pinned hosts keyed by host name
#[derive(Debug, Clone, Default)]
pub struct TrustedHostCollection {
    hosts: HashMap<String, TrustedHost>,
}

impl TrustedHostCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pin. Returns false if the host is already pinned.
    pub fn insert(&mut self, host: TrustedHost) -> bool {
        if self.hosts.contains_key(&host.host_name) {
            return false;
        }
        self.hosts.insert(host.host_name.clone(), host);
        true
    }

    pub fn get(&self, host_name: &str) -> Option<&TrustedHost> {
        self.hosts.get(host_name)
    }

    pub fn remove(&mut self, host_name: &str) -> Option<TrustedHost> {
        self.hosts.remove(host_name)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// All pins, ordered by host name
    pub fn all(&self) -> Vec<&TrustedHost> {
        let mut all: Vec<&TrustedHost> = self.hosts.values().collect();
        all.sort_by(|a, b| a.host_name.cmp(&b.host_name));
        all
    }

    pub fn clear(&mut self) {
        self.hosts.clear();
    }
}

/// On-disk form of a trust store
#[derive(Debug, Serialize, Deserialize)]
struct PersistedTrustStore {
    trust_level: TrustLevel,
    enable_ca: bool,
    trusted_hosts: Vec<TrustedHost>,
}

/// TOFU trust store for one scheme family
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    /// How unknown hosts are treated
    pub trust_level: TrustLevel,
    /// Whether a chain that validates against the system CAs is trusted outright
    pub enable_ca: bool,
    hosts: TrustedHostCollection,
}

impl TrustStore {
    pub fn new(trust_level: TrustLevel) -> Self {
        Self {
            trust_level,
            enable_ca: false,
            hosts: TrustedHostCollection::new(),
        }
    }

    /// Wrap the store for sharing between adapters and the orchestrator
    pub fn shared(self) -> SharedTrustStore {
        Arc::new(Mutex::new(self))
    }

    fn host_key(url: &Url) -> Option<String> {
        url.host_str()
            .filter(|h| !h.is_empty())
            .map(|h| h.to_ascii_lowercase())
    }

    /// Evaluate a certificate presented by the host of `url`.
    ///
    /// Under [`TrustLevel::TrustOnFirstUse`] an unknown host is pinned as a
    /// side effect.
    pub fn get_trust(&mut self, url: &Url, certificate: Option<&HostCertificate>) -> TrustStatus {
        let Some(certificate) = certificate else {
            return TrustStatus::Untrusted;
        };

        if self.trust_level == TrustLevel::TrustEverything {
            return TrustStatus::Trusted;
        }

        let Some(host_name) = Self::host_key(url) else {
            return TrustStatus::Untrusted;
        };

        if let Some(pinned) = self.hosts.get(&host_name) {
            if pinned.public_key == certificate.public_key() {
                return TrustStatus::Trusted;
            }
            log::warn!("Certificate mismatch for {}", host_name);
            return TrustStatus::Mistrusted;
        }

        match self.trust_level {
            TrustLevel::TrustOnFirstUse => {
                log::info!("Pinning first seen key for {}", host_name);
                self.hosts.insert(TrustedHost {
                    host_name,
                    trusted_at: Utc::now(),
                    public_key: certificate.public_key().to_vec(),
                });
                TrustStatus::Trusted
            }
            _ => TrustStatus::Untrusted,
        }
    }

    pub fn is_trusted(&mut self, url: &Url, certificate: Option<&HostCertificate>) -> bool {
        self.get_trust(url, certificate) == TrustStatus::Trusted
    }

    /// Pin a certificate on explicit user request.
    ///
    /// Does nothing and returns false when there is no certificate or the
    /// host already has a pin; replacing a pin takes a [`Self::remove_trust`]
    /// first.
    pub fn add_trust(&mut self, url: &Url, certificate: Option<&HostCertificate>) -> bool {
        let (Some(certificate), Some(host_name)) = (certificate, Self::host_key(url)) else {
            return false;
        };

        self.hosts.insert(TrustedHost {
            host_name,
            trusted_at: Utc::now(),
            public_key: certificate.public_key().to_vec(),
        })
    }

    /// Forget the pin for a host
    pub fn remove_trust(&mut self, host_name: &str) -> Option<TrustedHost> {
        self.hosts.remove(&host_name.to_ascii_lowercase())
    }

    pub fn trusted_host(&self, host_name: &str) -> Option<&TrustedHost> {
        self.hosts.get(&host_name.to_ascii_lowercase())
    }

    pub fn trusted_hosts(&self) -> Vec<&TrustedHost> {
        self.hosts.all()
    }

    /// Load a store from disk. A missing file yields a default store.
    pub fn load(path: &Path) -> SecurityResult<Self> {
        if !path.exists() {
            log::debug!("No trust store at {}, starting empty", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path).map_err(|e| SecurityError::Persistence {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let persisted: PersistedTrustStore = serde_json::from_str(&text)?;

        let mut store = Self::new(persisted.trust_level);
        store.enable_ca = persisted.enable_ca;
        for host in persisted.trusted_hosts {
            let host_name = host.host_name.clone();
            if !store.hosts.insert(host) {
                log::warn!("Ignoring duplicate pin for {} in {}", host_name, path.display());
            }
        }

        Ok(store)
    }

    pub fn save(&self, path: &Path) -> SecurityResult<()> {
        let persisted = PersistedTrustStore {
            trust_level: self.trust_level,
            enable_ca: self.enable_ca,
            trusted_hosts: self.hosts.all().into_iter().cloned().collect(),
        };
        let text = serde_json::to_string_pretty(&persisted)?;

        std::fs::write(path, text).map_err(|e| SecurityError::Persistence {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(key: &[u8]) -> HostCertificate {
        HostCertificate::new(b"der".to_vec(), key.to_vec())
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_first_use_pins_key() {
        let mut store = TrustStore::new(TrustLevel::TrustOnFirstUse);
        let host = url("gemini://example.org/");

        assert_eq!(store.get_trust(&host, Some(&cert(b"K"))), TrustStatus::Trusted);
        assert_eq!(store.get_trust(&host, Some(&cert(b"K"))), TrustStatus::Trusted);
        assert_eq!(store.get_trust(&host, Some(&cert(b"K'"))), TrustStatus::Mistrusted);
        assert_eq!(store.trusted_host("example.org").unwrap().public_key, b"K");
    }

    #[test]
    fn test_missing_certificate_is_untrusted() {
        let mut store = TrustStore::new(TrustLevel::TrustEverything);
        assert_eq!(store.get_trust(&url("gemini://example.org/"), None), TrustStatus::Untrusted);
    }

    #[test]
    fn test_trust_everything_skips_pins() {
        let mut store = TrustStore::new(TrustLevel::TrustEverything);
        let host = url("gemini://example.org/");

        assert_eq!(store.get_trust(&host, Some(&cert(b"A"))), TrustStatus::Trusted);
        assert_eq!(store.get_trust(&host, Some(&cert(b"B"))), TrustStatus::Trusted);
        assert!(store.trusted_hosts().is_empty());
    }

    #[test]
    fn test_explicit_trust_required() {
        let mut store = TrustStore::new(TrustLevel::RequireExplicitTrust);
        let host = url("gemini://example.org/");

        assert_eq!(store.get_trust(&host, Some(&cert(b"A"))), TrustStatus::Untrusted);
        assert!(store.add_trust(&host, Some(&cert(b"A"))));
        assert_eq!(store.get_trust(&host, Some(&cert(b"A"))), TrustStatus::Trusted);
    }

    #[test]
    fn test_add_trust_never_overwrites() {
        let mut store = TrustStore::new(TrustLevel::RequireExplicitTrust);
        let host = url("gemini://example.org/");

        assert!(!store.add_trust(&host, None));
        assert!(store.add_trust(&host, Some(&cert(b"A"))));
        assert!(!store.add_trust(&host, Some(&cert(b"B"))));
        assert_eq!(store.get_trust(&host, Some(&cert(b"B"))), TrustStatus::Mistrusted);

        store.remove_trust("example.org");
        assert!(store.add_trust(&host, Some(&cert(b"B"))));
        assert_eq!(store.get_trust(&host, Some(&cert(b"B"))), TrustStatus::Trusted);
    }

    #[test]
    fn test_host_names_are_case_insensitive() {
        let mut store = TrustStore::new(TrustLevel::TrustOnFirstUse);
        store.get_trust(&url("gemini://Example.ORG/"), Some(&cert(b"A")));

        assert_eq!(
            store.get_trust(&url("gemini://example.org/"), Some(&cert(b"A"))),
            TrustStatus::Trusted
        );
        assert_eq!(store.trusted_hosts().len(), 1);
    }

    #[test]
    fn test_collection_rejects_duplicates() {
        let mut hosts = TrustedHostCollection::new();
        let host = TrustedHost {
            host_name: "example.org".into(),
            trusted_at: Utc::now(),
            public_key: vec![1],
        };

        assert!(hosts.insert(host.clone()));
        assert!(!hosts.insert(host));
        assert_eq!(hosts.len(), 1);
    }
}
