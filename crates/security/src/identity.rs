//! Client certificates a user can present to servers.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::{Position, Url};

use crate::error::{SecurityError, SecurityResult};
use crate::trust::{decode_key, encode_key};

/// Whether an identity survives a restart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityPersistence {
    /// Lives only for the session that created it
    Transient,
    /// Saved alongside the other identities
    Persistent,
}

/// A client certificate with its key and usage rules
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub display_name: String,
    /// DER encoded certificate
    #[serde(serialize_with = "encode_key", deserialize_with = "decode_key")]
    pub certificate: Vec<u8>,
    /// DER encoded PKCS#8 private key
    #[serde(serialize_with = "encode_key", deserialize_with = "decode_key")]
    pub private_key: Vec<u8>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub persistence: IdentityPersistence,
    /// Wildcard pattern over the URL; `*` matches any run of characters
    pub host_filter: Option<String>,
    /// Offer this identity automatically on URLs matching the host filter
    pub auto_enable: bool,
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("display_name", &self.display_name)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .field("persistence", &self.persistence)
            .field("host_filter", &self.host_filter)
            .field("auto_enable", &self.auto_enable)
            .finish()
    }
}

fn filter_regex(pattern: &str) -> SecurityResult<Regex> {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("^{}$", escaped)).map_err(|e| SecurityError::InvalidHostFilter {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

impl ClientIdentity {
    pub fn new(
        display_name: impl Into<String>,
        certificate: Vec<u8>,
        private_key: Vec<u8>,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        persistence: IdentityPersistence,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            certificate,
            private_key,
            not_before,
            not_after,
            persistence,
            host_filter: None,
            auto_enable: false,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.persistence == IdentityPersistence::Persistent
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.certificate.is_empty() && self.not_before <= now && now < self.not_after
    }

    /// Set or clear the host filter. The pattern is checked before it is stored.
    pub fn set_host_filter(&mut self, pattern: Option<&str>) -> SecurityResult<()> {
        match pattern.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => {
                filter_regex(p)?;
                self.host_filter = Some(p.to_string());
            }
            None => self.host_filter = None,
        }
        Ok(())
    }

    fn filter_matches(&self, url: &Url) -> Option<bool> {
        let pattern = self.host_filter.as_deref().filter(|p| !p.is_empty())?;
        let target = &url[..Position::AfterQuery];
        match filter_regex(pattern) {
            Ok(regex) => Some(regex.is_match(target)),
            Err(e) => {
                log::warn!("{}", e);
                Some(false)
            }
        }
    }

    /// True when a host filter is set and `url` falls outside it
    pub fn is_host_filtered(&self, url: &Url) -> bool {
        matches!(self.filter_matches(url), Some(false))
    }

    pub fn is_automatically_enabled_on(&self, url: &Url) -> bool {
        self.auto_enable && matches!(self.filter_matches(url), Some(true))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedIdentities {
    groups: BTreeMap<String, Vec<ClientIdentity>>,
}

/// Named groups of identities
#[derive(Debug, Clone, Default)]
pub struct IdentityCollection {
    groups: BTreeMap<String, Vec<ClientIdentity>>,
}

impl IdentityCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty group. Returns false if it already exists.
    pub fn add_group(&mut self, group: &str) -> bool {
        if self.groups.contains_key(group) {
            return false;
        }
        self.groups.insert(group.to_string(), Vec::new());
        true
    }

    pub fn add_identity(&mut self, group: &str, identity: ClientIdentity) {
        self.groups.entry(group.to_string()).or_default().push(identity);
    }

    pub fn remove_identity(&mut self, group: &str, display_name: &str) -> Option<ClientIdentity> {
        let members = self.groups.get_mut(group)?;
        let index = members.iter().position(|i| i.display_name == display_name)?;
        Some(members.remove(index))
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn all_identities(&self) -> impl Iterator<Item = &ClientIdentity> {
        self.groups.values().flatten()
    }

    /// First identity that wants to be offered on `url`
    pub fn automatic_identity_for(&self, url: &Url) -> Option<&ClientIdentity> {
        self.all_identities()
            .find(|identity| identity.is_automatically_enabled_on(url))
    }

    pub fn load(path: &Path) -> SecurityResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| SecurityError::Persistence {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let persisted: PersistedIdentities = serde_json::from_str(&text)?;
        Ok(Self {
            groups: persisted.groups,
        })
    }

    /// Write all persistent identities. Transient ones are left out.
    pub fn save(&self, path: &Path) -> SecurityResult<()> {
        let groups = self
            .groups
            .iter()
            .map(|(name, members)| {
                let kept = members.iter().filter(|i| i.is_persistent()).cloned().collect();
                (name.clone(), kept)
            })
            .collect();
        let text = serde_json::to_string_pretty(&PersistedIdentities { groups })?;

        std::fs::write(path, text).map_err(|e| SecurityError::Persistence {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn identity(name: &str, persistence: IdentityPersistence) -> ClientIdentity {
        let now = Utc::now();
        ClientIdentity::new(
            name,
            vec![0x30, 0x82],
            vec![0x30, 0x81],
            now - Duration::days(1),
            now + Duration::days(365),
            persistence,
        )
    }

    #[test]
    fn test_validity_window() {
        let ident = identity("alice", IdentityPersistence::Persistent);
        assert!(ident.is_valid());
        assert!(!ident.is_valid_at(Utc::now() + Duration::days(400)));
        assert!(!ident.is_valid_at(Utc::now() - Duration::days(2)));
    }

    #[test]
    fn test_host_filter() {
        let mut ident = identity("alice", IdentityPersistence::Persistent);
        let inside = Url::parse("gemini://example.org/app/login").unwrap();
        let outside = Url::parse("gemini://other.org/").unwrap();

        assert!(!ident.is_host_filtered(&outside));

        ident.set_host_filter(Some("gemini://example.org/*")).unwrap();
        assert!(!ident.is_host_filtered(&inside));
        assert!(ident.is_host_filtered(&outside));
        assert!(!ident.is_automatically_enabled_on(&inside));

        ident.auto_enable = true;
        assert!(ident.is_automatically_enabled_on(&inside));
        assert!(!ident.is_automatically_enabled_on(&outside));
    }

    #[test]
    fn test_filter_ignores_fragment() {
        let mut ident = identity("alice", IdentityPersistence::Persistent);
        ident.set_host_filter(Some("gemini://example.org/page")).unwrap();

        let url = Url::parse("gemini://example.org/page#section").unwrap();
        assert!(!ident.is_host_filtered(&url));
    }

    #[test]
    fn test_collection_lookup() {
        let mut ident = identity("alice", IdentityPersistence::Persistent);
        ident.set_host_filter(Some("gemini://example.org/*")).unwrap();
        ident.auto_enable = true;

        let mut collection = IdentityCollection::new();
        assert!(collection.add_group("work"));
        assert!(!collection.add_group("work"));
        collection.add_identity("work", ident);

        let url = Url::parse("gemini://example.org/x").unwrap();
        assert_eq!(collection.automatic_identity_for(&url).unwrap().display_name, "alice");
        assert!(collection.remove_identity("work", "alice").is_some());
        assert!(collection.automatic_identity_for(&url).is_none());
    }

    #[test]
    fn test_save_skips_transient() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities.json");

        let mut collection = IdentityCollection::new();
        collection.add_identity("default", identity("kept", IdentityPersistence::Persistent));
        collection.add_identity("default", identity("dropped", IdentityPersistence::Transient));
        collection.save(&path).unwrap();

        let loaded = IdentityCollection::load(&path).unwrap();
        let names: Vec<&str> = loaded.all_identities().map(|i| i.display_name.as_str()).collect();
        assert_eq!(names, vec!["kept"]);
    }
}
