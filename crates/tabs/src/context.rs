use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use wayfarer_networking::ResponseCache;
use wayfarer_security::{IdentityCollection, SharedTrustStore, TrustLevel, TrustStore};

use crate::charset::{BuiltinConverter, CharsetConverter};
use crate::settings::FetchSettings;
use crate::ContextError;

const SETTINGS_FILE: &str = "settings.json";
const GEMINI_TRUST_FILE: &str = "gemini-trust.json";
const HTTPS_TRUST_FILE: &str = "https-trust.json";
const IDENTITIES_FILE: &str = "identities.json";

/// State shared by every navigation session of one client.
///
/// Built once at start-up and handed to each session. [`ClientContext::flush`]
/// writes the persistent parts back to the directory it was loaded from.
pub struct ClientContext {
    pub settings: FetchSettings,
    pub cache: Mutex<ResponseCache>,
    pub gemini_trust: SharedTrustStore,
    pub https_trust: SharedTrustStore,
    pub identities: RwLock<IdentityCollection>,
    pub charset: Box<dyn CharsetConverter>,
    storage_dir: Option<PathBuf>,
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("settings", &self.settings)
            .field("cache_entries", &self.cache.lock().len())
            .field("storage_dir", &self.storage_dir)
            .finish()
    }
}

fn default_https_trust() -> TrustStore {
    let mut store = TrustStore::new(TrustLevel::TrustOnFirstUse);
    store.enable_ca = true;
    store
}

impl ClientContext {
    /// An in-memory context that never touches the disk
    pub fn new(settings: FetchSettings) -> Self {
        Self {
            cache: Mutex::new(ResponseCache::new(settings.cache.clone())),
            settings,
            gemini_trust: TrustStore::new(TrustLevel::TrustOnFirstUse).shared(),
            https_trust: default_https_trust().shared(),
            identities: RwLock::new(IdentityCollection::new()),
            charset: Box::new(BuiltinConverter),
            storage_dir: None,
        }
    }

    /// Load settings, trust stores and identities from `dir`. Missing files
    /// fall back to defaults.
    pub fn load(dir: &Path) -> Result<Self, ContextError> {
        let settings = FetchSettings::load(&dir.join(SETTINGS_FILE))?;
        let gemini_trust = TrustStore::load(&dir.join(GEMINI_TRUST_FILE))?;

        let https_path = dir.join(HTTPS_TRUST_FILE);
        let https_trust = if https_path.exists() {
            TrustStore::load(&https_path)?
        } else {
            default_https_trust()
        };
        let identities = IdentityCollection::load(&dir.join(IDENTITIES_FILE))?;

        log::info!(
            "Loaded client state from {} ({} gemini pins, {} https pins)",
            dir.display(),
            gemini_trust.trusted_hosts().len(),
            https_trust.trusted_hosts().len()
        );

        Ok(Self {
            cache: Mutex::new(ResponseCache::new(settings.cache.clone())),
            settings,
            gemini_trust: gemini_trust.shared(),
            https_trust: https_trust.shared(),
            identities: RwLock::new(identities),
            charset: Box::new(BuiltinConverter),
            storage_dir: Some(dir.to_path_buf()),
        })
    }

    pub fn with_charset_converter(mut self, converter: Box<dyn CharsetConverter>) -> Self {
        self.charset = converter;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn storage_dir(&self) -> Option<&Path> {
        self.storage_dir.as_deref()
    }

    /// The trust store consulted for `scheme`, if it uses one
    pub fn trust_store_for(&self, scheme: &str) -> Option<&SharedTrustStore> {
        match scheme {
            "gemini" => Some(&self.gemini_trust),
            "https" => Some(&self.https_trust),
            _ => None,
        }
    }

    /// Persist settings, trust stores and identities. Transient identities
    /// are not written. A context created with [`ClientContext::new`] has
    /// nowhere to write and returns immediately.
    pub fn flush(&self) -> Result<(), ContextError> {
        let Some(dir) = &self.storage_dir else {
            return Ok(());
        };

        std::fs::create_dir_all(dir).map_err(|source| ContextError::Io {
            path: dir.clone(),
            source,
        })?;

        self.settings.save(&dir.join(SETTINGS_FILE))?;
        self.gemini_trust.lock().save(&dir.join(GEMINI_TRUST_FILE))?;
        self.https_trust.lock().save(&dir.join(HTTPS_TRUST_FILE))?;
        self.identities.read().save(&dir.join(IDENTITIES_FILE))?;

        log::debug!("Flushed client state to {}", dir.display());
        Ok(())
    }
}

impl Default for ClientContext {
    fn default() -> Self {
        Self::new(FetchSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;
    use wayfarer_security::HostCertificate;

    #[test]
    fn test_defaults() {
        let context = ClientContext::default();
        assert!(!context.gemini_trust.lock().enable_ca);
        assert!(context.https_trust.lock().enable_ca);
        assert!(context.trust_store_for("gopher").is_none());
        assert!(context.flush().is_ok());
    }

    #[test]
    fn test_load_flush_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::parse("gemini://example.org/").unwrap();
        let cert = HostCertificate::new(b"der".to_vec(), b"key".to_vec());

        {
            let context = ClientContext::load(dir.path()).unwrap();
            assert!(context.https_trust.lock().enable_ca);
            assert!(context.gemini_trust.lock().add_trust(&url, Some(&cert)));
            context.flush().unwrap();
        }

        let context = ClientContext::load(dir.path()).unwrap();
        assert!(context.gemini_trust.lock().is_trusted(&url, Some(&cert)));
        assert_eq!(context.storage_dir(), Some(dir.path()));
    }
}
