use std::path::Path;

use serde::{Deserialize, Serialize};
use wayfarer_networking::CacheConfig;

use crate::ContextError;

/// Bitmask deciding which redirects need the user's confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedirectionPolicy(pub i32);

impl RedirectionPolicy {
    pub const WARN_NEVER: Self = Self(0);
    pub const WARN_ON_SCHEME_CHANGE: Self = Self(1);
    pub const WARN_ON_HOST_CHANGE: Self = Self(2);
    pub const WARN_ALWAYS: Self = Self(-1);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Which warning, if any, a redirect needs.
    ///
    /// `WARN_ALWAYS` wins over everything, then a change of both scheme and
    /// host, then scheme alone, then host alone.
    pub fn warning_for(self, cross_scheme: bool, cross_host: bool) -> Option<RedirectWarning> {
        if self == Self::WARN_ALWAYS {
            return Some(RedirectWarning::Always);
        }

        let scheme_bit = self.contains(Self::WARN_ON_SCHEME_CHANGE);
        let host_bit = self.contains(Self::WARN_ON_HOST_CHANGE);

        if (scheme_bit || host_bit) && cross_scheme && cross_host {
            Some(RedirectWarning::SchemeAndHostChanged)
        } else if scheme_bit && cross_scheme {
            Some(RedirectWarning::SchemeChanged)
        } else if host_bit && cross_host {
            Some(RedirectWarning::HostChanged)
        } else {
            None
        }
    }
}

impl std::ops::BitOr for RedirectionPolicy {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Default for RedirectionPolicy {
    fn default() -> Self {
        Self::WARN_ON_HOST_CHANGE
    }
}

/// Why a redirect is put in front of the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectWarning {
    Always,
    SchemeAndHostChanged,
    SchemeChanged,
    HostChanged,
}

/// Which scheme families may be navigated to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSetup {
    pub gemini: bool,
    pub gopher: bool,
    pub finger: bool,
    pub http: bool,
    pub https: bool,
    pub file: bool,
}

impl Default for ProtocolSetup {
    fn default() -> Self {
        Self {
            gemini: true,
            gopher: true,
            finger: true,
            http: true,
            https: true,
            file: true,
        }
    }
}

impl ProtocolSetup {
    /// `about:` is always available; unknown schemes never are
    pub fn is_enabled(&self, scheme: &str) -> bool {
        match scheme {
            "about" => true,
            "gemini" => self.gemini,
            "gopher" => self.gopher,
            "finger" => self.finger,
            "http" => self.http,
            "https" => self.https,
            "file" => self.file,
            _ => false,
        }
    }
}

/// Everything the navigation layer reads from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Redirects followed within one navigation
    pub max_redirections: u32,
    /// Sliding timeout in milliseconds, rearmed by every progress event
    pub network_timeout_ms: u64,
    pub redirection_policy: RedirectionPolicy,
    pub cache: CacheConfig,
    pub protocols: ProtocolSetup,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_redirections: 5,
            network_timeout_ms: 5000,
            redirection_policy: RedirectionPolicy::default(),
            cache: CacheConfig::default(),
            protocols: ProtocolSetup::default(),
        }
    }
}

impl FetchSettings {
    pub fn network_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.network_timeout_ms)
    }

    /// Read settings from `path`, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self, ContextError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ContextError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ContextError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|source| ContextError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_policy_precedence() {
        let host_only = RedirectionPolicy::WARN_ON_HOST_CHANGE;
        assert_eq!(host_only.warning_for(false, false), None);
        assert_eq!(host_only.warning_for(true, false), None);
        assert_eq!(host_only.warning_for(false, true), Some(RedirectWarning::HostChanged));
        assert_eq!(
            host_only.warning_for(true, true),
            Some(RedirectWarning::SchemeAndHostChanged)
        );

        let scheme_only = RedirectionPolicy::WARN_ON_SCHEME_CHANGE;
        assert_eq!(scheme_only.warning_for(true, false), Some(RedirectWarning::SchemeChanged));
        assert_eq!(scheme_only.warning_for(false, true), None);

        let both = RedirectionPolicy::WARN_ON_SCHEME_CHANGE | RedirectionPolicy::WARN_ON_HOST_CHANGE;
        assert_eq!(both.warning_for(true, false), Some(RedirectWarning::SchemeChanged));
        assert_eq!(both.warning_for(false, true), Some(RedirectWarning::HostChanged));

        assert_eq!(RedirectionPolicy::WARN_NEVER.warning_for(true, true), None);
        assert_eq!(
            RedirectionPolicy::WARN_ALWAYS.warning_for(false, false),
            Some(RedirectWarning::Always)
        );
    }

    #[test]
    fn test_protocol_setup() {
        let mut setup = ProtocolSetup::default();
        setup.gopher = false;
        assert!(setup.is_enabled("gemini"));
        assert!(!setup.is_enabled("gopher"));
        assert!(setup.is_enabled("about"));
        assert!(!setup.is_enabled("ftp"));
    }

    #[test]
    fn test_settings_round_trip_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        assert_eq!(FetchSettings::load(&path).unwrap(), FetchSettings::default());

        let mut settings = FetchSettings::default();
        settings.max_redirections = 3;
        settings.redirection_policy = RedirectionPolicy::WARN_ALWAYS;
        settings.save(&path).unwrap();
        assert_eq!(FetchSettings::load(&path).unwrap(), settings);

        // Missing fields take their defaults
        std::fs::write(&path, r#"{ "network_timeout_ms": 100 }"#).unwrap();
        let partial = FetchSettings::load(&path).unwrap();
        assert_eq!(partial.network_timeout_ms, 100);
        assert_eq!(partial.max_redirections, 5);
    }
}
