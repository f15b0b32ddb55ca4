use std::time::Duration;

use bytes::Bytes;
use wayfarer_networking::{ErrorKind, Location, MimeType, RequestState};
use wayfarer_security::{ClientIdentity, HostCertificate};

use crate::settings::RedirectWarning;

/// A document ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub location: Location,
    pub body: Bytes,
    pub mime: MimeType,
    /// Time since the navigation started
    pub loading_time: Duration,
    /// Size of the body as received, before charset conversion
    pub size: usize,
    pub from_cache: bool,
    /// Error pages and local or built-in locations
    pub is_internal: bool,
    /// Scroll offset to restore, set on back/forward traversal of a cached page
    pub scroll_position: Option<i32>,
}

/// What a session reports to its delegate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    NavigationStarted(Location),
    RequestStateChanged(RequestState),
    Progress { received: u64 },
    HostCertificateLoaded(HostCertificate),
    Redirected { from: Location, to: Location, permanent: bool },
    DocumentReady(Document),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectPrompt {
    pub from: Location,
    pub to: Location,
    pub warning: RedirectWarning,
}

/// Questions about the active client identity, asked before a request is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityPrompt {
    /// The destination protocol cannot present the identity. Confirming
    /// continues without it.
    UnsupportedScheme { identity: String, scheme: String },
    /// The destination is on another host. Confirming keeps the identity.
    HostChanged {
        identity: String,
        from: String,
        to: String,
    },
    /// The destination does not match the identity's host filter. Confirming
    /// keeps the identity.
    OutsideHostFilter {
        identity: String,
        filter: String,
        destination: Location,
    },
    /// An identity is configured to enable itself here. Confirming enables it.
    AutoEnable { identity: String, destination: Location },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPrompt {
    pub location: Location,
    pub query: String,
    pub sensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPrompt {
    pub location: Location,
    /// `UntrustedHost` or `MistrustedHost`
    pub kind: ErrorKind,
    pub reason: String,
    pub certificate: Option<HostCertificate>,
}

/// Answer to a [`TrustPrompt`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustDecision {
    /// Show the error page
    #[default]
    Reject,
    /// Load the page this time without checking the certificate
    IgnoreOnce,
    /// Pin the certificate and load the page. A changed certificate is never
    /// re-pinned this way; it is loaded once instead.
    TrustPermanently,
}

/// The caller side of a [`NavigationSession`](crate::NavigationSession).
///
/// Every prompt has a conservative default so a delegate only implements the
/// questions it can ask.
pub trait NavigationDelegate {
    fn on_event(&mut self, event: SessionEvent);

    fn confirm_redirect(&mut self, _prompt: &RedirectPrompt) -> bool {
        false
    }

    fn confirm_identity(&mut self, _prompt: &IdentityPrompt) -> bool {
        false
    }

    /// Return the text to send, or `None` to give up
    fn request_input(&mut self, _prompt: &InputPrompt) -> Option<String> {
        None
    }

    /// Pick an identity for a server that asked for one
    fn select_identity(&mut self, _reason: &str) -> Option<ClientIdentity> {
        None
    }

    fn confirm_untrusted_host(&mut self, _prompt: &TrustPrompt) -> TrustDecision {
        TrustDecision::Reject
    }

    /// Show a body whose charset could not be converted as-is?
    fn confirm_raw_charset(&mut self, _charset: &str) -> bool {
        false
    }

    /// Where the reader currently is in the displayed page
    fn current_scroll_position(&self) -> Option<i32> {
        None
    }
}
