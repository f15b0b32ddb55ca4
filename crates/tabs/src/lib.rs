//! Wayfarer navigation sessions
//!
//! A [`NavigationSession`] owns one logical browsing context: it picks the
//! protocol adapter for a location, consults the response cache, follows
//! redirects under the configured warning policy, applies the sliding network
//! timeout and turns trust and client-certificate questions into prompts for
//! its [`NavigationDelegate`].

mod charset;
mod context;
mod delegate;
mod error_pages;
mod session;
mod settings;

use std::path::PathBuf;

use thiserror::Error;
use wayfarer_security::SecurityError;

pub use charset::{BuiltinConverter, CharsetConverter, CharsetError};
pub use context::ClientContext;
pub use delegate::{
    Document, IdentityPrompt, InputPrompt, NavigationDelegate, RedirectPrompt, SessionEvent,
    TrustDecision, TrustPrompt,
};
pub use error_pages::{error_document, message_document};
pub use session::{NavigationSession, NavigationState, PushToHistory, RequestFlags};
pub use settings::{FetchSettings, ProtocolSetup, RedirectWarning, RedirectionPolicy};

/// Errors returned synchronously by navigation calls.
///
/// Failures of the exchange itself never show up here; they are delivered as
/// documents through [`SessionEvent::DocumentReady`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("URI scheme not supported or disabled: {0}")]
    SchemeDisabled(String),

    #[error("No protocol handler for scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Failed to cancel running request")]
    CancellationRefused,

    #[error("Failed to execute request to {0}")]
    RequestRejected(String),

    #[error("Navigation cancelled by user")]
    CancelledByUser,

    #[error("Client identity {0} is not valid at this time")]
    InvalidIdentity(String),

    #[error("Nothing to reload")]
    NoCurrentLocation,
}

/// Result type for navigation operations
pub type NavigationResult<T> = Result<T, NavigationError>;

/// Errors loading or flushing persisted client state
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error(transparent)]
    Security(#[from] SecurityError),
}
