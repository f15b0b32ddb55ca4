//! Wayfarer Security Crate
//!
//! Server identity decisions and client credentials for the fetch engine:
//! trust-on-first-use pinning of server public keys (one store per scheme
//! family) and the client certificates a user may present to servers.

pub mod certificate;
pub mod error;
pub mod identity;
pub mod trust;

pub use certificate::HostCertificate;
pub use error::{SecurityError, SecurityResult};
pub use identity::{ClientIdentity, IdentityCollection, IdentityPersistence};
pub use trust::{SharedTrustStore, TrustLevel, TrustStatus, TrustStore, TrustedHost, TrustedHostCollection};
