//! Networking layer of the Wayfarer fetch engine.
//!
//! Holds the protocol adapter contract, the concrete adapters for every
//! supported scheme family, the shared error taxonomy and the bounded
//! response cache used by the navigation layer.

pub mod cache;
pub mod dns;
pub mod error;
pub mod handler;
pub mod location;
pub mod mime;
pub mod protocols;
pub mod request;
pub mod tls;

/// Re-export common types for easier usage
pub use cache::{CacheConfig, CacheEntry, CacheStats, ResponseCache};
pub use dns::{DnsMode, HostResolver};
pub use error::{ErrorKind, NetworkError};
pub use handler::{
    event_channel, EventReceiver, EventSender, EventSink, HandlerEvent, ProtocolHandler, RequestId,
};
pub use location::{default_port, Location, SchemeFamily};
pub use mime::MimeType;
pub use protocols::{
    AboutHandler, FileHandler, FingerHandler, GeminiHandler, GopherHandler, WebHandler,
};
pub use request::{RequestOptions, RequestState};

/// Maximum size of a request line or redirect target accepted on the small-internet protocols
pub const MAX_URL_LENGTH: usize = 1024;
