//! The contract every protocol adapter fulfils.
//!
//! Adapters never call back into their caller. They report everything that
//! happens during an exchange as [`HandlerEvent`]s over the [`EventSink`] they
//! were given for that request. Each sink carries the [`RequestId`] of the
//! dispatch it belongs to, so the receiver can drop late events from a request
//! it has already cancelled.

use bytes::Bytes;
use tokio::sync::mpsc;
use wayfarer_security::{ClientIdentity, HostCertificate, SecurityError, SecurityResult};

use crate::error::NetworkError;
use crate::location::Location;
use crate::request::{RequestOptions, RequestState};

/// Identifies one dispatch to one adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl RequestId {
    pub fn next(self) -> Self {
        RequestId(self.0.wrapping_add(1))
    }
}

/// Everything an adapter can report about a request
#[derive(Debug, Clone)]
pub enum HandlerEvent {
    /// Some bytes of the body arrived. Carries the running total.
    Progress(u64),
    /// The request completed with a body and the server supplied media type
    Complete { body: Bytes, mime: String },
    /// The exchange failed
    NetworkError(NetworkError),
    /// The server points somewhere else. `target` may be relative.
    Redirected { target: String, permanent: bool },
    /// The server needs a line of input from the user
    InputRequired { query: String, sensitive: bool },
    /// The server wants a client certificate
    CertificateRequired(String),
    /// The server presented this certificate during the handshake
    HostCertificateLoaded(HostCertificate),
    StateChanged(RequestState),
}

impl HandlerEvent {
    /// Terminal events end a request. At most one is delivered per request.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandlerEvent::Complete { .. }
                | HandlerEvent::NetworkError(_)
                | HandlerEvent::Redirected { .. }
                | HandlerEvent::InputRequired { .. }
                | HandlerEvent::CertificateRequired(_)
        )
    }
}

pub type EventSender = mpsc::UnboundedSender<(RequestId, HandlerEvent)>;
pub type EventReceiver = mpsc::UnboundedReceiver<(RequestId, HandlerEvent)>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Where an adapter sends the events of one request
#[derive(Debug, Clone)]
pub struct EventSink {
    id: RequestId,
    tx: EventSender,
}

impl EventSink {
    pub fn new(id: RequestId, tx: EventSender) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Send an event. Returns false once the receiving side is gone.
    pub fn emit(&self, event: HandlerEvent) -> bool {
        self.tx.send((self.id, event)).is_ok()
    }

    pub fn progress(&self, transferred: u64) -> bool {
        self.emit(HandlerEvent::Progress(transferred))
    }

    pub fn complete(&self, body: impl Into<Bytes>, mime: impl Into<String>) -> bool {
        self.emit(HandlerEvent::Complete {
            body: body.into(),
            mime: mime.into(),
        })
    }

    pub fn error(&self, error: NetworkError) -> bool {
        self.emit(HandlerEvent::NetworkError(error))
    }

    pub fn redirected(&self, target: impl Into<String>, permanent: bool) -> bool {
        self.emit(HandlerEvent::Redirected {
            target: target.into(),
            permanent,
        })
    }

    pub fn input_required(&self, query: impl Into<String>, sensitive: bool) -> bool {
        self.emit(HandlerEvent::InputRequired {
            query: query.into(),
            sensitive,
        })
    }

    pub fn certificate_required(&self, reason: impl Into<String>) -> bool {
        self.emit(HandlerEvent::CertificateRequired(reason.into()))
    }

    pub fn host_certificate_loaded(&self, certificate: HostCertificate) -> bool {
        self.emit(HandlerEvent::HostCertificateLoaded(certificate))
    }

    pub fn state(&self, state: RequestState) -> bool {
        self.emit(HandlerEvent::StateChanged(state))
    }
}

/// A protocol adapter.
///
/// Implementations must not block in any of these methods; the network
/// exchange itself runs in a background task.
pub trait ProtocolHandler: Send {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn supports_scheme(&self, scheme: &str) -> bool;

    /// Begin an exchange. Returns false only when the request cannot even be
    /// attempted (malformed location for this protocol, no runtime). Every
    /// other outcome arrives later through `sink`.
    fn start_request(&mut self, location: &Location, options: RequestOptions, sink: EventSink) -> bool;

    fn is_in_progress(&self) -> bool;

    /// Stop the running exchange. Returns whether cancellation was accepted;
    /// with nothing in flight this is trivially true.
    fn cancel_request(&mut self) -> bool;

    /// Present `identity` on subsequent requests. Adapters whose protocol has
    /// no notion of client certificates refuse.
    fn enable_client_certificate(&mut self, identity: &ClientIdentity) -> SecurityResult<()> {
        let _ = identity;
        Err(SecurityError::UnsupportedIdentity {
            scheme: self.name().to_string(),
        })
    }

    fn disable_client_certificate(&mut self) {}
}
