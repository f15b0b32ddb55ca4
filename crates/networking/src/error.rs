use std::io;

use thiserror::Error;

/// Discriminant of a [`NetworkError`], without the reason text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownError,
    ProtocolViolation,
    HostNotFound,
    ConnectionRefused,
    ResourceNotFound,
    BadRequest,
    ProxyRequest,
    InternalServerError,
    InvalidClientCertificate,
    UntrustedHost,
    MistrustedHost,
    Unauthorized,
    TlsFailure,
    Timeout,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 14] = [
        ErrorKind::UnknownError,
        ErrorKind::ProtocolViolation,
        ErrorKind::HostNotFound,
        ErrorKind::ConnectionRefused,
        ErrorKind::ResourceNotFound,
        ErrorKind::BadRequest,
        ErrorKind::ProxyRequest,
        ErrorKind::InternalServerError,
        ErrorKind::InvalidClientCertificate,
        ErrorKind::UntrustedHost,
        ErrorKind::MistrustedHost,
        ErrorKind::Unauthorized,
        ErrorKind::TlsFailure,
        ErrorKind::Timeout,
    ];
}

/// NetworkError is the protocol-agnostic failure taxonomy every adapter maps onto.
/// Each variant carries a human readable reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// There was an unhandled network error
    #[error("Unknown error: {0}")]
    UnknownError(String),

    /// The server responded with something the protocol does not allow
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Host not found: {0}")]
    HostNotFound(String),

    /// The host refused the connection on that port
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// The server could not understand our request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The request was a proxy request and the server refused it
    #[error("Proxy request refused: {0}")]
    ProxyRequest(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),

    #[error("Invalid client certificate: {0}")]
    InvalidClientCertificate(String),

    /// We don't know the host and don't trust it
    #[error("Untrusted host: {0}")]
    UntrustedHost(String),

    /// We know the host and it presented a different identity than before
    #[error("Mistrusted host: {0}")]
    MistrustedHost(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Unspecified TLS failure
    #[error("TLS failure: {0}")]
    TlsFailure(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl NetworkError {
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match kind {
            ErrorKind::UnknownError => NetworkError::UnknownError(reason),
            ErrorKind::ProtocolViolation => NetworkError::ProtocolViolation(reason),
            ErrorKind::HostNotFound => NetworkError::HostNotFound(reason),
            ErrorKind::ConnectionRefused => NetworkError::ConnectionRefused(reason),
            ErrorKind::ResourceNotFound => NetworkError::ResourceNotFound(reason),
            ErrorKind::BadRequest => NetworkError::BadRequest(reason),
            ErrorKind::ProxyRequest => NetworkError::ProxyRequest(reason),
            ErrorKind::InternalServerError => NetworkError::InternalServerError(reason),
            ErrorKind::InvalidClientCertificate => NetworkError::InvalidClientCertificate(reason),
            ErrorKind::UntrustedHost => NetworkError::UntrustedHost(reason),
            ErrorKind::MistrustedHost => NetworkError::MistrustedHost(reason),
            ErrorKind::Unauthorized => NetworkError::Unauthorized(reason),
            ErrorKind::TlsFailure => NetworkError::TlsFailure(reason),
            ErrorKind::Timeout => NetworkError::Timeout(reason),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            NetworkError::UnknownError(_) => ErrorKind::UnknownError,
            NetworkError::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            NetworkError::HostNotFound(_) => ErrorKind::HostNotFound,
            NetworkError::ConnectionRefused(_) => ErrorKind::ConnectionRefused,
            NetworkError::ResourceNotFound(_) => ErrorKind::ResourceNotFound,
            NetworkError::BadRequest(_) => ErrorKind::BadRequest,
            NetworkError::ProxyRequest(_) => ErrorKind::ProxyRequest,
            NetworkError::InternalServerError(_) => ErrorKind::InternalServerError,
            NetworkError::InvalidClientCertificate(_) => ErrorKind::InvalidClientCertificate,
            NetworkError::UntrustedHost(_) => ErrorKind::UntrustedHost,
            NetworkError::MistrustedHost(_) => ErrorKind::MistrustedHost,
            NetworkError::Unauthorized(_) => ErrorKind::Unauthorized,
            NetworkError::TlsFailure(_) => ErrorKind::TlsFailure,
            NetworkError::Timeout(_) => ErrorKind::Timeout,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            NetworkError::UnknownError(r)
            | NetworkError::ProtocolViolation(r)
            | NetworkError::HostNotFound(r)
            | NetworkError::ConnectionRefused(r)
            | NetworkError::ResourceNotFound(r)
            | NetworkError::BadRequest(r)
            | NetworkError::ProxyRequest(r)
            | NetworkError::InternalServerError(r)
            | NetworkError::InvalidClientCertificate(r)
            | NetworkError::UntrustedHost(r)
            | NetworkError::MistrustedHost(r)
            | NetworkError::Unauthorized(r)
            | NetworkError::TlsFailure(r)
            | NetworkError::Timeout(r) => r,
        }
    }

    /// Returns true if the user may override the failure by trusting the host
    pub fn is_trust_related(&self) -> bool {
        matches!(
            self,
            NetworkError::UntrustedHost(_) | NetworkError::MistrustedHost(_)
        )
    }

    /// Map a transport failure onto the taxonomy
    pub fn from_io(err: &io::Error) -> Self {
        let reason = err.to_string();
        match err.kind() {
            io::ErrorKind::ConnectionRefused => NetworkError::ConnectionRefused(reason),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => NetworkError::Timeout(reason),
            io::ErrorKind::NotFound | io::ErrorKind::AddrNotAvailable => {
                NetworkError::HostNotFound(reason)
            }
            io::ErrorKind::PermissionDenied => NetworkError::Unauthorized(reason),
            io::ErrorKind::InvalidData => match err.get_ref() {
                Some(inner) if inner.is::<rustls::Error>() => NetworkError::TlsFailure(reason),
                _ => NetworkError::ProtocolViolation(reason),
            },
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => NetworkError::ProtocolViolation(reason),
            _ => NetworkError::UnknownError(reason),
        }
    }
}

impl From<io::Error> for NetworkError {
    fn from(err: io::Error) -> Self {
        NetworkError::from_io(&err)
    }
}

impl From<rustls::Error> for NetworkError {
    fn from(err: rustls::Error) -> Self {
        NetworkError::TlsFailure(err.to_string())
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        let reason = err.to_string();
        if err.is_timeout() {
            return NetworkError::Timeout(reason);
        }
        if err.is_connect() {
            // Walk the source chain for the underlying socket error
            let mut source = std::error::Error::source(&err);
            while let Some(inner) = source {
                if let Some(io_err) = inner.downcast_ref::<io::Error>() {
                    return NetworkError::from_io(io_err);
                }
                source = inner.source();
            }
            if reason.contains("dns error") {
                return NetworkError::HostNotFound(reason);
            }
            return NetworkError::ConnectionRefused(reason);
        }
        if err.is_redirect() {
            return NetworkError::ProtocolViolation(reason);
        }
        if err.is_body() || err.is_decode() {
            return NetworkError::ProtocolViolation(reason);
        }
        NetworkError::UnknownError(reason)
    }
}
