//! Canned documents shown in place of a page that could not be loaded.

use bytes::Bytes;
use wayfarer_networking::{ErrorKind, MimeType, NetworkError};

const REASON: &str = "{reason}";

fn template(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::UnknownError => {
            "# Unknown error\n\nSomething went wrong while loading this page.\n\n> {reason}\n"
        }
        ErrorKind::ProtocolViolation => {
            "# Protocol violation\n\nThe server sent a response this client could not understand.\n\n> {reason}\n"
        }
        ErrorKind::HostNotFound => {
            "# Host not found\n\nThe server name could not be resolved. Check the address for typos.\n\n> {reason}\n"
        }
        ErrorKind::ConnectionRefused => {
            "# Connection refused\n\nThe server is not accepting connections on this port.\n\n> {reason}\n"
        }
        ErrorKind::ResourceNotFound => {
            "# Not found\n\nThe requested resource does not exist on this server.\n\n> {reason}\n"
        }
        ErrorKind::BadRequest => {
            "# Bad request\n\nThe server could not process the request.\n\n> {reason}\n"
        }
        ErrorKind::ProxyRequest => {
            "# Proxy request refused\n\nThe server does not serve resources for other hosts.\n\n> {reason}\n"
        }
        ErrorKind::InternalServerError => {
            "# Server error\n\nThe server failed to handle the request. Try again later.\n\n> {reason}\n"
        }
        ErrorKind::InvalidClientCertificate => {
            "# Invalid client certificate\n\nThe server did not accept the client certificate.\n\n> {reason}\n"
        }
        ErrorKind::UntrustedHost => {
            "# Untrusted host\n\nThe server presented a certificate that is not trusted yet.\n\n> {reason}\n"
        }
        ErrorKind::MistrustedHost => {
            "# Certificate changed\n\nThe server presented a different certificate than the one stored for this host. Someone may be intercepting the connection.\n\n> {reason}\n"
        }
        ErrorKind::Unauthorized => {
            "# Unauthorized\n\nYou are not allowed to access this resource.\n\n> {reason}\n"
        }
        ErrorKind::TlsFailure => {
            "# TLS failure\n\nA secure connection to the server could not be established.\n\n> {reason}\n"
        }
        ErrorKind::Timeout => {
            "# Timeout\n\nThe server did not respond in time.\n\n> {reason}\n"
        }
    }
}

/// The explanatory gemtext document for a network error
pub fn error_document(error: &NetworkError) -> (Bytes, MimeType) {
    let text = template(error.kind()).replace(REASON, error.reason());
    (Bytes::from(text), MimeType::new("text", "gemini"))
}

/// A plain text notice for failures outside the error taxonomy
pub fn message_document(message: &str) -> (Bytes, MimeType) {
    let text = format!("An error happened:\r\n{}", message);
    (
        Bytes::from(text),
        MimeType::new("text", "plain").with_parameter("charset", "utf-8"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_template() {
        for kind in ErrorKind::ALL {
            let (body, mime) = error_document(&NetworkError::new(kind, "the reason"));
            let text = std::str::from_utf8(&body).unwrap();
            assert!(text.starts_with("# "), "{:?}", kind);
            assert!(text.contains("the reason"), "{:?}", kind);
            assert!(!text.contains(REASON), "{:?}", kind);
            assert!(mime.is("text", "gemini"));
        }
    }

    #[test]
    fn test_message_document() {
        let (body, mime) = message_document("Redirection cancelled");
        assert_eq!(&body[..], b"An error happened:\r\nRedirection cancelled");
        assert_eq!(mime.charset(), "UTF-8");
    }
}
