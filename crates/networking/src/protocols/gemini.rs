use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use wayfarer_security::{ClientIdentity, HostCertificate, SecurityError, SecurityResult, SharedTrustStore};

use super::{read_body, report, RequestTask};
use crate::dns::HostResolver;
use crate::error::NetworkError;
use crate::handler::{EventSink, ProtocolHandler};
use crate::location::Location;
use crate::request::{RequestOptions, RequestState};
use crate::tls;
use crate::MAX_URL_LENGTH;

const DEFAULT_PORT: u16 = 1965;
const DEFAULT_MIME: &str = "text/gemini; charset=utf-8";
/// Two status digits, a space, the meta line and CRLF
const MAX_HEADER_LENGTH: usize = 2 + 1 + MAX_URL_LENGTH + 2;

/// A parsed `<status> <meta>` response line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeader {
    pub status: u8,
    pub meta: String,
}

/// Parse a response header line, with or without its trailing CRLF
pub fn parse_response_header(line: &[u8]) -> Result<ResponseHeader, NetworkError> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let text = std::str::from_utf8(line)
        .map_err(|_| NetworkError::ProtocolViolation("Response header is not valid UTF-8".into()))?;

    let digits = text.get(..2).unwrap_or("");
    if digits.len() != 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NetworkError::ProtocolViolation(format!(
            "Invalid status code in response header: {:?}",
            text
        )));
    }
    let status: u8 = digits
        .parse()
        .map_err(|_| NetworkError::ProtocolViolation("Invalid status code".into()))?;

    let rest = &text[2..];
    let meta = match rest.chars().next() {
        None => "",
        Some(' ') | Some('\t') => rest[1..].trim(),
        Some(_) => {
            return Err(NetworkError::ProtocolViolation(format!(
                "Status code must be followed by a space: {:?}",
                text
            )))
        }
    };

    if meta.len() > MAX_URL_LENGTH {
        return Err(NetworkError::ProtocolViolation(format!(
            "Response meta exceeds {} bytes",
            MAX_URL_LENGTH
        )));
    }

    Ok(ResponseHeader {
        status,
        meta: meta.to_string(),
    })
}

/// What a response header asks the client to do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeminiOutcome {
    Input { query: String, sensitive: bool },
    Success { mime: String },
    Redirect { target: String, permanent: bool },
    CertificateRequired(String),
    Failure(NetworkError),
}

impl ResponseHeader {
    pub fn outcome(&self) -> GeminiOutcome {
        let meta = self.meta.clone();
        match self.status {
            10..=19 => GeminiOutcome::Input {
                query: meta,
                sensitive: self.status == 11,
            },
            20..=29 => GeminiOutcome::Success {
                mime: if meta.is_empty() {
                    DEFAULT_MIME.to_string()
                } else {
                    meta
                },
            },
            30..=39 => GeminiOutcome::Redirect {
                target: meta,
                permanent: self.status == 31,
            },
            40..=44 => GeminiOutcome::Failure(NetworkError::InternalServerError(meta)),
            51 | 52 => GeminiOutcome::Failure(NetworkError::ResourceNotFound(meta)),
            53 => GeminiOutcome::Failure(NetworkError::ProxyRequest(meta)),
            59 => GeminiOutcome::Failure(NetworkError::BadRequest(meta)),
            50..=58 => GeminiOutcome::Failure(NetworkError::UnknownError(meta)),
            60 => GeminiOutcome::CertificateRequired(meta),
            61 => GeminiOutcome::Failure(NetworkError::Unauthorized(meta)),
            62 => GeminiOutcome::Failure(NetworkError::InvalidClientCertificate(meta)),
            other => GeminiOutcome::Failure(NetworkError::ProtocolViolation(format!(
                "Unhandled status code {}: {}",
                other, meta
            ))),
        }
    }
}

/// Everything the background task needs, detached from the adapter
struct GeminiRequest {
    location: Location,
    options: RequestOptions,
    trust_store: SharedTrustStore,
    resolver: Arc<HostResolver>,
    identity: Option<ClientIdentity>,
}

impl GeminiRequest {
    async fn run(self, sink: &EventSink) -> Result<(), NetworkError> {
        let host = self.location.host().to_string();
        let port = self.location.port_or_default().unwrap_or(DEFAULT_PORT);

        let addrs = self.resolver.socket_addrs(&host, port).await?;
        sink.state(RequestState::HostFound);

        let tcp = TcpStream::connect(&addrs[..]).await?;

        let enable_ca = self.trust_store.lock().enable_ca;
        let pinning = tls::pinning_config(enable_ca, self.identity.as_ref(), None)?;
        let connector = TlsConnector::from(pinning.config.clone());
        let mut stream = connector.connect(tls::server_name(&host)?, tcp).await?;

        let der = {
            let (_, connection) = stream.get_ref();
            connection
                .peer_certificates()
                .and_then(|chain| chain.first())
                .map(|cert| cert.0.clone())
        }
        .ok_or_else(|| NetworkError::TlsFailure("Server presented no certificate".into()))?;
        let certificate = HostCertificate::from_der(&der)
            .map_err(|e| NetworkError::TlsFailure(e.to_string()))?;

        sink.host_certificate_loaded(certificate.clone());
        tls::check_host_trust(
            &self.trust_store,
            self.location.url(),
            &certificate,
            pinning.ca_verified(),
            self.options,
        )?;
        sink.state(RequestState::Connected);

        let request_line = format!("{}\r\n", self.location.cache_key());
        stream.write_all(request_line.as_bytes()).await?;
        stream.flush().await?;
        sink.state(RequestState::RequestSent);

        let mut reader = BufReader::new(stream);
        let mut header = Vec::with_capacity(64);
        (&mut reader)
            .take(MAX_HEADER_LENGTH as u64)
            .read_until(b'\n', &mut header)
            .await?;
        if !header.ends_with(b"\n") {
            return Err(NetworkError::ProtocolViolation(
                "Response header is missing or too long".into(),
            ));
        }

        let header = parse_response_header(&header)?;
        log::debug!("{} answered {} {}", self.location, header.status, header.meta);

        match header.outcome() {
            GeminiOutcome::Input { query, sensitive } => {
                sink.input_required(query, sensitive);
            }
            GeminiOutcome::Success { mime } => {
                let body = read_body(&mut reader, sink).await?;
                sink.complete(body, mime);
            }
            GeminiOutcome::Redirect { target, permanent } => {
                sink.redirected(target, permanent);
            }
            GeminiOutcome::CertificateRequired(reason) => {
                sink.certificate_required(reason);
            }
            GeminiOutcome::Failure(error) => return Err(error),
        }
        Ok(())
    }
}

/// Adapter for `gemini://`
pub struct GeminiHandler {
    trust_store: SharedTrustStore,
    resolver: Option<Arc<HostResolver>>,
    identity: Option<ClientIdentity>,
    task: RequestTask,
}

impl GeminiHandler {
    pub fn new(trust_store: SharedTrustStore) -> Self {
        Self {
            trust_store,
            resolver: None,
            identity: None,
            task: RequestTask::default(),
        }
    }

    pub fn with_resolver(trust_store: SharedTrustStore, resolver: Arc<HostResolver>) -> Self {
        Self {
            resolver: Some(resolver),
            ..Self::new(trust_store)
        }
    }

    pub fn active_identity(&self) -> Option<&ClientIdentity> {
        self.identity.as_ref()
    }
}

impl ProtocolHandler for GeminiHandler {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn supports_scheme(&self, scheme: &str) -> bool {
        scheme == "gemini"
    }

    fn start_request(&mut self, location: &Location, options: RequestOptions, sink: EventSink) -> bool {
        if location.scheme() != "gemini" || location.host().is_empty() {
            return false;
        }
        if location.cache_key().len() > MAX_URL_LENGTH {
            log::warn!("Refusing gemini request longer than {} bytes", MAX_URL_LENGTH);
            return false;
        }

        let resolver = self
            .resolver
            .get_or_insert_with(|| Arc::new(HostResolver::new()))
            .clone();
        let request = GeminiRequest {
            location: location.without_fragment(),
            options,
            trust_store: self.trust_store.clone(),
            resolver,
            identity: self.identity.clone(),
        };

        sink.state(RequestState::Started);
        self.task.spawn("gemini", async move {
            let outcome = request.run(&sink).await;
            report("gemini", &sink, outcome);
        })
    }

    fn is_in_progress(&self) -> bool {
        self.task.is_running()
    }

    fn cancel_request(&mut self) -> bool {
        self.task.abort()
    }

    fn enable_client_certificate(&mut self, identity: &ClientIdentity) -> SecurityResult<()> {
        if !identity.is_valid() {
            return Err(SecurityError::ExpiredIdentity {
                name: identity.display_name.clone(),
            });
        }
        log::info!("Enabling client identity {} for gemini", identity.display_name);
        self.identity = Some(identity.clone());
        Ok(())
    }

    fn disable_client_certificate(&mut self) {
        self.identity = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_security::{TrustLevel, TrustStore};

    fn header(line: &str) -> ResponseHeader {
        parse_response_header(line.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_header() {
        let h = header("20 text/gemini; lang=en\r\n");
        assert_eq!(h.status, 20);
        assert_eq!(h.meta, "text/gemini; lang=en");

        assert_eq!(header("20\r\n").meta, "");
        assert_eq!(header("51 Not found").status, 51);
    }

    #[test]
    fn test_parse_header_rejects_garbage() {
        for line in ["", "2", "x0 hi\r\n", "200 OK\r\n", "20text/plain\r\n"] {
            let err = parse_response_header(line.as_bytes()).unwrap_err();
            assert!(matches!(err, NetworkError::ProtocolViolation(_)), "{:?}", line);
        }

        let long = format!("20 {}\r\n", "a".repeat(MAX_URL_LENGTH + 1));
        assert!(parse_response_header(long.as_bytes()).is_err());
        assert!(parse_response_header(b"20 \xff\xfe\r\n").is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            header("10 Name?").outcome(),
            GeminiOutcome::Input { query: "Name?".into(), sensitive: false }
        );
        assert_eq!(
            header("11 Password").outcome(),
            GeminiOutcome::Input { query: "Password".into(), sensitive: true }
        );
        assert_eq!(
            header("20").outcome(),
            GeminiOutcome::Success { mime: DEFAULT_MIME.into() }
        );
        assert_eq!(
            header("31 gemini://elsewhere/").outcome(),
            GeminiOutcome::Redirect { target: "gemini://elsewhere/".into(), permanent: true }
        );
        assert_eq!(
            header("30 /moved").outcome(),
            GeminiOutcome::Redirect { target: "/moved".into(), permanent: false }
        );
        assert_eq!(
            header("60 Need identity").outcome(),
            GeminiOutcome::CertificateRequired("Need identity".into())
        );
    }

    #[test]
    fn test_failure_mapping() {
        use crate::error::ErrorKind;

        let kind = |line: &str| match header(line).outcome() {
            GeminiOutcome::Failure(e) => e.kind(),
            other => panic!("expected failure for {}, got {:?}", line, other),
        };

        assert_eq!(kind("40 busy"), ErrorKind::InternalServerError);
        assert_eq!(kind("44 slow down"), ErrorKind::InternalServerError);
        assert_eq!(kind("51 gone"), ErrorKind::ResourceNotFound);
        assert_eq!(kind("52 gone"), ErrorKind::ResourceNotFound);
        assert_eq!(kind("53 no proxy"), ErrorKind::ProxyRequest);
        assert_eq!(kind("59 bad"), ErrorKind::BadRequest);
        assert_eq!(kind("50 fail"), ErrorKind::UnknownError);
        assert_eq!(kind("61 nope"), ErrorKind::Unauthorized);
        assert_eq!(kind("62 invalid"), ErrorKind::InvalidClientCertificate);
        assert_eq!(kind("45 odd"), ErrorKind::ProtocolViolation);
        assert_eq!(kind("99 odd"), ErrorKind::ProtocolViolation);
    }

    #[test]
    fn test_start_request_preconditions() {
        let mut handler = GeminiHandler::new(TrustStore::new(TrustLevel::TrustOnFirstUse).shared());
        let (tx, _rx) = crate::handler::event_channel();
        let sink = EventSink::new(crate::handler::RequestId(1), tx);

        let wrong_scheme = Location::parse("gopher://example.org/").unwrap();
        assert!(!handler.start_request(&wrong_scheme, RequestOptions::default(), sink.clone()));

        let long = format!("gemini://example.org/{}", "a".repeat(MAX_URL_LENGTH));
        let long = Location::parse(&long).unwrap();
        assert!(!handler.start_request(&long, RequestOptions::default(), sink));
        assert!(!handler.is_in_progress());
    }

    #[test]
    fn test_identity_must_be_current() {
        use chrono::{Duration, Utc};
        use wayfarer_security::IdentityPersistence;

        let mut handler = GeminiHandler::new(TrustStore::new(TrustLevel::TrustOnFirstUse).shared());
        let mut identity = ClientIdentity::new(
            "alice",
            b"certificate".to_vec(),
            b"key".to_vec(),
            Utc::now() - Duration::days(2),
            Utc::now() + Duration::days(2),
            IdentityPersistence::Transient,
        );
        assert!(handler.enable_client_certificate(&identity).is_ok());
        assert_eq!(handler.active_identity().map(|i| i.display_name.as_str()), Some("alice"));

        handler.disable_client_certificate();
        identity.not_after = Utc::now() - Duration::days(1);
        assert!(matches!(
            handler.enable_client_certificate(&identity),
            Err(SecurityError::ExpiredIdentity { .. })
        ));
        assert!(handler.active_identity().is_none());
    }
}
