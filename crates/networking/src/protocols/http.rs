use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{redirect, Client, StatusCode};
use wayfarer_security::SharedTrustStore;

use super::{report, RequestTask};
use crate::error::NetworkError;
use crate::handler::{EventSink, ProtocolHandler};
use crate::location::Location;
use crate::request::{RequestOptions, RequestState};
use crate::tls::{self, HandshakeTrust};

const USER_AGENT: &str = concat!("wayfarer/", env!("CARGO_PKG_VERSION"));

/// What a response status asks for, before the body is read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebOutcome {
    Body,
    Redirect { target: String, permanent: bool },
    Failure(NetworkError),
}

/// Map a response status (and `Location` header, if any) onto the taxonomy
pub fn classify_status(status: StatusCode, location: Option<&str>) -> WebOutcome {
    let reason = status.to_string();
    match status.as_u16() {
        200..=299 => WebOutcome::Body,
        300..=399 => match location {
            Some(target) => WebOutcome::Redirect {
                target: target.to_string(),
                permanent: matches!(status.as_u16(), 301 | 308),
            },
            None => WebOutcome::Failure(NetworkError::ProtocolViolation(format!(
                "{} without a Location header",
                reason
            ))),
        },
        401 | 403 => WebOutcome::Failure(NetworkError::Unauthorized(reason)),
        404 | 410 => WebOutcome::Failure(NetworkError::ResourceNotFound(reason)),
        407 => WebOutcome::Failure(NetworkError::ProxyRequest(reason)),
        400..=499 => WebOutcome::Failure(NetworkError::BadRequest(reason)),
        500..=599 => WebOutcome::Failure(NetworkError::InternalServerError(reason)),
        _ => WebOutcome::Failure(NetworkError::ProtocolViolation(reason)),
    }
}

struct WebRequest {
    location: Location,
    options: RequestOptions,
    trust_store: SharedTrustStore,
}

impl WebRequest {
    async fn run(self, sink: &EventSink) -> Result<(), NetworkError> {
        let is_https = self.location.scheme() == "https";
        let enable_ca = self.trust_store.lock().enable_ca;
        // Decided during the handshake, so a refused host never receives the request
        let pinning = tls::pinning_config(
            enable_ca,
            None,
            Some(HandshakeTrust {
                store: self.trust_store.clone(),
                url: self.location.url().clone(),
                options: self.options,
            }),
        )?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::none())
            .use_preconfigured_tls((*pinning.config).clone())
            .build()?;

        let sent = client.get(self.location.url().clone()).send().await;

        let handshake = pinning.take_handshake();
        if let Some(certificate) = handshake.peer {
            sink.host_certificate_loaded(certificate);
        } else if is_https && sent.is_ok() {
            return Err(NetworkError::TlsFailure("Server presented no certificate".into()));
        }
        if let Some(rejection) = handshake.rejection {
            return Err(rejection);
        }

        let mut response = sent?;
        sink.state(RequestState::Connected);

        let redirect_target = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match classify_status(response.status(), redirect_target.as_deref()) {
            WebOutcome::Redirect { target, permanent } => {
                sink.redirected(target, permanent);
            }
            WebOutcome::Failure(error) => return Err(error),
            WebOutcome::Body => {
                let mime = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("application/octet-stream")
                    .to_string();

                let mut body = Vec::new();
                while let Some(chunk) = response.chunk().await? {
                    body.extend_from_slice(&chunk);
                    sink.progress(body.len() as u64);
                }
                sink.complete(body, mime);
            }
        }
        Ok(())
    }
}

/// Adapter for `http://` and `https://`. Redirects are never followed here.
pub struct WebHandler {
    trust_store: SharedTrustStore,
    task: RequestTask,
}

impl WebHandler {
    pub fn new(trust_store: SharedTrustStore) -> Self {
        Self {
            trust_store,
            task: RequestTask::default(),
        }
    }
}

impl ProtocolHandler for WebHandler {
    fn name(&self) -> &'static str {
        "web"
    }

    fn supports_scheme(&self, scheme: &str) -> bool {
        matches!(scheme, "http" | "https")
    }

    fn start_request(&mut self, location: &Location, options: RequestOptions, sink: EventSink) -> bool {
        if !self.supports_scheme(location.scheme()) || location.host().is_empty() {
            return false;
        }

        let request = WebRequest {
            location: location.without_fragment(),
            options,
            trust_store: self.trust_store.clone(),
        };

        sink.state(RequestState::StartedWeb);
        self.task.spawn("web", async move {
            let outcome = request.run(&sink).await;
            report("web", &sink, outcome);
        })
    }

    fn is_in_progress(&self) -> bool {
        self.task.is_running()
    }

    fn cancel_request(&mut self) -> bool {
        self.task.abort()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn failure(code: u16) -> ErrorKind {
        match classify_status(StatusCode::from_u16(code).unwrap(), None) {
            WebOutcome::Failure(e) => e.kind(),
            other => panic!("expected failure for {}, got {:?}", code, other),
        }
    }

    #[test]
    fn test_success_and_redirects() {
        assert_eq!(classify_status(StatusCode::OK, None), WebOutcome::Body);
        assert_eq!(
            classify_status(StatusCode::MOVED_PERMANENTLY, Some("/new")),
            WebOutcome::Redirect { target: "/new".into(), permanent: true }
        );
        assert_eq!(
            classify_status(StatusCode::FOUND, Some("https://example.org/")),
            WebOutcome::Redirect { target: "https://example.org/".into(), permanent: false }
        );
        assert_eq!(
            classify_status(StatusCode::PERMANENT_REDIRECT, Some("/x")),
            WebOutcome::Redirect { target: "/x".into(), permanent: true }
        );
        assert_eq!(failure(302), ErrorKind::ProtocolViolation);
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(failure(400), ErrorKind::BadRequest);
        assert_eq!(failure(401), ErrorKind::Unauthorized);
        assert_eq!(failure(403), ErrorKind::Unauthorized);
        assert_eq!(failure(404), ErrorKind::ResourceNotFound);
        assert_eq!(failure(410), ErrorKind::ResourceNotFound);
        assert_eq!(failure(407), ErrorKind::ProxyRequest);
        assert_eq!(failure(418), ErrorKind::BadRequest);
        assert_eq!(failure(503), ErrorKind::InternalServerError);
    }

    #[test]
    fn test_schemes() {
        let handler = WebHandler::new(
            wayfarer_security::TrustStore::new(wayfarer_security::TrustLevel::TrustOnFirstUse).shared(),
        );
        assert!(handler.supports_scheme("http"));
        assert!(handler.supports_scheme("https"));
        assert!(!handler.supports_scheme("gemini"));
    }
}
