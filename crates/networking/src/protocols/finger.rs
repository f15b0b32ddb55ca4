use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::{has_line_break, percent_decode, read_body, report, RequestTask};
use crate::dns::HostResolver;
use crate::error::NetworkError;
use crate::handler::{EventSink, ProtocolHandler};
use crate::location::Location;
use crate::request::{RequestOptions, RequestState};

const DEFAULT_PORT: u16 = 79;
const FINGER_MIME: &str = "text/finger";

/// The user queried by a finger location: `finger://host/user` or `finger://user@host`
pub fn finger_user(location: &Location) -> String {
    let url = location.url();
    let from_path = location.path().trim_start_matches('/');
    let user = if !url.username().is_empty() {
        url.username()
    } else {
        from_path
    };
    String::from_utf8_lossy(&percent_decode(user)).into_owned()
}

/// Adapter for `finger://`
#[derive(Default)]
pub struct FingerHandler {
    resolver: Option<Arc<HostResolver>>,
    task: RequestTask,
}

impl FingerHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

async fn finger(
    resolver: Arc<HostResolver>,
    host: String,
    port: u16,
    user: String,
    sink: &EventSink,
) -> Result<(), NetworkError> {
    let addrs = resolver.socket_addrs(&host, port).await?;
    sink.state(RequestState::HostFound);

    let mut stream = TcpStream::connect(&addrs[..]).await?;
    sink.state(RequestState::Connected);

    stream.write_all(format!("{}\r\n", user).as_bytes()).await?;
    stream.flush().await?;
    sink.state(RequestState::RequestSent);

    let body = read_body(&mut stream, sink).await?;
    sink.complete(body, FINGER_MIME);
    Ok(())
}

impl ProtocolHandler for FingerHandler {
    fn name(&self) -> &'static str {
        "finger"
    }

    fn supports_scheme(&self, scheme: &str) -> bool {
        scheme == "finger"
    }

    fn start_request(&mut self, location: &Location, _options: RequestOptions, sink: EventSink) -> bool {
        if location.scheme() != "finger" || location.host().is_empty() {
            return false;
        }

        let resolver = self
            .resolver
            .get_or_insert_with(|| Arc::new(HostResolver::new()))
            .clone();
        let host = location.host().to_string();
        let port = location.port_or_default().unwrap_or(DEFAULT_PORT);
        let user = finger_user(location);
        if has_line_break(user.as_bytes()) {
            log::warn!("Refusing finger query with a line break: {}", location);
            return false;
        }

        sink.state(RequestState::Started);
        self.task.spawn("finger", async move {
            let outcome = finger(resolver, host, port, user, &sink).await;
            report("finger", &sink, outcome);
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
    use crate::handler::{event_channel, RequestId};

    #[test]
    fn test_user_from_path_or_userinfo() {
        let user = |url: &str| finger_user(&Location::parse(url).unwrap());

        assert_eq!(user("finger://example.org/alice"), "alice");
        assert_eq!(user("finger://bob@example.org"), "bob");
        assert_eq!(user("finger://example.org"), "");
    }

    #[test]
    fn test_encoded_line_breaks_are_refused() {
        let mut handler = FingerHandler::new();
        let (tx, _rx) = event_channel();
        let location = Location::parse("finger://example.org/alice%0D%0Abob").unwrap();
        assert!(!handler.start_request(&location, RequestOptions::default(), EventSink::new(RequestId(1), tx)));
        assert!(!handler.is_in_progress());
    }

    #[test]
    fn test_supports_only_finger() {
        let handler = FingerHandler::new();
        assert!(handler.supports_scheme("finger"));
        assert!(!handler.supports_scheme("gopher"));
    }
}
