use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::{has_line_break, percent_decode, read_body, report, RequestTask};
use crate::dns::HostResolver;
use crate::error::NetworkError;
use crate::handler::{EventSink, ProtocolHandler};
use crate::location::Location;
use crate::request::{RequestOptions, RequestState};

const DEFAULT_PORT: u16 = 70;

/// A gopher request decoded from a location path of the form `/<type><selector>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GopherSelector {
    pub item_type: char,
    pub selector: Vec<u8>,
    pub query: Option<Vec<u8>>,
}

impl GopherSelector {
    pub fn from_location(location: &Location) -> Self {
        let path = location.path();
        let mut chars = path.strip_prefix('/').unwrap_or(path).chars();

        let item_type = chars.next().unwrap_or('1');
        let selector = percent_decode(chars.as_str());
        let query = if item_type == '7' {
            location.query().map(percent_decode)
        } else {
            None
        };

        Self {
            item_type,
            selector,
            query,
        }
    }

    /// The line sent to the server
    pub fn request_line(&self) -> Vec<u8> {
        let mut line = self.selector.clone();
        if let Some(query) = &self.query {
            line.push(b'\t');
            line.extend_from_slice(query);
        }
        line.extend_from_slice(b"\r\n");
        line
    }

    /// False when a decoded CR or LF would split the request line
    pub fn is_single_line(&self) -> bool {
        !has_line_break(&self.selector) && !self.query.as_deref().map_or(false, has_line_break)
    }

    pub fn is_menu(&self) -> bool {
        matches!(self.item_type, '1' | '7')
    }

    pub fn mime(&self) -> &'static str {
        mime_for_item(self.item_type, &self.selector)
    }
}

fn mime_for_item(item_type: char, selector: &[u8]) -> &'static str {
    match item_type {
        '0' => "text/plain",
        '1' | '7' => "text/gophermap",
        'h' => "text/html",
        'g' => "image/gif",
        'I' | ':' => {
            let lower = String::from_utf8_lossy(selector).to_ascii_lowercase();
            if lower.ends_with(".png") {
                "image/png"
            } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
                "image/jpeg"
            } else if lower.ends_with(".gif") {
                "image/gif"
            } else {
                "application/octet-stream"
            }
        }
        _ => "application/octet-stream",
    }
}

/// If a menu starts with an error item, return its display string
fn menu_error(body: &[u8]) -> Option<String> {
    let first = body.split(|&b| b == b'\n').next()?;
    let first = first.strip_suffix(b"\r").unwrap_or(first);
    let display = first.strip_prefix(b"3")?;
    let display = display.split(|&b| b == b'\t').next().unwrap_or(display);
    Some(String::from_utf8_lossy(display).trim().to_string())
}

struct GopherRequest {
    host: String,
    port: u16,
    selector: GopherSelector,
    resolver: Arc<HostResolver>,
}

impl GopherRequest {
    async fn run(self, sink: &EventSink) -> Result<(), NetworkError> {
        let addrs = self.resolver.socket_addrs(&self.host, self.port).await?;
        sink.state(RequestState::HostFound);

        let mut stream = TcpStream::connect(&addrs[..]).await?;
        sink.state(RequestState::Connected);

        stream.write_all(&self.selector.request_line()).await?;
        stream.flush().await?;
        sink.state(RequestState::RequestSent);

        let body = read_body(&mut stream, sink).await?;

        if self.selector.is_menu() {
            if let Some(reason) = menu_error(&body) {
                return Err(NetworkError::ResourceNotFound(reason));
            }
        }

        sink.complete(body, self.selector.mime());
        Ok(())
    }
}

/// Adapter for `gopher://`
#[derive(Default)]
pub struct GopherHandler {
    resolver: Option<Arc<HostResolver>>,
    task: RequestTask,
}

impl GopherHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver(resolver: Arc<HostResolver>) -> Self {
        Self {
            resolver: Some(resolver),
            task: RequestTask::default(),
        }
    }
}

impl ProtocolHandler for GopherHandler {
    fn name(&self) -> &'static str {
        "gopher"
    }

    fn supports_scheme(&self, scheme: &str) -> bool {
        scheme == "gopher"
    }

    fn start_request(&mut self, location: &Location, _options: RequestOptions, sink: EventSink) -> bool {
        if location.scheme() != "gopher" || location.host().is_empty() {
            return false;
        }

        let selector = GopherSelector::from_location(location);
        if !selector.is_single_line() {
            log::warn!("Refusing gopher selector with a line break: {}", location);
            return false;
        }

        let request = GopherRequest {
            host: location.host().to_string(),
            port: location.port_or_default().unwrap_or(DEFAULT_PORT),
            selector,
            resolver: self
                .resolver
                .get_or_insert_with(|| Arc::new(HostResolver::new()))
                .clone(),
        };

        sink.state(RequestState::Started);
        self.task.spawn("gopher", async move {
            let outcome = request.run(&sink).await;
            report("gopher", &sink, outcome);
        })
    }

    fn is_in_progress(&self) -> bool {
        self.task.is_running()
    }

    fn cancel_request(&mut self) -> bool {
        self.task.abort()
    }
}
