use super::{report, RequestTask};
use crate::error::NetworkError;
use crate::handler::{EventSink, ProtocolHandler};
use crate::location::Location;
use crate::request::{RequestOptions, RequestState};

const HELP_PAGE: &str = "\
# Wayfarer

Wayfarer fetches documents over Gemini, Gopher, Finger and the web.

## Supported locations
* gemini://host/path
* gopher://host/<type><selector>
* finger://user@host
* http:// and https://
* file:///path/to/document.gmi
* about:blank and about:help

## Certificates
Servers are trusted on first use. A server that later presents a different key is reported before anything is loaded.
";

/// The body and media type of a built-in page
pub fn builtin_page(name: &str) -> Option<(&'static str, &'static str)> {
    match name {
        "blank" => Some(("", "text/gemini")),
        "help" => Some((HELP_PAGE, "text/gemini")),
        _ => None,
    }
}

/// Adapter for the synthetic `about:` scheme
#[derive(Default)]
pub struct AboutHandler {
    task: RequestTask,
}

impl AboutHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProtocolHandler for AboutHandler {
    fn name(&self) -> &'static str {
        "about"
    }

    fn supports_scheme(&self, scheme: &str) -> bool {
        scheme == "about"
    }

    fn start_request(&mut self, location: &Location, _options: RequestOptions, sink: EventSink) -> bool {
        if location.scheme() != "about" {
            return false;
        }

        let name = location.path().to_string();
        sink.state(RequestState::Started);
        self.task.spawn("about", async move {
            let outcome = match builtin_page(&name) {
                Some((body, mime)) => {
                    sink.complete(body, mime);
                    Ok(())
                }
                None => Err(NetworkError::ResourceNotFound(format!(
                    "There is no built-in page called about:{}",
                    name
                ))),
            };
            report("about", &sink, outcome);
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
    use crate::handler::{event_channel, HandlerEvent, RequestId};

    async fn fetch(url: &str) -> HandlerEvent {
        let (tx, mut rx) = event_channel();
        let mut handler = AboutHandler::new();
        let location = Location::parse(url).unwrap();
        assert!(handler.start_request(&location, RequestOptions::default(), EventSink::new(RequestId(1), tx)));

        loop {
            let (_, event) = rx.recv().await.unwrap();
            if event.is_terminal() {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_builtin_pages() {
        match fetch("about:help").await {
            HandlerEvent::Complete { body, mime } => {
                assert!(body.starts_with(b"# Wayfarer"));
                assert_eq!(mime, "text/gemini");
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(fetch("about:blank").await, HandlerEvent::Complete { .. }));
    }

    #[tokio::test]
    async fn test_unknown_page() {
        match fetch("about:nothing").await {
            HandlerEvent::NetworkError(NetworkError::ResourceNotFound(reason)) => {
                assert!(reason.contains("about:nothing"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
