use std::sync::Arc;

use bytes::Bytes;
use tokio::time::{sleep_until, Instant};
use wayfarer_networking::{
    event_channel, AboutHandler, ErrorKind, EventReceiver, EventSender, EventSink, FileHandler,
    FingerHandler, GeminiHandler, GopherHandler, HandlerEvent, Location, MimeType, NetworkError,
    ProtocolHandler, RequestId, RequestOptions, WebHandler, MAX_URL_LENGTH,
};
use wayfarer_security::{ClientIdentity, HostCertificate};

use crate::context::ClientContext;
use crate::delegate::{
    Document, IdentityPrompt, InputPrompt, NavigationDelegate, RedirectPrompt, SessionEvent,
    TrustDecision, TrustPrompt,
};
use crate::error_pages::{error_document, message_document};
use crate::{NavigationError, NavigationResult};

/// Whether a navigation adds a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushToHistory {
    PushImmediate,
    DontPush,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFlags {
    /// Always go to the network
    pub dont_read_from_cache: bool,
    /// Restore the stored scroll position on a cache hit
    pub navigated_back_or_forward: bool,
}

impl RequestFlags {
    pub const NONE: Self = Self {
        dont_read_from_cache: false,
        navigated_back_or_forward: false,
    };
    pub const DONT_READ_FROM_CACHE: Self = Self {
        dont_read_from_cache: true,
        navigated_back_or_forward: false,
    };
    pub const NAVIGATED_BACK_OR_FORWARD: Self = Self {
        dont_read_from_cache: false,
        navigated_back_or_forward: true,
    };
}

/// Where the current navigation stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationState {
    Idle,
    Requesting,
    Redirecting,
    CertificateNeeded,
    InputNeeded,
    Completed,
    /// An error document was delivered
    Failed,
}

/// The request currently owned by an adapter
#[derive(Debug)]
struct ActiveRequest {
    id: RequestId,
    handler: usize,
    location: Location,
    deadline: Instant,
    /// Timed out but the adapter refused to stop; events are ignored and
    /// new navigation is blocked until a cancel succeeds
    stuck: bool,
}

enum Wake {
    Event(Option<(RequestId, HandlerEvent)>),
    Timeout,
}

/// One browsing context: at most one request in flight, one current location.
///
/// Adapters report back over a channel owned by the session. Nothing happens
/// between calls; the caller drives the session with
/// [`NavigationSession::process_next_event`] or
/// [`NavigationSession::run_until_settled`].
pub struct NavigationSession<D: NavigationDelegate> {
    context: Arc<ClientContext>,
    delegate: D,
    handlers: Vec<Box<dyn ProtocolHandler>>,
    events_tx: EventSender,
    events_rx: EventReceiver,
    last_id: RequestId,
    active: Option<ActiveRequest>,
    state: NavigationState,
    current_location: Option<Location>,
    is_internal_location: bool,
    server_certificate: Option<HostCertificate>,
    identity: Option<ClientIdentity>,
    redirect_count: u32,
    navigation_started: Instant,
    history: Vec<Location>,
    history_index: Option<usize>,
}

impl<D: NavigationDelegate> NavigationSession<D> {
    /// A session with an adapter for every supported scheme family
    pub fn new(context: Arc<ClientContext>, delegate: D) -> Self {
        let handlers: Vec<Box<dyn ProtocolHandler>> = vec![
            Box::new(GeminiHandler::new(context.gemini_trust.clone())),
            Box::new(GopherHandler::new()),
            Box::new(FingerHandler::new()),
            Box::new(WebHandler::new(context.https_trust.clone())),
            Box::new(AboutHandler::new()),
            Box::new(FileHandler::new()),
        ];
        Self::with_handlers(context, delegate, handlers)
    }

    pub fn with_handlers(
        context: Arc<ClientContext>,
        delegate: D,
        handlers: Vec<Box<dyn ProtocolHandler>>,
    ) -> Self {
        let (events_tx, events_rx) = event_channel();
        Self {
            context,
            delegate,
            handlers,
            events_tx,
            events_rx,
            last_id: RequestId(0),
            active: None,
            state: NavigationState::Idle,
            current_location: None,
            is_internal_location: false,
            server_certificate: None,
            identity: None,
            redirect_count: 0,
            navigation_started: Instant::now(),
            history: Vec::new(),
            history_index: None,
        }
    }

    /// Adapters are matched in registration order
    pub fn add_protocol_handler(&mut self, handler: Box<dyn ProtocolHandler>) {
        self.handlers.push(handler);
    }

    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    pub fn delegate_mut(&mut self) -> &mut D {
        &mut self.delegate
    }

    pub fn context(&self) -> &Arc<ClientContext> {
        &self.context
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    pub fn is_in_progress(&self) -> bool {
        self.active.is_some()
    }

    pub fn current_location(&self) -> Option<&Location> {
        self.current_location.as_ref()
    }

    pub fn current_identity(&self) -> Option<&ClientIdentity> {
        self.identity.as_ref()
    }

    /// Certificate presented by the server of the current request, if any
    pub fn server_certificate(&self) -> Option<&HostCertificate> {
        self.server_certificate.as_ref()
    }

    pub fn redirect_count(&self) -> u32 {
        self.redirect_count
    }

    pub fn history(&self) -> &[Location] {
        &self.history
    }

    fn handler_for(&self, scheme: &str) -> Option<usize> {
        self.handlers.iter().position(|h| h.supports_scheme(scheme))
    }

    fn check_scheme(&self, location: &Location) -> NavigationResult<()> {
        let scheme = location.scheme();
        if !self.context.settings.protocols.is_enabled(scheme) {
            return Err(NavigationError::SchemeDisabled(scheme.to_string()));
        }
        if self.handler_for(scheme).is_none() {
            return Err(NavigationError::UnsupportedScheme(scheme.to_string()));
        }
        Ok(())
    }

    /// Start a user initiated navigation.
    ///
    /// A running request is cancelled first; if its adapter refuses, the new
    /// navigation is abandoned and the old one keeps running.
    pub fn navigate(
        &mut self,
        location: Location,
        push: PushToHistory,
        flags: RequestFlags,
    ) -> NavigationResult<()> {
        self.check_scheme(&location)?;

        if let Some(index) = self.active.as_ref().map(|a| a.handler) {
            if !self.handlers[index].cancel_request() {
                log::warn!("Adapter {} refused to cancel its request", self.handlers[index].name());
                return Err(NavigationError::CancellationRefused);
            }
            self.active = None;
            self.state = NavigationState::Idle;
        }

        self.store_scroll_position();
        self.redirect_count = 0;
        self.navigation_started = Instant::now();

        log::info!("Navigating to {}", location);
        self.delegate
            .on_event(SessionEvent::NavigationStarted(location.clone()));

        self.start_request(location.clone(), RequestOptions::default(), flags)?;

        if push == PushToHistory::PushImmediate {
            self.push_history(location);
        }
        Ok(())
    }

    pub fn reload(&mut self) -> NavigationResult<()> {
        let current = self
            .current_location
            .clone()
            .ok_or(NavigationError::NoCurrentLocation)?;
        self.navigate(current, PushToHistory::DontPush, RequestFlags::DONT_READ_FROM_CACHE)
    }

    /// Cancel the running request. Returns false if the adapter refused.
    pub fn stop(&mut self) -> bool {
        let Some(index) = self.active.as_ref().map(|a| a.handler) else {
            return true;
        };
        if !self.handlers[index].cancel_request() {
            return false;
        }
        self.active = None;
        self.state = NavigationState::Idle;
        true
    }

    pub fn navigate_to_root(&mut self) -> NavigationResult<()> {
        match &self.current_location {
            Some(current) if current.scheme() != "about" => {
                let root = current.root();
                self.navigate(root, PushToHistory::PushImmediate, RequestFlags::NONE)
            }
            _ => Ok(()),
        }
    }

    pub fn navigate_to_parent(&mut self) -> NavigationResult<()> {
        match &self.current_location {
            Some(current) if current.scheme() != "about" => {
                let parent = current.parent();
                self.navigate(parent, PushToHistory::PushImmediate, RequestFlags::NONE)
            }
            _ => Ok(()),
        }
    }

    /// Go one entry back in history. Does nothing at the first entry.
    pub fn go_back(&mut self) -> NavigationResult<()> {
        match self.history_index {
            Some(index) if index > 0 => self.traverse_to(index - 1),
            _ => Ok(()),
        }
    }

    pub fn go_forward(&mut self) -> NavigationResult<()> {
        match self.history_index {
            Some(index) if index + 1 < self.history.len() => self.traverse_to(index + 1),
            _ => Ok(()),
        }
    }

    fn traverse_to(&mut self, index: usize) -> NavigationResult<()> {
        let target = self.history[index].clone();
        self.navigate(
            target,
            PushToHistory::DontPush,
            RequestFlags::NAVIGATED_BACK_OR_FORWARD,
        )?;
        self.history_index = Some(index);
        Ok(())
    }

    fn push_history(&mut self, location: Location) {
        let next = self.history_index.map_or(0, |i| i + 1);
        self.history.truncate(next);
        self.history.push(location);
        self.history_index = Some(next);
    }

    fn replace_history(&mut self, location: Location) {
        match self.history_index {
            Some(index) => self.history[index] = location,
            None => self.push_history(location),
        }
    }

    /// Present `identity` on the following requests
    pub fn enable_client_certificate(&mut self, identity: ClientIdentity) -> NavigationResult<()> {
        if !identity.is_valid() {
            self.disable_client_certificate();
            return Err(NavigationError::InvalidIdentity(identity.display_name));
        }
        log::info!("Client identity {} enabled", identity.display_name);
        self.identity = Some(identity);
        Ok(())
    }

    pub fn disable_client_certificate(&mut self) {
        for handler in &mut self.handlers {
            handler.disable_client_certificate();
        }
        if let Some(identity) = self.identity.take() {
            log::info!("Client identity {} disabled", identity.display_name);
        }
    }

    fn store_scroll_position(&mut self) {
        let (Some(current), Some(position)) = (
            self.current_location.as_ref(),
            self.delegate.current_scroll_position(),
        ) else {
            return;
        };
        if let Some(entry) = self.context.cache.lock().find(current) {
            entry.scroll_position = Some(position);
        }
    }

    fn start_request(
        &mut self,
        location: Location,
        options: RequestOptions,
        flags: RequestFlags,
    ) -> NavigationResult<()> {
        let handler = self.handler_for(location.scheme()).unwrap_or_else(|| {
            panic!(
                "no protocol handler registered for scheme {}; every enabled scheme needs one",
                location.scheme()
            )
        });

        self.server_certificate = None;
        self.resolve_identity(handler, &location)?;

        self.is_internal_location = location.is_internal();
        self.current_location = Some(location.clone());

        if !flags.dont_read_from_cache && self.identity.is_none() {
            let cached = {
                let mut cache = self.context.cache.lock();
                cache.clean();
                cache
                    .find(&location)
                    .map(|entry| (entry.body.clone(), entry.mime.clone(), entry.scroll_position))
            };

            if let Some((body, mime, scroll_position)) = cached {
                log::debug!("Serving {} from cache", location);
                let scroll_position = scroll_position.filter(|_| flags.navigated_back_or_forward);
                self.deliver(body, mime, true, scroll_position);
                return Ok(());
            }
        }

        self.dispatch(handler, location, options)
    }

    fn dispatch(
        &mut self,
        handler: usize,
        location: Location,
        options: RequestOptions,
    ) -> NavigationResult<()> {
        self.last_id = self.last_id.next();
        let id = self.last_id;
        let sink = EventSink::new(id, self.events_tx.clone());

        if !self.handlers[handler].start_request(&location.without_fragment(), options, sink) {
            log::warn!("Adapter {} rejected {}", self.handlers[handler].name(), location);
            self.state = NavigationState::Failed;
            return Err(NavigationError::RequestRejected(location.to_string()));
        }

        log::debug!(
            "Dispatched {} to {} as {:?}",
            location,
            self.handlers[handler].name(),
            id
        );
        self.active = Some(ActiveRequest {
            id,
            handler,
            location,
            deadline: Instant::now() + self.context.settings.network_timeout(),
            stuck: false,
        });
        self.state = NavigationState::Requesting;
        Ok(())
    }

    /// Apply the client identity policy before a request to `location`
    fn resolve_identity(&mut self, handler: usize, location: &Location) -> NavigationResult<()> {
        self.bind_identity(handler, location)?;

        if let Some(identity) = self.identity.clone() {
            let from = self.current_location.as_ref().map(|c| c.host().to_string());
            if let Some(from) = from.filter(|host| host != location.host()) {
                let keep = self.delegate.confirm_identity(&IdentityPrompt::HostChanged {
                    identity: identity.display_name.clone(),
                    from,
                    to: location.host().to_string(),
                });
                if !keep {
                    self.disable_client_certificate();
                }
            }
        }

        match self.identity.clone() {
            Some(identity) => {
                if identity.is_host_filtered(location.url()) {
                    let keep = self.delegate.confirm_identity(&IdentityPrompt::OutsideHostFilter {
                        identity: identity.display_name.clone(),
                        filter: identity.host_filter.clone().unwrap_or_default(),
                        destination: location.clone(),
                    });
                    if !keep {
                        self.disable_client_certificate();
                    }
                }
            }
            None => {
                let candidate = self
                    .context
                    .identities
                    .read()
                    .automatic_identity_for(location.url())
                    .cloned();
                if let Some(candidate) = candidate {
                    let accept = self.delegate.confirm_identity(&IdentityPrompt::AutoEnable {
                        identity: candidate.display_name.clone(),
                        destination: location.clone(),
                    });
                    if accept {
                        if let Err(e) = self.enable_client_certificate(candidate) {
                            log::warn!("Automatic identity not enabled: {}", e);
                        }
                    }
                }
            }
        }

        self.bind_identity(handler, location)
    }

    /// Hand the active identity to the adapter, or clear it everywhere
    fn bind_identity(&mut self, handler: usize, location: &Location) -> NavigationResult<()> {
        match self.identity.clone() {
            Some(identity) => {
                if let Err(e) = self.handlers[handler].enable_client_certificate(&identity) {
                    log::debug!("{}", e);
                    let proceed = self.delegate.confirm_identity(&IdentityPrompt::UnsupportedScheme {
                        identity: identity.display_name.clone(),
                        scheme: location.scheme().to_string(),
                    });
                    if !proceed {
                        return Err(NavigationError::CancelledByUser);
                    }
                    self.disable_client_certificate();
                }
            }
            None => self.disable_client_certificate(),
        }
        Ok(())
    }

    /// Wait for the next adapter event, or the timeout, and act on it.
    /// Returns false right away when there is nothing to wait for.
    pub async fn process_next_event(&mut self) -> bool {
        let Some(deadline) = self
            .active
            .as_ref()
            .filter(|a| !a.stuck)
            .map(|a| a.deadline)
        else {
            return false;
        };

        let wake = tokio::select! {
            biased;
            received = self.events_rx.recv() => Wake::Event(received),
            _ = sleep_until(deadline) => Wake::Timeout,
        };

        match wake {
            Wake::Event(Some((id, event))) => self.handle_event(id, event),
            // The session holds a sender, so the channel never closes
            Wake::Event(None) => {}
            Wake::Timeout => self.on_timeout(),
        }
        true
    }

    /// Process events until no request is in flight
    pub async fn run_until_settled(&mut self) {
        while self.process_next_event().await {}
    }

    fn handle_event(&mut self, id: RequestId, event: HandlerEvent) {
        match &self.active {
            Some(active) if active.id == id && !active.stuck => {}
            _ => {
                log::debug!("Dropping stale event from {:?}", id);
                return;
            }
        }
        if event.is_terminal() {
            self.active = None;
        }

        match event {
            HandlerEvent::Progress(received) => {
                let timeout = self.context.settings.network_timeout();
                if let Some(active) = &mut self.active {
                    active.deadline = Instant::now() + timeout;
                }
                self.delegate.on_event(SessionEvent::Progress { received });
            }
            HandlerEvent::StateChanged(state) => {
                self.delegate.on_event(SessionEvent::RequestStateChanged(state));
            }
            HandlerEvent::HostCertificateLoaded(certificate) => {
                self.server_certificate = Some(certificate.clone());
                self.delegate
                    .on_event(SessionEvent::HostCertificateLoaded(certificate));
            }
            HandlerEvent::Complete { body, mime } => {
                self.deliver(body, MimeType::parse_or_octet_stream(&mime), false, None);
            }
            HandlerEvent::NetworkError(error) => self.on_network_error(error),
            HandlerEvent::Redirected { target, permanent } => self.on_redirected(&target, permanent),
            HandlerEvent::InputRequired { query, sensitive } => {
                self.on_input_required(query, sensitive)
            }
            HandlerEvent::CertificateRequired(reason) => self.on_certificate_required(reason),
        }
    }

    fn on_timeout(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        log::warn!("Request for {} timed out", active.location);
        if self.handlers[active.handler].cancel_request() {
            self.active = None;
        } else {
            log::warn!(
                "Adapter {} refused to cancel the timed out request",
                self.handlers[active.handler].name()
            );
            active.stuck = true;
        }
        self.on_network_error(NetworkError::Timeout(
            "The server didn't respond in time.".into(),
        ));
    }

    fn on_network_error(&mut self, error: NetworkError) {
        if error.is_trust_related() && self.try_trust_override(&error) {
            return;
        }

        log::info!("Request failed: {}", error);
        let (body, mime) = error_document(&error);
        self.is_internal_location = true;
        self.deliver(body, mime, false, None);
        self.state = NavigationState::Failed;
    }

    /// Ask the delegate about an untrusted or changed certificate. Returns
    /// true if the request was sent again.
    fn try_trust_override(&mut self, error: &NetworkError) -> bool {
        let Some(location) = self.current_location.clone() else {
            return false;
        };
        let certificate = self.server_certificate.clone();

        let decision = self.delegate.confirm_untrusted_host(&TrustPrompt {
            location: location.clone(),
            kind: error.kind(),
            reason: error.reason().to_string(),
            certificate: certificate.clone(),
        });

        let options = match decision {
            TrustDecision::Reject => return false,
            TrustDecision::IgnoreOnce => RequestOptions::ignoring_tls_errors(),
            TrustDecision::TrustPermanently => {
                let pinned = error.kind() == ErrorKind::UntrustedHost
                    && match (self.context.trust_store_for(location.scheme()), &certificate) {
                        (Some(store), Some(cert)) => store.lock().add_trust(location.url(), Some(cert)),
                        _ => false,
                    };
                if pinned {
                    log::info!("Pinned certificate of {} on request", location.host());
                    RequestOptions::default()
                } else {
                    RequestOptions::ignoring_tls_errors()
                }
            }
        };

        let Some(handler) = self.handler_for(location.scheme()) else {
            return false;
        };
        match self.dispatch(handler, location, options) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Retry after trust decision failed: {}", e);
                false
            }
        }
    }

    fn on_redirected(&mut self, target: &str, permanent: bool) {
        let Some(current) = self.current_location.clone() else {
            return;
        };
        self.state = NavigationState::Redirecting;

        let destination = match current.resolve(target) {
            Ok(destination) => destination,
            Err(e) => {
                self.show_message(&format!("Invalid redirection target {}: {}", target, e));
                return;
            }
        };

        if self.redirect_count >= self.context.settings.max_redirections {
            log::warn!("Too many redirects, not following {}", destination);
            self.show_message(&format!(
                "Too many consecutive redirections. The last redirection would have redirected you to:\r\n{}",
                destination
            ));
            return;
        }

        let cross_scheme = current.scheme() != destination.scheme();
        let cross_host = current.host() != destination.host();
        let policy = self.context.settings.redirection_policy;
        if let Some(warning) = policy.warning_for(cross_scheme, cross_host) {
            let prompt = RedirectPrompt {
                from: current.clone(),
                to: destination.clone(),
                warning,
            };
            if !self.delegate.confirm_redirect(&prompt) {
                self.show_message(&format!("Redirection to {} cancelled by user", destination));
                return;
            }
        }

        let started = self.check_scheme(&destination).and_then(|()| {
            self.start_request(
                destination.clone(),
                RequestOptions::default(),
                RequestFlags::DONT_READ_FROM_CACHE,
            )
        });

        match started {
            Ok(()) => {
                self.redirect_count += 1;
                log::debug!("Following redirect {} -> {}", current, destination);
                self.replace_history(destination.clone());
                self.delegate.on_event(SessionEvent::Redirected {
                    from: current,
                    to: destination,
                    permanent,
                });
            }
            Err(e) => self.show_message(&format!("Redirection to {} failed: {}", destination, e)),
        }
    }

    fn on_input_required(&mut self, query: String, sensitive: bool) {
        let Some(current) = self.current_location.clone() else {
            return;
        };
        self.state = NavigationState::InputNeeded;

        let answer = self.delegate.request_input(&InputPrompt {
            location: current.clone(),
            query: query.clone(),
            sensitive,
        });

        let Some(text) = answer else {
            self.show_message(&format!("Site requires input:\n{}", query));
            return;
        };

        let next = current.with_query(&text);
        let length = next.to_string().len();
        if length > MAX_URL_LENGTH {
            self.show_message(&format!(
                "Your input message is too long. Your input is {} bytes, but a maximum of {} bytes are allowed.",
                length, MAX_URL_LENGTH
            ));
            return;
        }

        if let Err(e) = self.navigate(next, PushToHistory::DontPush, RequestFlags::NONE) {
            self.show_message(&e.to_string());
        }
    }

    fn on_certificate_required(&mut self, reason: String) {
        let Some(current) = self.current_location.clone() else {
            return;
        };
        self.state = NavigationState::CertificateNeeded;

        let Some(identity) = self.delegate.select_identity(&reason) else {
            self.disable_client_certificate();
            self.show_message(&format!(
                "The page requested an authorized client certificate, but none was provided.\r\nOriginal query was: {}",
                reason
            ));
            return;
        };

        let retried = self
            .enable_client_certificate(identity)
            .and_then(|()| self.navigate(current, PushToHistory::DontPush, RequestFlags::NONE));
        if let Err(e) = retried {
            self.show_message(&e.to_string());
        }
    }

    /// Deliver a plain text explanation in place of the page
    fn show_message(&mut self, message: &str) {
        let (body, mime) = message_document(message);
        self.is_internal_location = true;
        self.deliver(body, mime, false, None);
        self.state = NavigationState::Failed;
    }

    fn deliver(
        &mut self,
        body: Bytes,
        mime: MimeType,
        from_cache: bool,
        scroll_position: Option<i32>,
    ) {
        let Some(location) = self.current_location.clone() else {
            log::error!("Document delivered without a current location");
            return;
        };
        let size = body.len();

        let Some((body, mime)) = self.convert_charset(body, mime) else {
            return;
        };

        let cacheable = mime.is_text()
            && !self.is_internal_location
            && !from_cache
            && self.identity.is_none();
        if cacheable {
            self.context.cache.lock().push(&location, body.clone(), mime.clone());
        }

        let document = Document {
            location,
            body,
            mime,
            loading_time: self.navigation_started.elapsed(),
            size,
            from_cache,
            is_internal: self.is_internal_location,
            scroll_position,
        };
        log::debug!(
            "Loaded {} ({} bytes of {}{})",
            document.location,
            document.size,
            document.mime,
            if from_cache { ", cached" } else { "" }
        );

        self.state = NavigationState::Completed;
        self.delegate.on_event(SessionEvent::DocumentReady(document));
    }

    /// Transcode textual bodies to UTF-8. Returns `None` when the body was
    /// replaced by an error message.
    fn convert_charset(&mut self, body: Bytes, mime: MimeType) -> Option<(Bytes, MimeType)> {
        let charset = mime.charset();
        if body.is_empty() || !mime.is_text() || charset == "UTF-8" {
            return Some((body, mime));
        }

        match self.context.charset.to_utf8(&body, &charset) {
            Ok(converted) => Some((Bytes::from(converted), mime.with_parameter("charset", "utf-8"))),
            Err(e) => {
                log::warn!("Charset conversion failed: {}", e);
                if self.delegate.confirm_raw_charset(&charset) {
                    Some((body, mime))
                } else {
                    self.show_message(&format!(
                        "Failed to convert input charset {} to UTF-8.",
                        charset
                    ));
                    None
                }
            }
        }
    }
}

impl<D: NavigationDelegate> Drop for NavigationSession<D> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            if !self.handlers[active.handler].cancel_request() {
                log::warn!("Request for {} still running at shutdown", active.location);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;

    impl NavigationDelegate for Quiet {
        fn on_event(&mut self, _event: SessionEvent) {}
    }

    fn loc(input: &str) -> Location {
        Location::parse(input).unwrap()
    }

    #[test]
    fn test_flags() {
        assert_eq!(RequestFlags::default(), RequestFlags::NONE);
        assert!(RequestFlags::DONT_READ_FROM_CACHE.dont_read_from_cache);
        assert!(!RequestFlags::DONT_READ_FROM_CACHE.navigated_back_or_forward);
        assert!(RequestFlags::NAVIGATED_BACK_OR_FORWARD.navigated_back_or_forward);
    }

    #[test]
    fn test_history_truncates_forward_entries() {
        let mut session = NavigationSession::with_handlers(
            ClientContext::default().shared(),
            Quiet,
            Vec::new(),
        );
        session.push_history(loc("gemini://a.example/"));
        session.push_history(loc("gemini://b.example/"));
        session.push_history(loc("gemini://c.example/"));
        session.history_index = Some(0);

        session.push_history(loc("gemini://d.example/"));
        assert_eq!(
            session.history(),
            &[loc("gemini://a.example/"), loc("gemini://d.example/")]
        );

        session.replace_history(loc("gemini://e.example/"));
        assert_eq!(session.history()[1], loc("gemini://e.example/"));
    }

    #[test]
    fn test_idle_session_has_nothing_to_do() {
        let mut session =
            NavigationSession::with_handlers(ClientContext::default().shared(), Quiet, Vec::new());
        assert_eq!(session.state(), NavigationState::Idle);
        assert!(session.stop());
        assert_eq!(session.reload(), Err(NavigationError::NoCurrentLocation));
        assert!(session.go_back().is_ok());
    }

    #[tokio::test]
    async fn test_process_without_request_returns_immediately() {
        let mut session =
            NavigationSession::with_handlers(ClientContext::default().shared(), Quiet, Vec::new());
        assert!(!session.process_next_event().await);
    }
}
