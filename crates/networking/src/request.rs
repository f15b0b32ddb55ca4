/// Per-attempt options handed to an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestOptions {
    /// Skip trust evaluation for this attempt only. Nothing gets pinned.
    pub ignore_tls_errors: bool,
}

impl RequestOptions {
    pub fn ignoring_tls_errors() -> Self {
        Self {
            ignore_tls_errors: true,
        }
    }
}

/// Coarse progress of a single exchange, reported by adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Nothing in flight
    None,
    /// The adapter accepted the request
    Started,
    /// The host name resolved
    HostFound,
    /// Transport (and TLS, if any) established
    Connected,
    /// The request line went out
    RequestSent,
    /// A web request was handed to the HTTP client
    StartedWeb,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_check_trust() {
        assert!(!RequestOptions::default().ignore_tls_errors);
        assert!(RequestOptions::ignoring_tls_errors().ignore_tls_errors);
    }
}
