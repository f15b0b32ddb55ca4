//! Normalized locations.
//!
//! A [`Location`] wraps a parsed URL whose host is lower-cased and whose
//! default port is dropped, so two spellings of the same resource compare
//! equal. Cache and trust lookups use [`Location::cache_key`], which leaves
//! out the fragment.

use std::fmt;

use url::{Position, Url};

/// Scheme families the engine knows how to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemeFamily {
    /// Text-oriented hypertext protocol
    Gemini,
    /// Menu-oriented directory protocol
    Gopher,
    /// User lookup protocol
    Finger,
    /// http and https
    Web,
    /// Internal pages
    About,
    /// Local files
    File,
}

impl SchemeFamily {
    pub fn of(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "gemini" => Some(SchemeFamily::Gemini),
            "gopher" => Some(SchemeFamily::Gopher),
            "finger" => Some(SchemeFamily::Finger),
            "http" | "https" => Some(SchemeFamily::Web),
            "about" => Some(SchemeFamily::About),
            "file" => Some(SchemeFamily::File),
            _ => None,
        }
    }
}

/// Well-known port of a scheme
pub fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "gemini" => Some(1965),
        "gopher" => Some(70),
        "finger" => Some(79),
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// A normalized URL-like value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    url: Url,
}

impl Location {
    pub fn parse(input: &str) -> Result<Self, url::ParseError> {
        Url::parse(input.trim()).map(Self::from_url)
    }

    pub fn from_url(mut url: Url) -> Self {
        // Non-special schemes keep the host as written
        if let Some(host) = url.host_str() {
            if host.chars().any(|c| c.is_ascii_uppercase()) {
                let lowered = host.to_ascii_lowercase();
                let _ = url.set_host(Some(&lowered));
            }
        }
        if url.port().is_some() && url.port() == default_port(url.scheme()) {
            let _ = url.set_port(None);
        }
        if url.has_host() && url.path().is_empty() {
            url.set_path("/");
        }
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn into_url(self) -> Url {
        self.url
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn family(&self) -> Option<SchemeFamily> {
        SchemeFamily::of(self.scheme())
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or("")
    }

    pub fn port_or_default(&self) -> Option<u16> {
        self.url.port().or_else(|| default_port(self.scheme()))
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    pub fn fragment(&self) -> Option<&str> {
        self.url.fragment()
    }

    /// Key used by the response cache and history: the URL without fragment
    pub fn cache_key(&self) -> &str {
        &self.url[..Position::AfterQuery]
    }

    /// The same location with the fragment dropped
    pub fn without_fragment(&self) -> Location {
        let mut url = self.url.clone();
        url.set_fragment(None);
        Location { url }
    }

    /// Resolve a possibly relative reference against this location
    pub fn resolve(&self, reference: &str) -> Result<Location, url::ParseError> {
        self.url.join(reference.trim()).map(Self::from_url)
    }

    /// Replace the query, percent-encoding the given text
    pub fn with_query(&self, query: &str) -> Location {
        let mut url = self.url.clone();
        url.set_fragment(None);
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes())
            .collect::<String>()
            .replace('+', "%20");
        url.set_query(Some(&encoded));
        Location { url }
    }

    /// Same scheme, same host, root path
    pub fn root(&self) -> Location {
        let mut url = self.url.clone();
        url.set_path("/");
        url.set_query(None);
        url.set_fragment(None);
        Location { url }
    }

    /// One directory up
    pub fn parent(&self) -> Location {
        let mut url = self.url.clone();
        url.set_query(None);
        url.set_fragment(None);
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        match url.join("..") {
            Ok(parent) => Location::from_url(parent),
            Err(_) => Location { url },
        }
    }

    /// Internal and local locations are never cached and never hit the network
    pub fn is_internal(&self) -> bool {
        matches!(self.scheme(), "about" | "file")
    }

    pub fn same_resource(&self, other: &Location) -> bool {
        self.cache_key() == other.cache_key()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

impl std::str::FromStr for Location {
    type Err = url::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Location::parse(s)
    }
}

impl From<Url> for Location {
    fn from(url: Url) -> Self {
        Location::from_url(url)
    }
}
